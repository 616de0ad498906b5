use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use watch_sync_models::ServerKind;

pub const DEFAULT_INTERVAL_MINUTES: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

/// Engine-wide knobs shared by every server and task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Concurrent reconciliation units per server.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Entries requested from history and continue-watching feeds.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServerKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Emby family only: user whose watch state is synced when authenticating by token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Overrides `runtime.concurrency` for this server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub run: bool,
    /// Run a full library pass before the first incremental cycle.
    #[serde(default, alias = "isfirst")]
    pub run_full_on_start: bool,
    /// The two server names this task pairs.
    pub which: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
    /// Standard five-field crontab expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crontab: Option<String>,
}

/// When a task's incremental cycle fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Every(Duration),
    Cron(String),
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_history_limit() -> u32 {
    20
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry_attempts: default_retry_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            history_limit: default_history_limit(),
        }
    }
}

impl RuntimeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ServerConfig {
    pub fn concurrency(&self, runtime: &RuntimeConfig) -> usize {
        self.concurrency.unwrap_or(runtime.concurrency)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow::anyhow!("Server name cannot be empty"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(anyhow::anyhow!("Server '{}' url must start with http:// or https://", self.name));
        }
        if self.concurrency == Some(0) {
            return Err(anyhow::anyhow!("Server '{}' concurrency must be at least 1", self.name));
        }
        let has_login = self.username.is_some() && self.password.is_some();
        match self.kind {
            ServerKind::Plex => {
                if self.token.as_deref().map_or(true, str::is_empty) {
                    return Err(anyhow::anyhow!("Plex server '{}' requires a token", self.name));
                }
            }
            ServerKind::Emby | ServerKind::Jellyfin => {
                let has_token_user = self.token.is_some() && self.user_id.is_some();
                if !has_login && !has_token_user {
                    return Err(anyhow::anyhow!(
                        "{} server '{}' requires username and password, or token and user_id",
                        self.kind,
                        self.name
                    ));
                }
            }
        }
        Ok(())
    }
}

impl TaskConfig {
    pub fn schedule(&self) -> anyhow::Result<Schedule> {
        match (&self.interval_minutes, &self.crontab) {
            (Some(_), Some(_)) => Err(anyhow::anyhow!(
                "Task '{}' sets both interval_minutes and crontab",
                self.name
            )),
            (Some(0), None) => Err(anyhow::anyhow!("Task '{}' interval_minutes must be at least 1", self.name)),
            (Some(minutes), None) => Ok(Schedule::Every(Duration::from_secs(minutes * 60))),
            (None, Some(expr)) => {
                let fields = expr.split_whitespace().count();
                if fields != 5 {
                    return Err(anyhow::anyhow!(
                        "Task '{}' crontab '{}' must have 5 fields, found {}",
                        self.name,
                        expr,
                        fields
                    ));
                }
                Ok(Schedule::Cron(expr.trim().to_string()))
            }
            (None, None) => Ok(Schedule::Every(Duration::from_secs(DEFAULT_INTERVAL_MINUTES * 60))),
        }
    }
}

impl Schedule {
    /// Six-field expression (leading seconds) as tokio-cron-scheduler expects.
    pub fn cron_expression(&self) -> Option<String> {
        match self {
            Schedule::Cron(expr) => Some(format!("0 {}", expr)),
            Schedule::Every(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Schedule::Every(d) if d.as_secs() % 60 == 0 => format!("every {} min", d.as_secs() / 60),
            Schedule::Every(d) => format!("every {} s", d.as_secs()),
            Schedule::Cron(expr) => format!("cron '{}'", expr),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runtime.concurrency == 0 {
            return Err(anyhow::anyhow!("runtime.concurrency must be at least 1"));
        }
        if self.runtime.retry_attempts == 0 {
            return Err(anyhow::anyhow!("runtime.retry_attempts must be at least 1"));
        }
        if self.runtime.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("runtime.request_timeout_secs must be at least 1"));
        }

        let mut server_names = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !server_names.insert(server.name.as_str()) {
                return Err(anyhow::anyhow!("Duplicate server name: {}", server.name));
            }
        }

        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if !task_names.insert(task.name.as_str()) {
                return Err(anyhow::anyhow!("Duplicate task name: {}", task.name));
            }
            self.validate_task(task)?;
        }

        Ok(())
    }

    /// Checks one task against the servers declared in this config.
    pub fn validate_task(&self, task: &TaskConfig) -> anyhow::Result<()> {
        if task.which.len() != 2 {
            return Err(anyhow::anyhow!(
                "Task '{}' must name exactly two servers, found {}",
                task.name,
                task.which.len()
            ));
        }
        if task.which[0] == task.which[1] {
            return Err(anyhow::anyhow!(
                "Task '{}' must pair two distinct servers, got '{}' twice",
                task.name,
                task.which[0]
            ));
        }
        for name in &task.which {
            if self.server(name).is_none() {
                return Err(anyhow::anyhow!("Task '{}' references unknown server '{}'", task.name, name));
            }
        }
        task.schedule()?;
        Ok(())
    }

    /// Copy with passwords and tokens masked, for display.
    pub fn redacted(&self) -> Config {
        let mut config = self.clone();
        for server in &mut config.servers {
            if server.token.is_some() {
                server.token = Some(mask(server.token.as_deref().unwrap_or_default()));
            }
            if server.password.is_some() {
                server.password = Some("********".to_string());
            }
        }
        config
    }
}

fn mask(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", secret.chars().take(4).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[runtime]
concurrency = 4

[[servers]]
name = "living-room"
type = "plex"
url = "http://192.168.1.10:32400"
token = "abcdef123456"

[[servers]]
name = "basement"
type = "emby"
url = "http://192.168.1.11:8096"
username = "sync"
password = "hunter2"

[[tasks]]
name = "plex-emby"
isfirst = true
which = ["living-room", "basement"]
crontab = "*/5 * * * *"
"#;

    fn sample() -> Config {
        toml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_sample_with_defaults() {
        let config = sample();
        assert_eq!(config.runtime.concurrency, 4);
        assert_eq!(config.runtime.retry_attempts, 3);
        assert_eq!(config.runtime.history_limit, 20);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[1].kind, ServerKind::Emby);

        let task = config.task("plex-emby").unwrap();
        assert!(task.run);
        assert!(task.run_full_on_start);
        assert_eq!(task.schedule().unwrap(), Schedule::Cron("*/5 * * * *".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        sample().save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.servers[0].name, "living-room");
        assert_eq!(loaded.tasks[0].which, vec!["living-room", "basement"]);
        assert!(loaded.tasks[0].run_full_on_start);
    }

    #[test]
    fn test_task_must_pair_two_known_servers() {
        let mut config = sample();
        config.tasks[0].which = vec!["living-room".to_string()];
        assert!(config.validate().is_err());

        config.tasks[0].which = vec!["living-room".to_string(), "living-room".to_string()];
        assert!(config.validate().is_err());

        config.tasks[0].which = vec!["living-room".to_string(), "attic".to_string()];
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("unknown server 'attic'"));
    }

    #[test]
    fn test_duplicate_server_names_rejected() {
        let mut config = sample();
        config.servers[1].name = "living-room".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_schedule_variants() {
        let mut task = sample().tasks[0].clone();
        task.crontab = None;
        assert_eq!(task.schedule().unwrap(), Schedule::Every(Duration::from_secs(60)));

        task.interval_minutes = Some(15);
        assert_eq!(task.schedule().unwrap(), Schedule::Every(Duration::from_secs(900)));

        task.crontab = Some("* * * * *".to_string());
        assert!(task.schedule().is_err());

        task.interval_minutes = None;
        task.crontab = Some("*/5 * * *".to_string());
        assert!(task.schedule().is_err());
    }

    #[test]
    fn test_cron_expression_gains_seconds_field() {
        let schedule = Schedule::Cron("0 3 * * *".to_string());
        assert_eq!(schedule.cron_expression().as_deref(), Some("0 0 3 * * *"));
        assert_eq!(Schedule::Every(Duration::from_secs(60)).cron_expression(), None);
    }

    #[test]
    fn test_emby_requires_credentials() {
        let mut config = sample();
        config.servers[1].password = None;
        assert!(config.validate().is_err());

        config.servers[1].token = Some("t".to_string());
        config.servers[1].user_id = Some("u".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let redacted = sample().redacted();
        assert_eq!(redacted.servers[0].token.as_deref(), Some("abcd****"));
        assert_eq!(redacted.servers[1].password.as_deref(), Some("********"));
    }
}
