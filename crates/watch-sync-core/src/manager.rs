use crate::pair::PairStrategy;
use crate::task::{SyncTask, TaskError, TaskStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};
use watch_sync_config::{Config, TaskConfig};
use watch_sync_servers::ServerRegistry;

enum Entry {
    Ready(Arc<SyncTask>),
    /// Construction failed; kept so the failure stays visible.
    Failed { config: TaskConfig, error: String },
}

/// Point-in-time view of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub name: String,
    pub servers: Vec<String>,
    pub status: TaskStatus,
    pub enabled: bool,
    pub strategy: Option<PairStrategy>,
    pub schedule: Option<String>,
    pub error: Option<String>,
}

/// All tasks of a process, by name.
pub struct TaskManager {
    registry: ServerRegistry,
    tasks: BTreeMap<String, Entry>,
}

impl TaskManager {
    pub fn new(registry: ServerRegistry) -> Self {
        Self {
            registry,
            tasks: BTreeMap::new(),
        }
    }

    /// Build every configured task. Failures are recorded, not returned.
    pub fn from_config(config: &Config, registry: ServerRegistry) -> Self {
        let mut manager = Self::new(registry);
        for task in &config.tasks {
            // Build errors are already logged and kept as `failed` entries
            let _ = manager.add(task);
        }
        manager
    }

    /// Construct and register a task, replacing nothing.
    ///
    /// A task that fails to construct is still recorded as `failed`.
    pub fn add(&mut self, config: &TaskConfig) -> Result<Arc<SyncTask>, TaskError> {
        match SyncTask::new(config, &self.registry) {
            Ok(task) => {
                let task = Arc::new(task);
                info!(
                    operation = "task_added",
                    task = %config.name,
                    strategy = %task.pairing().strategy,
                    schedule = %task.schedule().describe(),
                    "Task added"
                );
                self.tasks.insert(config.name.clone(), Entry::Ready(task.clone()));
                Ok(task)
            }
            Err(e) => {
                error!(operation = "task_invalid", task = %config.name, error = %e, "Task could not be built");
                self.tasks.insert(
                    config.name.clone(),
                    Entry::Failed {
                        config: config.clone(),
                        error: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Cancel and drop a task. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.tasks.remove(name) {
            Some(Entry::Ready(task)) => {
                task.cancel();
                info!(operation = "task_removed", task = %name, "Task removed");
                true
            }
            Some(Entry::Failed { .. }) => true,
            None => false,
        }
    }

    /// Destroy the task of the same name, then build it again from `config`.
    pub fn replace(&mut self, config: &TaskConfig) -> Result<Arc<SyncTask>, TaskError> {
        self.remove(&config.name);
        self.add(config)
    }

    pub fn get(&self, name: &str) -> Option<Arc<SyncTask>> {
        match self.tasks.get(name) {
            Some(Entry::Ready(task)) => Some(task.clone()),
            _ => None,
        }
    }

    /// Tasks that built successfully, in name order.
    pub fn tasks(&self) -> Vec<Arc<SyncTask>> {
        self.tasks
            .values()
            .filter_map(|entry| match entry {
                Entry::Ready(task) => Some(task.clone()),
                Entry::Failed { .. } => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<TaskSummary> {
        self.tasks
            .iter()
            .map(|(name, entry)| match entry {
                Entry::Ready(task) => TaskSummary {
                    name: name.clone(),
                    servers: task.config().which.clone(),
                    status: task.status(),
                    enabled: task.config().run,
                    strategy: Some(task.pairing().strategy),
                    schedule: Some(task.schedule().describe()),
                    error: None,
                },
                Entry::Failed { config, error } => TaskSummary {
                    name: name.clone(),
                    servers: config.which.clone(),
                    status: TaskStatus::Failed,
                    enabled: config.run,
                    strategy: None,
                    schedule: None,
                    error: Some(error.clone()),
                },
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch_sync_models::ServerKind;
    use watch_sync_servers::{MemoryServer, ServerHandle};

    fn registry() -> ServerRegistry {
        let mut registry = ServerRegistry::new();
        registry.insert(ServerHandle::new(Arc::new(MemoryServer::new("plex", ServerKind::Plex)), 2));
        registry.insert(ServerHandle::new(Arc::new(MemoryServer::new("jelly", ServerKind::Jellyfin)), 2));
        registry.insert(ServerHandle::new(Arc::new(MemoryServer::new("emby", ServerKind::Emby)), 2));
        registry
    }

    fn task(name: &str, which: &[&str]) -> TaskConfig {
        TaskConfig {
            name: name.to_string(),
            run: true,
            run_full_on_start: false,
            which: which.iter().map(|s| s.to_string()).collect(),
            interval_minutes: None,
            crontab: None,
        }
    }

    #[test]
    fn test_failed_tasks_recorded_others_unaffected() {
        let mut manager = TaskManager::new(registry());
        assert!(manager.add(&task("good", &["plex", "jelly"])).is_ok());
        assert!(manager.add(&task("bad", &["plex", "kodi"])).is_err());

        assert_eq!(manager.len(), 2);
        assert!(manager.get("bad").is_none());
        assert_eq!(manager.tasks().len(), 1);

        let statuses = manager.statuses();
        assert_eq!(statuses[0].name, "bad");
        assert_eq!(statuses[0].status, TaskStatus::Failed);
        assert!(statuses[0].error.as_deref().unwrap().contains("kodi"));
        assert_eq!(statuses[1].status, TaskStatus::Stopped);
        assert_eq!(statuses[1].strategy, Some(PairStrategy::PlexEmby));
    }

    #[tokio::test]
    async fn test_remove_stops_running_task() {
        let mut manager = TaskManager::new(registry());
        let task = manager.add(&task("t", &["plex", "jelly"])).unwrap();
        task.initialize(false).await.unwrap();
        assert_eq!(task.status(), TaskStatus::Running);

        let token = task.cancellation_token();
        assert!(manager.remove("t"));
        assert!(token.is_cancelled());
        assert_eq!(task.status(), TaskStatus::Stopped);
        assert!(!task.is_run());
        assert!(task.run_incremental_cycle().await.is_err());

        assert!(!manager.remove("t"));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_replace_rebinds() {
        let mut manager = TaskManager::new(registry());
        let old = manager.add(&task("t", &["plex", "jelly"])).unwrap();
        let new = manager.replace(&task("t", &["emby", "jelly"])).unwrap();

        assert!(old.cancellation_token().is_cancelled());
        assert!(!new.cancellation_token().is_cancelled());
        assert_eq!(new.server(crate::watermark::Peer::A).name(), "emby");
        assert_eq!(manager.get("t").unwrap().pairing().strategy, PairStrategy::EmbyEmby);
    }
}
