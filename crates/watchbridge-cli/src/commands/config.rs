use crate::commands;
use crate::output::Output;
use crate::ConfigCommands;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::json;
use std::path::PathBuf;
use watch_sync_servers::ServerFactoryRegistry;

pub fn run_config(cmd: ConfigCommands, config_path: Option<PathBuf>, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { full } => show_config(config_path, full, output),
        ConfigCommands::Validate => validate_config(config_path, output),
        ConfigCommands::Path => {
            let file = commands::config_file(config_path);
            if output.is_human() {
                output.println(file.display().to_string());
            } else {
                output.json(&json!({ "path": file.display().to_string(), "exists": file.exists() }));
            }
            Ok(())
        }
    }
}

fn show_config(config_path: Option<PathBuf>, full: bool, output: &Output) -> Result<()> {
    let (config, file) = commands::load_config(config_path)?;
    let shown = if full { config } else { config.redacted() };

    if output.is_human() {
        let rendered = toml::to_string_pretty(&shown).map_err(|e| eyre!("Failed to render config: {}", e))?;
        output.info(format!("# {}", file.display()));
        output.println(rendered);
    } else {
        let value = serde_json::to_value(&shown)?;
        output.json(&json!({ "path": file.display().to_string(), "config": value }));
    }
    Ok(())
}

fn validate_config(config_path: Option<PathBuf>, output: &Output) -> Result<()> {
    let (config, file) = commands::load_config(config_path)?;
    ServerFactoryRegistry::new()
        .validate_all_configs(&config)
        .map_err(|e| eyre!("Invalid server configuration: {:#}", e))?;
    output.success(format!(
        "{} is valid: {} server(s), {} task(s)",
        file.display(),
        config.servers.len(),
        config.tasks.len()
    ));
    Ok(())
}
