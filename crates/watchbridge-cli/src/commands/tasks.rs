use crate::commands;
use crate::output::Output;
use color_eyre::Result;
use comfy_table::{presets, Attribute, Cell, Color, Table};
use serde_json::json;
use std::path::PathBuf;
use watch_sync_core::TaskStatus;

pub fn run_tasks(config_path: Option<PathBuf>, output: &Output) -> Result<()> {
    let (config, _) = commands::load_config(config_path)?;
    let manager = commands::build_manager(&config)?;
    let summaries = manager.statuses();

    if !output.is_human() {
        output.json(&json!({ "tasks": summaries }));
        return Ok(());
    }
    if summaries.is_empty() {
        output.warn("No tasks configured");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table.set_header(
        ["Task", "Servers", "Pairing", "Schedule", "Enabled", "Status"]
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );
    for summary in &summaries {
        let status = match (&summary.error, summary.status) {
            (Some(error), _) => Cell::new(format!("failed: {}", error)).fg(Color::Red),
            (None, TaskStatus::Failed) => Cell::new("failed").fg(Color::Red),
            (None, status) => Cell::new(status.to_string()),
        };
        table.add_row(vec![
            Cell::new(&summary.name),
            Cell::new(summary.servers.join(" <-> ")),
            Cell::new(summary.strategy.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(summary.schedule.as_deref().unwrap_or("-")),
            Cell::new(if summary.enabled { "yes" } else { "no" }),
            status,
        ]);
    }
    output.println(table.to_string());
    Ok(())
}
