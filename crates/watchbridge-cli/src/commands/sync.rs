use crate::commands;
use crate::output::Output;
use chrono::{Duration, Utc};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;
use watch_sync_core::CycleReport;

pub async fn run_sync(
    config_path: Option<PathBuf>,
    task_name: &str,
    incremental: bool,
    since_minutes: Option<u64>,
    output: &Output,
) -> Result<()> {
    let (config, _) = commands::load_config(config_path)?;
    let task_config = config
        .task(task_name)
        .ok_or_else(|| eyre!("Unknown task '{}'", task_name))?
        .clone();

    let manager = commands::build_manager(&config)?;
    let task = manager.get(task_name).ok_or_else(|| {
        let reason = manager
            .statuses()
            .into_iter()
            .find(|s| s.name == task_name)
            .and_then(|s| s.error)
            .unwrap_or_else(|| "not built".to_string());
        eyre!("Task '{}' cannot run: {}", task_name, reason)
    })?;
    if !task_config.run {
        output.warn(format!("Task '{}' is disabled in the configuration; running it anyway", task_name));
    }

    // Ctrl-C stops in-flight units instead of killing mid-write
    let token = task.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let report = if incremental {
        match since_minutes {
            Some(minutes) => {
                let minutes = i64::try_from(minutes).map_err(|_| eyre!("--since-minutes is too large"))?;
                task.seed(Some(Utc::now() - Duration::minutes(minutes))).await?;
            }
            None => output.warn("No --since-minutes given: this run only records the current position"),
        }
        info!(operation = "sync_incremental", task = %task_name, "Running one incremental cycle");
        task.run_incremental_cycle().await?
    } else {
        info!(operation = "sync_full", task = %task_name, "Running full sync");
        task.run_full_sync().await?
    };

    print_report(task_name, &report, output);
    if report.failed > 0 {
        return Err(eyre!("{} item(s) failed to sync", report.failed));
    }
    Ok(())
}

fn print_report(task: &str, report: &CycleReport, output: &Output) {
    if output.is_human() {
        let summary = format!("{}: {}", task, report);
        if report.is_clean() {
            output.success(summary);
        } else {
            output.warn(summary);
        }
    } else {
        output.json(&json!({
            "type": "report",
            "task": task,
            "report": report,
        }));
    }
}
