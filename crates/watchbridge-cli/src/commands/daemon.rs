use crate::output::Output;
use crate::{commands, logging};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};
use watch_sync_config::{PathManager, Schedule};
use uuid::Uuid;
use watch_sync_core::{SyncTask, TaskManager, TaskStatus};

pub struct Scheduler {
    scheduler: JobScheduler,
    manager: TaskManager,
    jobs: HashMap<String, Uuid>,
}

impl Scheduler {
    pub async fn new(manager: TaskManager) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            manager,
            jobs: HashMap::new(),
        })
    }

    /// Initialize every enabled task, then schedule the ones that came up.
    ///
    /// Returns the number of scheduled tasks.
    pub async fn start(&mut self, startup_sync: bool) -> Result<usize> {
        let tasks: Vec<Arc<SyncTask>> = self.manager.tasks().into_iter().filter(|t| t.config().run).collect();
        for summary in self.manager.statuses() {
            if let Some(reason) = summary.error {
                warn!(operation = "task_skipped", task = %summary.name, error = %reason, "Task not scheduled");
            } else if !summary.enabled {
                info!(operation = "task_skipped", task = %summary.name, "Task disabled");
            }
        }

        info!(operation = "scheduler_startup", tasks = tasks.len(), "Initializing tasks");
        let inits = tasks.iter().map(|task| {
            let full = startup_sync && task.config().run_full_on_start;
            async move { (task.name().to_string(), task.initialize(full).await) }
        });
        for (name, result) in join_all(inits).await {
            match result {
                Ok(Some(report)) => info!(
                    operation = "startup_sync_complete",
                    task = %name,
                    candidates = report.candidates,
                    mutations = report.mutations,
                    failed = report.failed,
                    "Start-up full sync finished"
                ),
                Ok(None) => debug!(task = %name, "Task initialized without full sync"),
                Err(e) => error!(operation = "task_init_failed", task = %name, error = %e, "Task failed to start"),
            }
        }

        let mut scheduled = 0;
        for task in tasks.into_iter().filter(|t| t.status() == TaskStatus::Running) {
            let job = cycle_job(task.clone())?;
            let id = self.scheduler.add(job).await?;
            self.jobs.insert(task.name().to_string(), id);
            info!(
                operation = "task_scheduled",
                task = %task.name(),
                schedule = %task.schedule().describe(),
                "Task scheduled"
            );
            scheduled += 1;
        }

        self.scheduler.start().await?;
        info!(operation = "scheduler_started", scheduled, "Scheduler started");
        Ok(scheduled)
    }

    /// Unschedule a task's job, then cancel and drop the task.
    ///
    /// Returns whether the task existed.
    pub async fn remove_task(&mut self, name: &str) -> Result<bool> {
        if let Some(id) = self.jobs.remove(name) {
            self.scheduler.remove(&id).await?;
            debug!(operation = "job_removed", task = %name, job = %id, "Job unscheduled");
        }
        Ok(self.manager.remove(name))
    }

    /// Cancel in-flight work on every task and stop firing jobs.
    pub async fn shutdown(&mut self) -> Result<()> {
        let names: Vec<String> = self.manager.tasks().iter().map(|t| t.name().to_string()).collect();
        for name in names {
            self.remove_task(&name).await?;
        }
        self.scheduler.shutdown().await?;
        info!(operation = "scheduler_stopped", "Scheduler stopped");
        Ok(())
    }
}

fn cycle_job(task: Arc<SyncTask>) -> Result<Job> {
    let schedule = task.schedule().clone();
    let job = match schedule {
        Schedule::Every(period) => Job::new_repeated_async(period, move |_id, _scheduler| {
            let task = task.clone();
            Box::pin(async move { run_cycle(&task).await })
        })?,
        schedule @ Schedule::Cron(_) => {
            let expression = schedule
                .cron_expression()
                .ok_or_else(|| eyre!("Task '{}' has no cron expression", task.name()))?;
            Job::new_async(expression.as_str(), move |_id, _scheduler| {
                let task = task.clone();
                Box::pin(async move { run_cycle(&task).await })
            })?
        }
    };
    Ok(job)
}

async fn run_cycle(task: &SyncTask) {
    if !task.is_run() {
        return;
    }
    match task.run_incremental_cycle().await {
        Ok(report) if report.candidates > 0 => info!(
            operation = "scheduled_cycle_complete",
            task = %task.name(),
            candidates = report.candidates,
            mutations = report.mutations,
            failed = report.failed,
            conflicts = report.conflicts,
            duration_ms = report.duration.as_millis() as u64,
            "Incremental cycle finished"
        ),
        Ok(_) => debug!(task = %task.name(), "Nothing new"),
        Err(e) => error!(operation = "scheduled_cycle_error", task = %task.name(), error = %e, "Incremental cycle failed"),
    }
}

pub async fn run_daemon(
    config_path: Option<PathBuf>,
    no_startup_sync: bool,
    log_file: bool,
    verbose: u8,
    quiet: bool,
    output: &Output,
) -> Result<()> {
    let _log_guard = if log_file {
        let paths = PathManager::default();
        Some(logging::init_file_logging(verbose, quiet, &paths.daemon_log_file()).map_err(|e| eyre!("{:#}", e))?)
    } else {
        logging::init_logging(verbose, quiet);
        None
    };

    let (config, file) = commands::load_config(config_path)?;
    info!(operation = "daemon_start", config = %file.display(), "Starting daemon");
    if config.tasks.is_empty() {
        output.warn("No tasks configured; nothing to do");
        return Ok(());
    }

    let manager = commands::build_manager(&config)?;
    let mut scheduler = Scheduler::new(manager).await?;
    let scheduled = scheduler.start(!no_startup_sync).await?;
    if scheduled == 0 {
        output.error("No task could be started");
        scheduler.shutdown().await?;
        return Err(eyre!("no runnable tasks"));
    }
    output.success(format!("Daemon running with {} task(s); press Ctrl-C to stop", scheduled));

    tokio::signal::ctrl_c().await?;
    info!(operation = "daemon_signal", "Interrupt received, shutting down");
    scheduler.shutdown().await?;
    output.info("Stopped");
    Ok(())
}
