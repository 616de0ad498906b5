use crate::orchestrator::Orchestrator;
use crate::pair::Pairing;
use crate::reconcile::Reconciler;
use crate::report::CycleReport;
use crate::scanner::{self, Feeds};
use crate::watermark::{HighWaterMark, Peer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use watch_sync_config::{Schedule, TaskConfig};
use watch_sync_servers::{ServerError, ServerHandle, ServerRegistry};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task '{task}' must name exactly two servers, found {count}")]
    ServerCount { task: String, count: usize },

    #[error("task '{task}' names server '{server}' twice")]
    DuplicateServer { task: String, server: String },

    #[error("task '{task}' references unknown server '{server}'")]
    UnknownServer { task: String, server: String },

    #[error("task '{task}' has an invalid schedule: {message}")]
    Schedule { task: String, message: String },

    #[error("task '{task}' is {status}")]
    NotRunnable { task: String, status: TaskStatus },

    #[error(transparent)]
    Server(#[from] ServerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Stopped,
    Initializing,
    Running,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Stopped => "stopped",
            TaskStatus::Initializing => "initializing",
            TaskStatus::Running => "running",
            TaskStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One pairing of two servers, with its schedule and watermark.
pub struct SyncTask {
    config: TaskConfig,
    schedule: Schedule,
    reconciler: Arc<Reconciler>,
    watermark: Arc<Mutex<Option<HighWaterMark>>>,
    /// Held for the duration of a pass so scheduled cycles never overlap.
    pass: Mutex<()>,
    status: watch::Sender<TaskStatus>,
    cancel: CancellationToken,
}

impl SyncTask {
    /// Bind a task to two live servers from `registry`.
    pub fn new(config: &TaskConfig, registry: &ServerRegistry) -> Result<Self, TaskError> {
        let (a, b) = match config.which.as_slice() {
            [a, b] => (a, b),
            other => {
                return Err(TaskError::ServerCount {
                    task: config.name.clone(),
                    count: other.len(),
                })
            }
        };
        if a == b {
            return Err(TaskError::DuplicateServer {
                task: config.name.clone(),
                server: a.clone(),
            });
        }
        let lookup = |name: &String| {
            registry.get(name).cloned().ok_or_else(|| TaskError::UnknownServer {
                task: config.name.clone(),
                server: name.clone(),
            })
        };
        let (a, b) = (lookup(a)?, lookup(b)?);
        let schedule = config.schedule().map_err(|e| TaskError::Schedule {
            task: config.name.clone(),
            message: e.to_string(),
        })?;

        let (status, _) = watch::channel(TaskStatus::Stopped);
        Ok(Self {
            config: config.clone(),
            schedule,
            reconciler: Arc::new(Reconciler::new(&config.name, a, b)),
            watermark: Arc::new(Mutex::new(None)),
            pass: Mutex::new(()),
            status,
            cancel: CancellationToken::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn pairing(&self) -> Pairing {
        self.reconciler.pairing()
    }

    pub fn server(&self, peer: Peer) -> &ServerHandle {
        self.reconciler.handle(peer)
    }

    /// Enabled, not failed and not cancelled.
    pub fn is_run(&self) -> bool {
        self.config.run && self.status() != TaskStatus::Failed && !self.cancel.is_cancelled()
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status.subscribe()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop in-flight units at their next suspension point and park the task
    /// in `stopped`. A cancelled task never runs again.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.set_status(TaskStatus::Stopped);
    }

    pub async fn watermark(&self) -> Option<HighWaterMark> {
        *self.watermark.lock().await
    }

    fn set_status(&self, status: TaskStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            info!(
                operation = "task_status",
                task = %self.name(),
                from = %previous,
                to = %status,
                "Task status changed"
            );
        }
    }

    /// Bring the task to `running`: optional full pass, then seed the watermark.
    ///
    /// Any setup error leaves the task `failed`.
    #[instrument(skip(self), fields(task = %self.config.name))]
    pub async fn initialize(&self, full_sync: bool) -> Result<Option<CycleReport>, TaskError> {
        if !self.config.run {
            warn!(operation = "task_disabled", "Task is disabled, not starting");
            return Ok(None);
        }
        self.ensure_runnable()?;
        self.set_status(TaskStatus::Initializing);

        let result = async {
            let report = if full_sync { Some(self.full_pass().await?) } else { None };
            self.seed(None).await?;
            Ok::<_, TaskError>(report)
        }
        .await;

        match &result {
            Ok(_) if self.cancel.is_cancelled() => self.set_status(TaskStatus::Stopped),
            Ok(_) => self.set_status(TaskStatus::Running),
            Err(e) => {
                error!(operation = "task_init_failed", error = %e, "Task initialization failed");
                self.set_status(TaskStatus::Failed);
            }
        }
        result
    }

    /// Reconcile every item of the primary server's library.
    #[instrument(skip(self), fields(task = %self.config.name))]
    pub async fn run_full_sync(&self) -> Result<CycleReport, TaskError> {
        self.ensure_runnable()?;
        self.full_pass().await
    }

    async fn full_pass(&self) -> Result<CycleReport, TaskError> {
        let _pass = self.pass.lock().await;
        let primary = self.pairing().primary;
        let server = self.server(primary).server().clone();
        info!(
            operation = "full_sync_start",
            task = %self.name(),
            primary = %server.name(),
            strategy = %self.pairing().strategy,
            "Starting full sync"
        );

        let items = scanner::full_scan(server.as_ref()).await?;
        let units = items
            .into_iter()
            .map(|item| {
                let reconciler = self.reconciler.clone();
                (item.to_string(), async move { reconciler.reconcile_full(&item).await })
            })
            .collect();
        let report = self.orchestrator().run(units).await;

        info!(
            operation = "full_sync_complete",
            task = %self.name(),
            candidates = report.candidates,
            mutations = report.mutations,
            failed = report.failed,
            conflicts = report.conflicts,
            duration_ms = report.duration.as_millis() as u64,
            "Full sync complete"
        );
        Ok(report)
    }

    /// Reconcile what changed on either side since the last cycle.
    ///
    /// Without a watermark the cycle only seeds one and reconciles nothing.
    #[instrument(skip(self), fields(task = %self.config.name))]
    pub async fn run_incremental_cycle(&self) -> Result<CycleReport, TaskError> {
        self.ensure_runnable()?;
        let Ok(_pass) = self.pass.try_lock() else {
            warn!(operation = "cycle_overlap", task = %self.name(), "Previous pass still running, skipping cycle");
            return Ok(CycleReport::default());
        };

        let current = *self.watermark.lock().await;
        let Some(mark) = current else {
            self.seed(None).await?;
            return Ok(CycleReport::default());
        };

        let (a, b) = tokio::try_join!(
            Feeds::fetch(self.server(Peer::A).server().as_ref()),
            Feeds::fetch(self.server(Peer::B).server().as_ref()),
        )?;
        let candidates = scanner::incremental_candidates(&a, &b, &mark);
        if candidates.is_empty() {
            return Ok(CycleReport::default());
        }

        let units = candidates
            .into_iter()
            .map(|candidate| {
                let reconciler = self.reconciler.clone();
                let watermark = self.watermark.clone();
                (candidate.item.to_string(), async move {
                    reconciler.reconcile_candidate(&candidate, &watermark).await
                })
            })
            .collect();
        let report = self.orchestrator().run(units).await;

        info!(
            operation = "incremental_cycle_complete",
            task = %self.name(),
            candidates = report.candidates,
            mutations = report.mutations,
            failed = report.failed,
            duration_ms = report.duration.as_millis() as u64,
            "Incremental cycle complete"
        );
        Ok(report)
    }

    /// Seed the watermark from the current feeds, or at `since` when given.
    pub async fn seed(&self, since: Option<DateTime<Utc>>) -> Result<HighWaterMark, TaskError> {
        let mark = match since {
            Some(at) => HighWaterMark::at(at),
            None => {
                let (a, b) = tokio::try_join!(
                    Feeds::fetch(self.server(Peer::A).server().as_ref()),
                    Feeds::fetch(self.server(Peer::B).server().as_ref()),
                )?;
                HighWaterMark::seed(&a.history, &a.playing, &b.history, &b.playing, Utc::now())
            }
        };

        let mut guard = self.watermark.lock().await;
        let merged = match guard.as_mut() {
            Some(existing) => {
                existing.merge(&mark);
                *existing
            }
            None => *guard.insert(mark),
        };
        info!(operation = "watermark_seeded", task = %self.name(), watermark = ?merged, "Watermark seeded");
        Ok(merged)
    }

    fn ensure_runnable(&self) -> Result<(), TaskError> {
        let status = self.status();
        if status == TaskStatus::Failed || self.cancel.is_cancelled() {
            return Err(TaskError::NotRunnable {
                task: self.name().to_string(),
                status,
            });
        }
        Ok(())
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.name(),
            self.server(Peer::A),
            self.server(Peer::B),
            self.cancel.clone(),
        )
    }
}
