//! Bounded fan-out of reconciliation units.

use crate::report::{CycleReport, UnitReport};
use std::future::Future;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use watch_sync_servers::{ServerError, ServerHandle};

enum UnitOutcome {
    Done(UnitReport),
    Failed(ServerError),
    Cancelled,
}

/// Runs units for one task, each holding a permit on both of its servers.
pub struct Orchestrator {
    task: String,
    /// Acquisition order is by server name so tasks sharing a server cannot
    /// deadlock on each other's permits.
    servers: Vec<ServerHandle>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(task: &str, a: &ServerHandle, b: &ServerHandle, cancel: CancellationToken) -> Self {
        let mut servers = vec![a.clone(), b.clone()];
        servers.sort_by(|x, y| x.name().cmp(y.name()));
        Self {
            task: task.to_string(),
            servers,
            cancel,
        }
    }

    /// Run every unit to completion, or until cancelled.
    ///
    /// A failing or panicking unit is logged and counted; it never stops the
    /// others.
    pub async fn run<Fut>(&self, units: Vec<(String, Fut)>) -> CycleReport
    where
        Fut: Future<Output = Result<UnitReport, ServerError>> + Send + 'static,
    {
        let started = Instant::now();
        let mut report = CycleReport {
            candidates: units.len(),
            ..CycleReport::default()
        };

        let mut set = JoinSet::new();
        for (label, unit) in units {
            let servers = self.servers.clone();
            let cancel = self.cancel.clone();
            set.spawn(async move {
                let guarded = async move {
                    let mut permits = Vec::with_capacity(servers.len());
                    for server in &servers {
                        match server.acquire().await {
                            Ok(permit) => permits.push(permit),
                            Err(_) => return UnitOutcome::Cancelled,
                        }
                    }
                    let outcome = match unit.await {
                        Ok(unit_report) => UnitOutcome::Done(unit_report),
                        Err(e) => UnitOutcome::Failed(e),
                    };
                    drop(permits);
                    outcome
                };
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => UnitOutcome::Cancelled,
                    outcome = guarded => outcome,
                };
                (label, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, UnitOutcome::Done(unit))) => report.record(unit),
                Ok((label, UnitOutcome::Failed(e))) => {
                    report.failed += 1;
                    error!(
                        operation = "unit_failed",
                        task = %self.task,
                        item = %label,
                        error = %e,
                        "Reconciliation failed"
                    );
                }
                Ok((label, UnitOutcome::Cancelled)) => {
                    report.cancelled += 1;
                    debug!(task = %self.task, item = %label, "Unit cancelled");
                }
                Err(e) if e.is_panic() => {
                    report.failed += 1;
                    error!(
                        operation = "unit_panicked",
                        task = %self.task,
                        error = %e,
                        "Reconciliation unit panicked"
                    );
                }
                Err(e) => {
                    report.cancelled += 1;
                    warn!(task = %self.task, error = %e, "Unit aborted");
                }
            }
        }

        report.duration = started.elapsed();
        report
    }
}
