use crate::decision::{decide, PlaybackState, ReconciliationAction, Side};
use crate::identity;
use crate::pair::Pairing;
use crate::report::UnitReport;
use crate::scanner::Candidate;
use crate::watermark::{Channel, HighWaterMark, Peer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use watch_sync_models::{MediaKind, MediaRef, Ticks};
use watch_sync_servers::{MediaServer, ServerError, ServerHandle};

/// Applies the decision table between the two servers of one task.
pub struct Reconciler {
    task: String,
    a: ServerHandle,
    b: ServerHandle,
    pairing: Pairing,
}

impl Reconciler {
    pub fn new(task: &str, a: ServerHandle, b: ServerHandle) -> Self {
        let pairing = Pairing::new(a.kind(), b.kind());
        Self {
            task: task.to_string(),
            a,
            b,
            pairing,
        }
    }

    pub fn pairing(&self) -> Pairing {
        self.pairing
    }

    pub fn handle(&self, peer: Peer) -> &ServerHandle {
        match peer {
            Peer::A => &self.a,
            Peer::B => &self.b,
        }
    }

    fn server(&self, peer: Peer) -> &dyn MediaServer {
        self.handle(peer).server().as_ref()
    }

    /// Reconcile one item listed from the primary server during a full scan.
    pub async fn reconcile_full(&self, item: &MediaRef) -> Result<UnitReport, ServerError> {
        let from = self.pairing.primary;
        let source = self.server(from);
        let target = self.server(from.other());

        let Some(counterpart) = identity::counterpart(item, source, target).await? else {
            return Ok(UnitReport::skipped());
        };

        match item.kind {
            MediaKind::Show => self.reconcile_show(from, item, &counterpart).await,
            _ => self.reconcile_movie(from, item, &counterpart).await,
        }
    }

    /// Apply the decision table to one matched pair.
    pub async fn reconcile_movie(
        &self,
        from: Peer,
        source: &MediaRef,
        target: &MediaRef,
    ) -> Result<UnitReport, ServerError> {
        let action = decide(
            &PlaybackState::from(source),
            &PlaybackState::from(target),
            self.pairing.precision,
        );
        self.apply(from, source, target, action).await
    }

    /// Reconcile every episode the two shows have in common.
    pub async fn reconcile_show(
        &self,
        from: Peer,
        source_show: &MediaRef,
        target_show: &MediaRef,
    ) -> Result<UnitReport, ServerError> {
        let source_episodes = self.server(from).episodes(source_show).await?;
        let target_episodes = self.server(from.other()).episodes(target_show).await?;

        let touched = source_show.is_touched()
            || target_show.is_touched()
            || source_episodes.iter().any(MediaRef::is_touched)
            || target_episodes.iter().any(MediaRef::is_touched);
        if !touched {
            debug!(task = %self.task, item = %source_show, "Show untouched on both sides");
            return Ok(UnitReport::default());
        }

        let mut by_number: HashMap<(u32, u32), MediaRef> = target_episodes
            .into_iter()
            .filter_map(|ep| ep.kind.episode_number().map(|n| (n, ep)))
            .collect();

        let mut report = UnitReport::default();
        for episode in &source_episodes {
            let Some(number) = episode.kind.episode_number() else {
                continue;
            };
            match by_number.remove(&number) {
                Some(counterpart) => report.absorb(self.reconcile_movie(from, episode, &counterpart).await?),
                None => debug!(
                    task = %self.task,
                    server = %self.handle(from.other()).name(),
                    item = %episode,
                    "Episode missing on target"
                ),
            }
        }
        for leftover in by_number.values() {
            debug!(
                task = %self.task,
                server = %self.handle(from).name(),
                item = %leftover,
                "Episode missing on source"
            );
        }
        Ok(report)
    }

    async fn apply(
        &self,
        from: Peer,
        source: &MediaRef,
        target: &MediaRef,
        action: ReconciliationAction,
    ) -> Result<UnitReport, ServerError> {
        let pick = |side: Side| match side {
            Side::Source => (self.handle(from), source),
            Side::Target => (self.handle(from.other()), target),
        };

        match action {
            ReconciliationAction::None => Ok(UnitReport::default()),
            ReconciliationAction::MarkWatched(side) => {
                let (handle, item) = pick(side);
                handle.server().mark_watched(item).await?;
                info!(
                    operation = "mark_watched",
                    task = %self.task,
                    server = %handle.name(),
                    item = %item,
                    "Marked watched"
                );
                Ok(UnitReport {
                    mutations: 1,
                    ..UnitReport::default()
                })
            }
            ReconciliationAction::SyncProgress { side, offset } => {
                let (handle, item) = pick(side);
                handle.server().set_progress(item, offset).await?;
                info!(
                    operation = "set_progress",
                    task = %self.task,
                    server = %handle.name(),
                    item = %item,
                    offset = %offset,
                    "Updated resume position"
                );
                Ok(UnitReport {
                    mutations: 1,
                    ..UnitReport::default()
                })
            }
            ReconciliationAction::Unresolved => {
                error!(
                    operation = "unresolved_conflict",
                    task = %self.task,
                    source = %source,
                    target = %target,
                    source_playing_at = ?source.last_playing_at,
                    "Cannot decide which side is current"
                );
                Ok(UnitReport {
                    conflicts: 1,
                    ..UnitReport::default()
                })
            }
        }
    }

    /// Push one feed entry to the other server, then commit the watermark.
    pub async fn reconcile_candidate(
        &self,
        candidate: &Candidate,
        watermark: &Arc<Mutex<Option<HighWaterMark>>>,
    ) -> Result<UnitReport, ServerError> {
        let from = candidate.from;
        let item = &candidate.item;
        let target = self.handle(from.other());

        let Some(counterpart) = identity::counterpart(item, self.server(from), target.server().as_ref()).await? else {
            commit(watermark, candidate, None).await;
            return Ok(UnitReport::skipped());
        };

        let mut report = UnitReport::default();
        match candidate.channel {
            Channel::Played if !counterpart.played => {
                target.server().mark_watched(&counterpart).await?;
                info!(
                    operation = "mark_watched",
                    task = %self.task,
                    server = %target.name(),
                    item = %counterpart,
                    "Marked watched"
                );
                report.mutations = 1;
            }
            Channel::Playing => {
                let offset = item.offset().unwrap_or(Ticks::ZERO);
                let current = counterpart.offset().unwrap_or(Ticks::ZERO);
                let precision = self.pairing.precision;
                if !offset.is_zero() && offset.truncate(precision) != current.truncate(precision) {
                    target.server().set_progress(&counterpart, offset).await?;
                    info!(
                        operation = "set_progress",
                        task = %self.task,
                        server = %target.name(),
                        item = %counterpart,
                        offset = %offset,
                        "Updated resume position"
                    );
                    report.mutations = 1;
                }
            }
            Channel::Played => {}
        }

        let refreshed = if report.mutations > 0 {
            Some(target.server().fetch_item(&counterpart).await?)
        } else {
            None
        };
        commit(watermark, candidate, refreshed.as_ref()).await;
        Ok(report)
    }
}

/// Advance the source mark past `candidate`, and the target marks past our
/// own write so it is not read back as new activity.
async fn commit(
    watermark: &Arc<Mutex<Option<HighWaterMark>>>,
    candidate: &Candidate,
    refreshed_target: Option<&MediaRef>,
) {
    let mut guard = watermark.lock().await;
    let Some(mark) = guard.as_mut() else {
        return;
    };
    if let Some(at) = candidate.channel.timestamp(&candidate.item) {
        mark.advance(candidate.from, candidate.channel, at);
    }
    if let Some(target) = refreshed_target {
        for channel in [Channel::Played, Channel::Playing] {
            if let Some(at) = channel.timestamp(target) {
                mark.advance(candidate.from.other(), channel, at);
            }
        }
    }
}

#[cfg(test)]
mod tests;
