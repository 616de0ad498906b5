//! In-process [`MediaServer`] backed by a list of items.
//!
//! Feeds are derived from item state, so a mutation made by the engine shows
//! up in the next `history` or `hub_continue` call just as it would on a real
//! server.

use crate::{MediaServer, ServerError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use watch_sync_models::{MediaKind, MediaRef, ProviderIds, Section, SectionKind, ServerKind, Ticks};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    MarkWatched(String),
    SetProgress(String, Ticks),
}

#[derive(Default)]
struct State {
    sections: Vec<Section>,
    /// Items with the id of the section holding them; episodes have none.
    items: Vec<(Option<String>, MediaRef)>,
    mutations: Vec<Mutation>,
    failing: HashSet<String>,
    feeds_down: bool,
}

pub struct MemoryServer {
    name: String,
    kind: ServerKind,
    state: Mutex<State>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    feed_limit: usize,
}

const MOVIES: &str = "1";
const SHOWS: &str = "2";

impl MemoryServer {
    pub fn new(name: &str, kind: ServerKind) -> Self {
        let state = State {
            sections: vec![
                Section::new(MOVIES, "Movies", SectionKind::Movies),
                Section::new(SHOWS, "TV Shows", SectionKind::Shows),
            ],
            ..State::default()
        };
        Self {
            name: name.to_string(),
            kind,
            state: Mutex::new(state),
            latency: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            feed_limit: 20,
        }
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_feed_limit(mut self, limit: usize) -> Self {
        self.feed_limit = limit;
        self
    }

    pub fn add_section(&self, section: Section) {
        self.lock().sections.push(section);
    }

    /// Add a movie or show to the default section for its kind.
    pub fn add_item(&self, item: MediaRef) -> MediaRef {
        let section = match item.kind {
            MediaKind::Movie => Some(MOVIES.to_string()),
            MediaKind::Show => Some(SHOWS.to_string()),
            MediaKind::Episode { .. } => None,
        };
        self.lock().items.push((section, item.clone()));
        item
    }

    pub fn add_item_to(&self, section_id: &str, item: MediaRef) -> MediaRef {
        self.lock().items.push((Some(section_id.to_string()), item.clone()));
        item
    }

    pub fn add_episode(&self, episode: MediaRef) -> MediaRef {
        self.lock().items.push((None, episode.clone()));
        episode
    }

    /// Current stored state of an item.
    pub fn item(&self, id: &str) -> Option<MediaRef> {
        self.lock().items.iter().find(|(_, m)| m.id == id).map(|(_, m)| m.clone())
    }

    /// Replace an item's stored state, e.g. to simulate playback on this server.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut MediaRef)) {
        if let Some((_, item)) = self.lock().items.iter_mut().find(|(_, m)| m.id == id) {
            f(item);
        }
    }

    /// Make every call touching this item id fail.
    pub fn fail_item(&self, id: &str) {
        self.lock().failing.insert(id.to_string());
    }

    /// Make the `history` and `hub_continue` feeds fail.
    pub fn set_feeds_down(&self, down: bool) {
        self.lock().feeds_down = down;
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().mutations.len()
    }

    pub fn clear_mutations(&self) {
        self.lock().mutations.clear();
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self) -> CallGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = CallGuard(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn check(&self, id: &str) -> Result<(), ServerError> {
        if self.lock().failing.contains(id) {
            return Err(ServerError::Status {
                server: self.name.clone(),
                path: format!("/items/{}", id),
                status: 500,
            });
        }
        Ok(())
    }

    fn check_feeds(&self) -> Result<(), ServerError> {
        if self.lock().feeds_down {
            return Err(ServerError::Status {
                server: self.name.clone(),
                path: "/feeds".to_string(),
                status: 503,
            });
        }
        Ok(())
    }

    fn not_found(&self, id: &str) -> ServerError {
        ServerError::NotFound {
            server: self.name.clone(),
            id: id.to_string(),
        }
    }

    fn record(&self, id: &str, mutation: Mutation, apply: impl FnOnce(&mut MediaRef)) -> Result<(), ServerError> {
        self.check(id)?;
        let mut state = self.lock();
        let item = state
            .items
            .iter_mut()
            .find(|(_, m)| m.id == id)
            .map(|(_, m)| m)
            .ok_or_else(|| self.not_found(id))?;
        apply(item);
        state.mutations.push(mutation);
        Ok(())
    }
}

struct CallGuard<'a>(&'a AtomicUsize);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaServer for MemoryServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ServerKind {
        self.kind
    }

    async fn history(&self) -> Result<Vec<MediaRef>, ServerError> {
        let _call = self.enter().await;
        self.check_feeds()?;
        let mut played: Vec<MediaRef> = self
            .lock()
            .items
            .iter()
            .map(|(_, m)| m)
            .filter(|m| m.played && !matches!(m.kind, MediaKind::Show))
            .cloned()
            .collect();
        played.sort_by(|a, b| b.last_played_at.cmp(&a.last_played_at));
        played.truncate(self.feed_limit);
        Ok(played)
    }

    async fn hub_continue(&self) -> Result<Vec<MediaRef>, ServerError> {
        let _call = self.enter().await;
        self.check_feeds()?;
        let mut playing: Vec<MediaRef> = self
            .lock()
            .items
            .iter()
            .map(|(_, m)| m)
            .filter(|m| !m.played && m.has_offset() && m.last_playing_at.is_some())
            .cloned()
            .collect();
        playing.sort_by(|a, b| b.last_playing_at.cmp(&a.last_playing_at));
        playing.truncate(self.feed_limit);
        Ok(playing)
    }

    async fn guid_search(&self, ids: &ProviderIds) -> Result<Vec<MediaRef>, ServerError> {
        let _call = self.enter().await;
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|(section, m)| section.is_some() && m.ids.shares_any(ids))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn library(&self) -> Result<Vec<Section>, ServerError> {
        let _call = self.enter().await;
        Ok(self.lock().sections.clone())
    }

    async fn section_items(&self, section: &Section) -> Result<Vec<MediaRef>, ServerError> {
        let _call = self.enter().await;
        self.check(&section.id)?;
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|(s, _)| s.as_deref() == Some(section.id.as_str()))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn episodes(&self, show: &MediaRef) -> Result<Vec<MediaRef>, ServerError> {
        let _call = self.enter().await;
        self.check(&show.id)?;
        Ok(self
            .lock()
            .items
            .iter()
            .map(|(_, m)| m)
            .filter(|m| m.is_episode() && m.show_id.as_deref() == Some(show.id.as_str()))
            .cloned()
            .collect())
    }

    async fn show_of(&self, episode: &MediaRef) -> Result<MediaRef, ServerError> {
        let _call = self.enter().await;
        let show_id = episode
            .show_id
            .as_deref()
            .ok_or_else(|| self.not_found(&format!("show of {}", episode.id)))?;
        self.check(show_id)?;
        self.item(show_id).ok_or_else(|| self.not_found(show_id))
    }

    async fn fetch_item(&self, item: &MediaRef) -> Result<MediaRef, ServerError> {
        let _call = self.enter().await;
        self.check(&item.id)?;
        self.item(&item.id).ok_or_else(|| self.not_found(&item.id))
    }

    async fn mark_watched(&self, item: &MediaRef) -> Result<(), ServerError> {
        let _call = self.enter().await;
        self.record(&item.id, Mutation::MarkWatched(item.id.clone()), |m| {
            m.played = true;
            m.resume_offset = None;
            m.last_played_at = Some(Utc::now());
        })
    }

    async fn set_progress(&self, item: &MediaRef, offset: Ticks) -> Result<(), ServerError> {
        let _call = self.enter().await;
        let native = offset.from_canonical(self.kind);
        self.record(&item.id, Mutation::SetProgress(item.id.clone(), offset), |m| {
            m.resume_offset = Some(native);
            m.last_playing_at = Some(Utc::now());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_feeds_follow_mutations() {
        let server = MemoryServer::new("emby", ServerKind::Emby);
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let movie = server.add_item(
            MediaRef::movie(ServerKind::Emby, "m1", "Heat")
                .with_ids(ProviderIds::new().with_tmdb("949"))
                .with_progress(1_000, at),
        );

        assert_eq!(server.hub_continue().await.unwrap().len(), 1);
        assert!(server.history().await.unwrap().is_empty());

        server.mark_watched(&movie).await.unwrap();
        assert!(server.hub_continue().await.unwrap().is_empty());
        let history = server.history().await.unwrap();
        assert_eq!(history[0].id, "m1");
        assert_eq!(server.mutations(), vec![Mutation::MarkWatched("m1".into())]);
    }

    #[tokio::test]
    async fn test_progress_stored_natively() {
        let server = MemoryServer::new("plex", ServerKind::Plex);
        let movie = server.add_item(MediaRef::movie(ServerKind::Plex, "1", "Heat"));
        server.set_progress(&movie, Ticks(12_345_678)).await.unwrap();
        let stored = server.item("1").unwrap();
        assert_eq!(stored.resume_offset, Some(1_234));
        assert_eq!(stored.offset(), Some(Ticks(12_340_000)));
    }

    #[tokio::test]
    async fn test_failures_and_lookup() {
        let server = MemoryServer::new("jf", ServerKind::Jellyfin);
        let show = server.add_item(MediaRef::show(ServerKind::Jellyfin, "s1", "Dark"));
        server.add_episode(MediaRef::episode(ServerKind::Jellyfin, "e1", &show, 1, 1));

        let ep = server.episode(&show, 1, 1).await.unwrap().unwrap();
        assert_eq!(server.show_of(&ep).await.unwrap().id, "s1");
        assert!(server.episode(&show, 1, 2).await.unwrap().is_none());

        server.fail_item("e1");
        assert!(server.mark_watched(&ep).await.is_err());
        assert_eq!(server.mutation_count(), 0);

        server.set_feeds_down(true);
        assert!(server.history().await.is_err());
    }

    #[tokio::test]
    async fn test_feed_limit_keeps_most_recent() {
        let server = MemoryServer::new("plex", ServerKind::Plex).with_feed_limit(2);
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        for i in 0..4 {
            let id = format!("m{}", i);
            server.add_item(MediaRef::movie(ServerKind::Plex, &id, "Movie"));
            server.update(&id, |m| {
                m.played = true;
                m.last_played_at = Some(base + chrono::Duration::minutes(i));
            });
        }

        let history = server.history().await.unwrap();
        let ids: Vec<&str> = history.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m2"]);
        assert_eq!(server.mutation_count(), 0);
    }
}
