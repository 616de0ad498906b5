use crate::{ProviderIds, ServerKind, Ticks};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movie,
    Show,
    Episode { season: u32, episode: u32 },
}

impl MediaKind {
    /// Movies match movies, shows match shows, episodes match episodes.
    pub fn same_class(&self, other: &MediaKind) -> bool {
        matches!(
            (self, other),
            (MediaKind::Movie, MediaKind::Movie)
                | (MediaKind::Show, MediaKind::Show)
                | (MediaKind::Episode { .. }, MediaKind::Episode { .. })
        )
    }

    pub fn episode_number(&self) -> Option<(u32, u32)> {
        match self {
            MediaKind::Episode { season, episode } => Some((*season, *episode)),
            _ => None,
        }
    }
}

/// Handle to one playable unit on one server, as reported by its last response.
///
/// Offsets and runtimes are in the server's native unit; use
/// [`MediaRef::offset`] for the canonical value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub server_kind: ServerKind,
    pub kind: MediaKind,
    pub title: String,
    #[serde(default)]
    pub ids: ProviderIds,
    pub played: bool,
    pub resume_offset: Option<u64>,
    pub duration: Option<u64>,
    pub last_played_at: Option<DateTime<Utc>>,
    pub last_playing_at: Option<DateTime<Utc>>,
    /// Server-local id of the owning show (episodes only).
    pub show_id: Option<String>,
    /// Show title, kept for log lines on episodes.
    pub show_title: Option<String>,
}

impl MediaRef {
    pub fn new(server_kind: ServerKind, kind: MediaKind, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            server_kind,
            kind,
            title: title.into(),
            ids: ProviderIds::default(),
            played: false,
            resume_offset: None,
            duration: None,
            last_played_at: None,
            last_playing_at: None,
            show_id: None,
            show_title: None,
        }
    }

    pub fn movie(server_kind: ServerKind, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(server_kind, MediaKind::Movie, id, title)
    }

    pub fn show(server_kind: ServerKind, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(server_kind, MediaKind::Show, id, title)
    }

    pub fn episode(
        server_kind: ServerKind,
        id: impl Into<String>,
        show: &MediaRef,
        season: u32,
        episode: u32,
    ) -> Self {
        let mut ep = Self::new(
            server_kind,
            MediaKind::Episode { season, episode },
            id,
            format!("{} S{:02}E{:02}", show.title, season, episode),
        );
        ep.show_id = Some(show.id.clone());
        ep.show_title = Some(show.title.clone());
        ep
    }

    pub fn with_ids(mut self, ids: ProviderIds) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_played(mut self, at: DateTime<Utc>) -> Self {
        self.played = true;
        self.last_played_at = Some(at);
        self
    }

    pub fn with_progress(mut self, native_offset: u64, at: DateTime<Utc>) -> Self {
        self.resume_offset = Some(native_offset);
        self.last_playing_at = Some(at);
        self
    }

    /// Resume position in canonical ticks.
    pub fn offset(&self) -> Option<Ticks> {
        self.resume_offset.map(|o| Ticks::to_canonical(o, self.server_kind))
    }

    pub fn has_offset(&self) -> bool {
        self.resume_offset.is_some_and(|o| o > 0)
    }

    /// Played, or carrying any sign of a partial play.
    pub fn is_touched(&self) -> bool {
        self.played || self.has_offset() || self.last_playing_at.is_some()
    }

    /// Latest activity of any kind.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match (self.last_played_at, self.last_playing_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_episode(&self) -> bool {
        matches!(self.kind, MediaKind::Episode { .. })
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}:{}]", self.title, self.server_kind, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    Movies,
    Shows,
    Other,
}

/// A library section (Plex) or user view (Emby family).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub kind: SectionKind,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: SectionKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
        }
    }

    /// Only movie and show sections carry watch state worth syncing.
    pub fn is_syncable(&self) -> bool {
        !matches!(self.kind, SectionKind::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_offset_is_canonical() {
        let movie = MediaRef::movie(ServerKind::Plex, "1", "Heat").with_progress(1_000, Utc::now());
        assert_eq!(movie.offset(), Some(Ticks(10_000_000)));

        let movie = MediaRef::movie(ServerKind::Emby, "1", "Heat").with_progress(1_000, Utc::now());
        assert_eq!(movie.offset(), Some(Ticks(1_000)));
    }

    #[test]
    fn test_episode_links_show() {
        let show = MediaRef::show(ServerKind::Emby, "s1", "The Wire");
        let ep = MediaRef::episode(ServerKind::Emby, "e1", &show, 2, 3);
        assert_eq!(ep.show_id.as_deref(), Some("s1"));
        assert_eq!(ep.kind.episode_number(), Some((2, 3)));
        assert_eq!(ep.title, "The Wire S02E03");
    }

    #[test]
    fn test_touched_and_activity() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let movie = MediaRef::movie(ServerKind::Plex, "1", "Heat");
        assert!(!movie.is_touched());
        assert_eq!(movie.last_activity(), None);

        let movie = movie.with_played(early).with_progress(5, late);
        assert!(movie.is_touched());
        assert_eq!(movie.last_activity(), Some(late));
    }

    #[test]
    fn test_kind_classes() {
        let ep = MediaKind::Episode { season: 1, episode: 1 };
        assert!(ep.same_class(&MediaKind::Episode { season: 4, episode: 2 }));
        assert!(!MediaKind::Movie.same_class(&MediaKind::Show));
    }
}
