//! Candidate discovery: the whole library, or only what changed since the
//! last cycle.

use crate::watermark::{Channel, HighWaterMark, Peer};
use chrono::{DateTime, Utc};
use tracing::debug;
use watch_sync_models::MediaRef;
use watch_sync_servers::{MediaServer, ServerError};

/// Both recency feeds of one server, newest first.
#[derive(Debug, Clone, Default)]
pub struct Feeds {
    pub history: Vec<MediaRef>,
    pub playing: Vec<MediaRef>,
}

impl Feeds {
    pub async fn fetch(server: &dyn MediaServer) -> Result<Self, ServerError> {
        let (history, playing) = tokio::try_join!(server.history(), server.hub_continue())?;
        debug!(
            server = %server.name(),
            history = history.len(),
            playing = playing.len(),
            "Fetched recency feeds"
        );
        Ok(Self { history, playing })
    }

    pub fn channel(&self, channel: Channel) -> &[MediaRef] {
        match channel {
            Channel::Played => &self.history,
            Channel::Playing => &self.playing,
        }
    }
}

/// One item to reconcile during an incremental cycle.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub item: MediaRef,
    pub from: Peer,
    pub channel: Channel,
}

/// Leading entries strictly newer than `mark`.
///
/// The walk stops at the first entry that is not newer, or that has no
/// timestamp for `channel`.
pub fn newer_than(entries: &[MediaRef], mark: DateTime<Utc>, channel: Channel) -> Vec<MediaRef> {
    entries
        .iter()
        .take_while(|item| channel.timestamp(item).is_some_and(|at| at > mark))
        .cloned()
        .collect()
}

/// Every feed entry of either server that the watermark has not yet covered.
pub fn incremental_candidates(a: &Feeds, b: &Feeds, mark: &HighWaterMark) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (peer, feeds) in [(Peer::A, a), (Peer::B, b)] {
        for channel in [Channel::Played, Channel::Playing] {
            let fresh = newer_than(feeds.channel(channel), mark.get(peer, channel), channel);
            candidates.extend(fresh.into_iter().map(|item| Candidate {
                item,
                from: peer,
                channel,
            }));
        }
    }
    candidates
}

/// Every movie and show in the syncable sections of `server`.
pub async fn full_scan(server: &dyn MediaServer) -> Result<Vec<MediaRef>, ServerError> {
    let mut items = Vec::new();
    for section in server.library().await? {
        if !section.is_syncable() {
            debug!(server = %server.name(), section = %section.title, "Skipping section");
            continue;
        }
        let found = server.section_items(&section).await?;
        debug!(
            server = %server.name(),
            section = %section.title,
            items = found.len(),
            "Listed section"
        );
        items.extend(found);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use watch_sync_models::{Section, SectionKind, ServerKind};
    use watch_sync_servers::MemoryServer;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 20, minute, 0).unwrap()
    }

    fn played(id: &str, minute: u32) -> MediaRef {
        MediaRef::movie(ServerKind::Emby, id, id).with_played(t(minute))
    }

    #[test]
    fn test_three_newer_of_five() {
        let entries = vec![
            played("e", 50),
            played("d", 40),
            played("c", 30),
            played("b", 20),
            played("a", 10),
        ];
        let fresh = newer_than(&entries, t(25), Channel::Played);
        let ids: Vec<_> = fresh.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["e", "d", "c"]);
    }

    #[test]
    fn test_equal_or_missing_timestamp_stops_walk() {
        let entries = vec![played("c", 30), played("b", 20), played("a", 40)];
        assert_eq!(newer_than(&entries, t(20), Channel::Played).len(), 1);

        let untimed = MediaRef::movie(ServerKind::Emby, "x", "x");
        let entries = vec![played("c", 30), untimed, played("a", 40)];
        assert_eq!(newer_than(&entries, t(0), Channel::Played).len(), 1);

        // Played entries carry no playing timestamp
        assert!(newer_than(&[played("c", 30)], t(0), Channel::Playing).is_empty());
    }

    #[test]
    fn test_candidates_tagged_by_origin() {
        let a = Feeds {
            history: vec![played("a1", 30)],
            playing: vec![],
        };
        let b = Feeds {
            history: vec![played("b1", 31), played("b0", 5)],
            playing: vec![MediaRef::movie(ServerKind::Emby, "b2", "b2").with_progress(100, t(32))],
        };
        let candidates = incremental_candidates(&a, &b, &HighWaterMark::at(t(10)));
        let tags: Vec<_> = candidates.iter().map(|c| (c.item.id.as_str(), c.from, c.channel)).collect();
        assert_eq!(
            tags,
            vec![
                ("a1", Peer::A, Channel::Played),
                ("b1", Peer::B, Channel::Played),
                ("b2", Peer::B, Channel::Playing),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_scan_skips_other_sections() {
        let server = MemoryServer::new("plex", ServerKind::Plex);
        server.add_section(Section::new("9", "Music", SectionKind::Other));
        server.add_item(MediaRef::movie(ServerKind::Plex, "1", "Heat"));
        server.add_item(MediaRef::show(ServerKind::Plex, "2", "Dark"));
        server.add_item_to("9", MediaRef::movie(ServerKind::Plex, "3", "Concert"));

        let items = full_scan(&server).await.unwrap();
        let ids: Vec<_> = items.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
