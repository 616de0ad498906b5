use crate::watermark::Peer;
use serde::Serialize;
use std::fmt;
use watch_sync_models::{Precision, ServerFamily, ServerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PairStrategy {
    /// Plex on one side, Emby or Jellyfin on the other.
    PlexEmby,
    PlexPlex,
    EmbyEmby,
}

impl fmt::Display for PairStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PairStrategy::PlexEmby => "plex-emby",
            PairStrategy::PlexPlex => "plex-plex",
            PairStrategy::EmbyEmby => "emby-emby",
        };
        f.write_str(label)
    }
}

/// How a task treats its two servers, fixed when the task is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pairing {
    pub strategy: PairStrategy,
    /// The server whose library a full scan walks.
    pub primary: Peer,
    pub precision: Precision,
}

impl Pairing {
    pub fn new(a: ServerKind, b: ServerKind) -> Self {
        let (strategy, primary) = match (a.family(), b.family()) {
            (ServerFamily::Plex, ServerFamily::Plex) => (PairStrategy::PlexPlex, Peer::A),
            (ServerFamily::Emby, ServerFamily::Emby) => (PairStrategy::EmbyEmby, Peer::A),
            (ServerFamily::Plex, ServerFamily::Emby) => (PairStrategy::PlexEmby, Peer::A),
            (ServerFamily::Emby, ServerFamily::Plex) => (PairStrategy::PlexEmby, Peer::B),
        };
        Self {
            strategy,
            primary,
            precision: Precision::for_pair(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plex_side_is_primary() {
        let pairing = Pairing::new(ServerKind::Jellyfin, ServerKind::Plex);
        assert_eq!(pairing.strategy, PairStrategy::PlexEmby);
        assert_eq!(pairing.primary, Peer::B);
        assert_eq!(pairing.precision, Precision::Milliseconds);
    }

    #[test]
    fn test_same_family_pairs() {
        let pairing = Pairing::new(ServerKind::Emby, ServerKind::Jellyfin);
        assert_eq!(pairing.strategy, PairStrategy::EmbyEmby);
        assert_eq!(pairing.primary, Peer::A);
        assert_eq!(pairing.precision, Precision::Ticks);

        let pairing = Pairing::new(ServerKind::Plex, ServerKind::Plex);
        assert_eq!(pairing.strategy, PairStrategy::PlexPlex);
        assert_eq!(pairing.precision, Precision::Milliseconds);
    }
}
