//! Playback offset units.
//!
//! Every comparison happens on [`Ticks`] (100 ns, the Emby family's native
//! unit). Plex reports and accepts milliseconds.

use crate::{ServerFamily, ServerKind};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TICKS_PER_MILLISECOND: u64 = 10_000;

/// Canonical playback offset in 100 ns ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticks(pub u64);

/// Resolution at which two offsets are considered equal.
///
/// Any pair involving Plex can only be compared to the millisecond, because
/// writing a tick value to Plex truncates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Ticks,
    Milliseconds,
}

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    pub fn from_millis(ms: u64) -> Self {
        Ticks(ms.saturating_mul(TICKS_PER_MILLISECOND))
    }

    pub fn as_millis(&self) -> u64 {
        self.0 / TICKS_PER_MILLISECOND
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Drop the sub-unit remainder for the given precision.
    pub fn truncate(self, precision: Precision) -> Ticks {
        match precision {
            Precision::Ticks => self,
            Precision::Milliseconds => Ticks::from_millis(self.as_millis()),
        }
    }

    /// Convert a server-native offset to ticks.
    pub fn to_canonical(native: u64, kind: ServerKind) -> Ticks {
        match kind.family() {
            ServerFamily::Plex => Ticks::from_millis(native),
            ServerFamily::Emby => Ticks(native),
        }
    }

    /// Convert ticks to the server's native unit (truncating for Plex).
    pub fn from_canonical(self, kind: ServerKind) -> u64 {
        match kind.family() {
            ServerFamily::Plex => self.as_millis(),
            ServerFamily::Emby => self.0,
        }
    }
}

impl Precision {
    /// Coarsest precision shared by both servers of a pair.
    pub fn for_pair(a: ServerKind, b: ServerKind) -> Precision {
        if a.family() == ServerFamily::Plex || b.family() == ServerFamily::Plex {
            Precision::Milliseconds
        } else {
            Precision::Ticks
        }
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.0 / (TICKS_PER_MILLISECOND * 1000);
        write!(f, "{}:{:02}:{:02}", total_secs / 3600, (total_secs / 60) % 60, total_secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plex_milliseconds_round_trip() {
        let ticks = Ticks::to_canonical(1_234_567, ServerKind::Plex);
        assert_eq!(ticks, Ticks(12_345_670_000));
        assert_eq!(ticks.from_canonical(ServerKind::Plex), 1_234_567);
    }

    #[test]
    fn test_emby_family_is_identity() {
        let ticks = Ticks::to_canonical(5_000_123, ServerKind::Jellyfin);
        assert_eq!(ticks, Ticks(5_000_123));
        assert_eq!(ticks.from_canonical(ServerKind::Emby), 5_000_123);
    }

    #[test]
    fn test_ms_aligned_ticks_survive_plex() {
        let ticks = Ticks(500_000);
        let native = ticks.from_canonical(ServerKind::Plex);
        assert_eq!(Ticks::to_canonical(native, ServerKind::Plex), ticks);
    }

    #[test]
    fn test_sub_millisecond_ticks_truncate() {
        let ticks = Ticks(500_037);
        assert_eq!(ticks.from_canonical(ServerKind::Plex), 50);
        assert_eq!(ticks.truncate(Precision::Milliseconds), Ticks(500_000));
        assert_eq!(ticks.truncate(Precision::Ticks), ticks);
    }

    #[test]
    fn test_pair_precision() {
        assert_eq!(Precision::for_pair(ServerKind::Plex, ServerKind::Emby), Precision::Milliseconds);
        assert_eq!(Precision::for_pair(ServerKind::Jellyfin, ServerKind::Emby), Precision::Ticks);
        assert_eq!(Precision::for_pair(ServerKind::Plex, ServerKind::Plex), Precision::Milliseconds);
    }

    #[test]
    fn test_display_as_clock() {
        assert_eq!(Ticks::from_millis(3_723_000).to_string(), "1:02:03");
    }
}
