//! The per-item decision table.
//!
//! Pure: the same two states always produce the same action, and nothing here
//! talks to a server.

use chrono::{DateTime, Utc};
use std::fmt;
use watch_sync_models::{MediaRef, Precision, Ticks};

/// Which side of a pair an action applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Source,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationAction {
    None,
    MarkWatched(Side),
    /// Write `offset` (canonical) to `side`.
    SyncProgress { side: Side, offset: Ticks },
    /// Neither side can be trusted; logged and counted, never applied.
    Unresolved,
}

impl ReconciliationAction {
    pub fn is_mutation(&self) -> bool {
        matches!(self, ReconciliationAction::MarkWatched(_) | ReconciliationAction::SyncProgress { .. })
    }
}

impl fmt::Display for ReconciliationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationAction::None => write!(f, "none"),
            ReconciliationAction::MarkWatched(side) => write!(f, "mark watched on {:?}", side),
            ReconciliationAction::SyncProgress { side, offset } => {
                write!(f, "set progress {} on {:?}", offset, side)
            }
            ReconciliationAction::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// Watch state of one side, normalized to canonical units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub played: bool,
    pub offset: Option<Ticks>,
    pub last_played_at: Option<DateTime<Utc>>,
    pub last_playing_at: Option<DateTime<Utc>>,
}

impl PlaybackState {
    fn offset_or_zero(&self) -> Ticks {
        self.offset.unwrap_or(Ticks::ZERO)
    }

    fn has_offset(&self) -> bool {
        !self.offset_or_zero().is_zero()
    }

    fn in_progress(&self) -> bool {
        self.has_offset() || self.last_playing_at.is_some()
    }
}

impl From<&MediaRef> for PlaybackState {
    fn from(item: &MediaRef) -> Self {
        Self {
            played: item.played,
            offset: item.offset(),
            last_played_at: item.last_played_at,
            last_playing_at: item.last_playing_at,
        }
    }
}

/// Decide what, if anything, to write so both sides agree.
///
/// Rows are tried in order; the first that applies wins.
pub fn decide(source: &PlaybackState, target: &PlaybackState, precision: Precision) -> ReconciliationAction {
    // Untouched source: adopt whatever the target knows.
    if !source.played && !source.in_progress() {
        if target.has_offset() {
            return ReconciliationAction::SyncProgress {
                side: Side::Source,
                offset: target.offset_or_zero(),
            };
        }
        if target.played {
            return ReconciliationAction::MarkWatched(Side::Source);
        }
        return ReconciliationAction::None;
    }

    if source.played && target.played {
        return ReconciliationAction::None;
    }

    if source.played {
        return ReconciliationAction::MarkWatched(Side::Target);
    }

    if source.has_offset() || target.has_offset() {
        let s = source.offset_or_zero();
        let t = target.offset_or_zero();
        return match s.truncate(precision).cmp(&t.truncate(precision)) {
            std::cmp::Ordering::Greater => ReconciliationAction::SyncProgress {
                side: Side::Target,
                offset: s,
            },
            std::cmp::Ordering::Less => ReconciliationAction::SyncProgress {
                side: Side::Source,
                offset: t,
            },
            std::cmp::Ordering::Equal => ReconciliationAction::None,
        };
    }

    if target.played {
        return ReconciliationAction::MarkWatched(Side::Source);
    }

    ReconciliationAction::Unresolved
}
