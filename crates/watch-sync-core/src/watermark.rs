use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use watch_sync_models::MediaRef;

/// One of the two servers of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Peer {
    A,
    B,
}

impl Peer {
    pub fn other(self) -> Peer {
        match self {
            Peer::A => Peer::B,
            Peer::B => Peer::A,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::A => write!(f, "a"),
            Peer::B => write!(f, "b"),
        }
    }
}

/// Which feed an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    /// Play history; entries are fully watched.
    Played,
    /// Continue watching; entries carry a resume offset.
    Playing,
}

impl Channel {
    /// The timestamp of `item` that this channel orders by.
    pub fn timestamp(self, item: &MediaRef) -> Option<DateTime<Utc>> {
        match self {
            Channel::Played => item.last_played_at,
            Channel::Playing => item.last_playing_at,
        }
    }
}

/// Newest activity already handled, per server and channel.
///
/// Every update goes through [`HighWaterMark::advance`] or
/// [`HighWaterMark::merge`], both of which only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighWaterMark {
    a_played: DateTime<Utc>,
    a_playing: DateTime<Utc>,
    b_played: DateTime<Utc>,
    b_playing: DateTime<Utc>,
}

impl HighWaterMark {
    /// All four marks set to the same instant.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            a_played: instant,
            a_playing: instant,
            b_played: instant,
            b_playing: instant,
        }
    }

    /// Seed from the newest entry of each feed, or `now` for an empty feed.
    pub fn seed(
        a_history: &[MediaRef],
        a_playing: &[MediaRef],
        b_history: &[MediaRef],
        b_playing: &[MediaRef],
        now: DateTime<Utc>,
    ) -> Self {
        let newest = |entries: &[MediaRef], channel: Channel| {
            entries
                .first()
                .and_then(|item| channel.timestamp(item))
                .unwrap_or(now)
        };
        Self {
            a_played: newest(a_history, Channel::Played),
            a_playing: newest(a_playing, Channel::Playing),
            b_played: newest(b_history, Channel::Played),
            b_playing: newest(b_playing, Channel::Playing),
        }
    }

    pub fn get(&self, peer: Peer, channel: Channel) -> DateTime<Utc> {
        match (peer, channel) {
            (Peer::A, Channel::Played) => self.a_played,
            (Peer::A, Channel::Playing) => self.a_playing,
            (Peer::B, Channel::Played) => self.b_played,
            (Peer::B, Channel::Playing) => self.b_playing,
        }
    }

    fn slot(&mut self, peer: Peer, channel: Channel) -> &mut DateTime<Utc> {
        match (peer, channel) {
            (Peer::A, Channel::Played) => &mut self.a_played,
            (Peer::A, Channel::Playing) => &mut self.a_playing,
            (Peer::B, Channel::Played) => &mut self.b_played,
            (Peer::B, Channel::Playing) => &mut self.b_playing,
        }
    }

    /// Move one mark forward to `at`; older values are ignored.
    pub fn advance(&mut self, peer: Peer, channel: Channel, at: DateTime<Utc>) -> bool {
        let slot = self.slot(peer, channel);
        if at > *slot {
            *slot = at;
            true
        } else {
            false
        }
    }

    /// Take the later value of each mark.
    pub fn merge(&mut self, other: &HighWaterMark) {
        for peer in [Peer::A, Peer::B] {
            for channel in [Channel::Played, Channel::Playing] {
                self.advance(peer, channel, other.get(peer, channel));
            }
        }
    }
}
