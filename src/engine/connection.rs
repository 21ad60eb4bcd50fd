//! Connection state machine and the offline queue it owns.
//!
//! ```text
//!            lose (any state)
//!   ┌──────────────────────────────┐
//!   ▼                              │
//! Offline ──restore, queue>0──► Syncing ──ok──► Synced ──settle──► Online
//!   │  ▲                           │
//!   │  └─────────failed────────────┘
//!   └──restore, queue=0──► Connected ──settle──► Online
//! ```
//!
//! While offline every completion intent is routed to the queue.

use crate::checks::{QueueEntry, Timestamp};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Connectivity as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Online,
    Offline,
    Syncing,
    Connected,
    Synced,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Connected => "connected",
            Self::Synced => "synced",
        };
        f.write_str(label)
    }
}

/// A state change, reported so callers can log or publish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Connection state plus the queue of completions recorded while offline.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    entered_at: Timestamp,
    settle: Duration,
    queue: VecDeque<QueueEntry>,
}

impl ConnectionMachine {
    /// Start online with an empty queue.
    pub fn new(settle: Duration, now: Timestamp) -> Self {
        Self {
            state: ConnectionState::Online,
            entered_at: now,
            settle,
            queue: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_offline(&self) -> bool {
        self.state == ConnectionState::Offline
    }

    /// Queued entries, oldest first.
    pub fn queue(&self) -> impl Iterator<Item = &QueueEntry> {
        self.queue.iter()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Connectivity lost, or manual offline override. Allowed from any state.
    pub fn go_offline(&mut self, now: Timestamp) -> Option<Transition> {
        self.move_to(ConnectionState::Offline, now)
    }

    /// Connectivity restored. Only meaningful while offline.
    ///
    /// Moves to `syncing` when work is queued, otherwise to `connected`.
    pub fn begin_restore(&mut self, now: Timestamp) -> Option<Transition> {
        if !self.is_offline() {
            return None;
        }
        let next = if self.queue.is_empty() {
            ConnectionState::Connected
        } else {
            ConnectionState::Syncing
        };
        self.move_to(next, now)
    }

    /// Close out a sync started by [`Self::begin_restore`].
    pub fn finish_sync(&mut self, succeeded: bool, now: Timestamp) -> Option<Transition> {
        if self.state != ConnectionState::Syncing {
            return None;
        }
        let next = if succeeded {
            ConnectionState::Synced
        } else {
            ConnectionState::Offline
        };
        self.move_to(next, now)
    }

    /// When `connected` / `synced` will settle back to `online`.
    pub fn settle_deadline(&self) -> Option<Timestamp> {
        match self.state {
            ConnectionState::Connected | ConnectionState::Synced => {
                Some(self.entered_at + self.settle)
            }
            _ => None,
        }
    }

    /// Apply the settle delay.
    pub fn advance(&mut self, now: Timestamp) -> Option<Transition> {
        match self.settle_deadline() {
            Some(deadline) if now >= deadline => self.move_to(ConnectionState::Online, now),
            _ => None,
        }
    }

    pub(crate) fn enqueue(&mut self, entry: QueueEntry) {
        self.queue.push_back(entry);
    }

    pub(crate) fn drain_queue(&mut self) -> Vec<QueueEntry> {
        self.queue.drain(..).collect()
    }

    pub(crate) fn clear_queue(&mut self) {
        self.queue.clear();
    }

    fn move_to(&mut self, to: ConnectionState, now: Timestamp) -> Option<Transition> {
        if self.state == to {
            return None;
        }
        let from = self.state;
        self.state = to;
        self.entered_at = now;
        Some(Transition { from, to })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::checks::CompletionPayload;
    use chrono::{TimeZone, Utc};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 14, 22, 0, 0).unwrap()
    }

    fn machine() -> ConnectionMachine {
        ConnectionMachine::new(Duration::seconds(2), t0())
    }

    fn entry(id: &str) -> QueueEntry {
        QueueEntry {
            check_id: id.into(),
            payload: CompletionPayload {
                statuses: Vec::new(),
                notes: None,
                completion_time: t0(),
            },
            queued_at: t0(),
        }
    }

    #[test]
    fn starts_online() {
        let m = machine();
        assert_eq!(m.state(), ConnectionState::Online);
        assert!(!m.is_offline());
        assert_eq!(m.queued_len(), 0);
    }

    #[test]
    fn offline_is_reachable_from_every_state() {
        let mut m = machine();
        m.go_offline(t0());
        m.begin_restore(t0());
        assert_eq!(m.state(), ConnectionState::Connected);
        let t = m.go_offline(t0()).unwrap();
        assert_eq!(t.from, ConnectionState::Connected);
        assert!(m.go_offline(t0()).is_none());
    }

    #[test]
    fn restore_with_empty_queue_connects_then_settles() {
        let mut m = machine();
        m.go_offline(t0());
        let t = m.begin_restore(t0()).unwrap();
        assert_eq!(t.to, ConnectionState::Connected);
        assert!(m.advance(t0() + Duration::milliseconds(1999)).is_none());
        let t = m.advance(t0() + Duration::seconds(2)).unwrap();
        assert_eq!(t.to, ConnectionState::Online);
    }

    #[test]
    fn restore_with_queue_syncs() {
        let mut m = machine();
        m.go_offline(t0());
        m.enqueue(entry("C1-g0"));
        assert_eq!(m.begin_restore(t0()).unwrap().to, ConnectionState::Syncing);
        assert!(m.advance(t0() + Duration::minutes(5)).is_none());
        assert_eq!(
            m.finish_sync(true, t0()).unwrap().to,
            ConnectionState::Synced
        );
        assert_eq!(
            m.settle_deadline(),
            Some(t0() + Duration::seconds(2))
        );
    }

    #[test]
    fn failed_sync_returns_offline() {
        let mut m = machine();
        m.go_offline(t0());
        m.enqueue(entry("C1-g0"));
        m.begin_restore(t0());
        assert_eq!(
            m.finish_sync(false, t0()).unwrap().to,
            ConnectionState::Offline
        );
        assert_eq!(m.queued_len(), 1);
    }

    #[test]
    fn restore_ignored_unless_offline() {
        let mut m = machine();
        assert!(m.begin_restore(t0()).is_none());
        assert!(m.finish_sync(true, t0()).is_none());
    }

    #[test]
    fn queue_is_fifo() {
        let mut m = machine();
        m.enqueue(entry("a"));
        m.enqueue(entry("b"));
        let ids: Vec<&str> = m.queue().map(|e| e.check_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let drained = m.drain_queue();
        assert_eq!(drained[0].check_id, "a");
        assert_eq!(m.queued_len(), 0);
    }
}
