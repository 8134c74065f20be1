//! In-process WebSocket fan-out buffer (spec.md §4.7, SPEC_FULL.md §4.7):
//! every committed `event_outbox` row is also pushed onto a small bounded
//! per-account ring so `ws_tail_id`/`ws_pull_events` long-polls don't have
//! to hit Postgres on every call. The outbox row is the durable source of
//! truth; this ring is a cache a restart is allowed to empty.

use std::collections::VecDeque;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use oms_domain::{AccountId, EventId};

/// One buffered event, shaped for direct `ws_pull_events` serialization
/// (spec.md §4.7, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingEvent {
    pub id: EventId,
    pub namespace: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Per-account bounded `VecDeque`, capped at `capacity` (default 5000,
/// `dispatcher.event_ring_capacity` — spec.md §4.7 "a bounded in-memory
/// ring per account"). Oldest entries are dropped first once full, the way
/// a long-poll subscriber that falls behind is expected to re-sync from
/// `event_outbox` directly rather than this cache.
pub struct EventRing {
    buffers: DashMap<AccountId, VecDeque<RingEvent>>,
    capacity: usize,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: DashMap::new(),
            capacity,
        }
    }

    /// Appends one event, evicting the oldest entry if the ring is full.
    pub fn push(&self, account_id: AccountId, event: RingEvent) {
        let mut buffer = self.buffers.entry(account_id).or_default();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event);
    }

    /// `ws_tail_id`: the highest buffered event id for an account, or
    /// `None` if nothing has been buffered yet (spec.md §4.7, §6
    /// `ws_tail_id`).
    pub fn tail_id(&self, account_id: AccountId) -> Option<EventId> {
        self.buffers.get(&account_id).and_then(|buffer| buffer.back().map(|event| event.id))
    }

    /// `ws_pull_events`: every buffered event with `id > after_id`, oldest
    /// first (spec.md §4.7, §6 `ws_pull_events`). Returns an empty vec — not
    /// an error — when `after_id` has already scrolled out of the ring;
    /// callers relying on gap-free delivery must fall back to
    /// `event_outbox` directly.
    pub fn pull_after(&self, account_id: AccountId, after_id: EventId) -> Vec<RingEvent> {
        self.buffers
            .get(&account_id)
            .map(|buffer| buffer.iter().filter(|event| event.id > after_id).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: i64) -> RingEvent {
        RingEvent {
            id: EventId::from(id),
            namespace: "position".to_owned(),
            event_type: "order_submitted".to_owned(),
            payload: serde_json::json!({}),
            created_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn pull_after_returns_only_newer_events() {
        let ring = EventRing::new(10);
        let account_id = AccountId::from(1);
        ring.push(account_id, event(1));
        ring.push(account_id, event(2));
        ring.push(account_id, event(3));
        let pulled = ring.pull_after(account_id, EventId::from(1));
        assert_eq!(pulled.len(), 2);
        assert_eq!(pulled[0].id, EventId::from(2));
    }

    #[test]
    fn tail_id_tracks_most_recent_push() {
        let ring = EventRing::new(10);
        let account_id = AccountId::from(1);
        assert_eq!(ring.tail_id(account_id), None);
        ring.push(account_id, event(5));
        assert_eq!(ring.tail_id(account_id), Some(EventId::from(5)));
    }

    #[test]
    fn ring_evicts_oldest_entry_once_full() {
        let ring = EventRing::new(2);
        let account_id = AccountId::from(1);
        ring.push(account_id, event(1));
        ring.push(account_id, event(2));
        ring.push(account_id, event(3));
        let pulled = ring.pull_after(account_id, EventId::from(0));
        assert_eq!(pulled.len(), 2);
        assert_eq!(pulled[0].id, EventId::from(2));
    }

    #[test]
    fn separate_accounts_have_independent_buffers() {
        let ring = EventRing::new(10);
        ring.push(AccountId::from(1), event(1));
        assert!(ring.pull_after(AccountId::from(2), EventId::from(0)).is_empty());
    }
}
