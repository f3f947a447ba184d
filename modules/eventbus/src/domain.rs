//! Event bus domain service (C6, §4.5): topic-keyed pull-based fan-out
//! with at-least-once delivery over the durable, cursor-addressed
//! [`EventStore`] append log. A per-topic [`tokio::sync::Notify`] gives
//! subscribers low-latency wakeup on publish instead of busy-polling the
//! store; the store itself remains the durable replay path a cursor
//! falls back to once its lag exceeds the bound (`engine-stores`'
//! `InMemoryEventStore` doc comment anticipates exactly this layering).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use engine_errors::EngineError;
use engine_stores::model::EventRecord;
use engine_stores::traits::EventStore;
use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

const READ_BATCH: usize = 256;

struct CursorState {
    topic: String,
    position: u64,
    expired: bool,
}

pub struct EventBusService {
    store: Arc<dyn EventStore>,
    lag_limit: u64,
    tips: DashMap<String, AtomicU64>,
    notifiers: DashMap<String, Arc<Notify>>,
    cursors: DashMap<String, Mutex<CursorState>>,
}

#[derive(Debug, Clone)]
pub struct NextPage {
    pub events: Vec<EventRecord>,
    pub expired: bool,
}

impl EventBusService {
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, lag_limit: usize) -> Self {
        Self {
            store,
            lag_limit: u64::try_from(lag_limit).unwrap_or(u64::MAX),
            tips: DashMap::new(),
            notifiers: DashMap::new(),
            cursors: DashMap::new(),
        }
    }

    fn notifier_for(&self, topic: &str) -> Arc<Notify> {
        Arc::clone(
            self.notifiers
                .entry(topic.to_owned())
                .or_insert_with(|| Arc::new(Notify::new()))
                .value(),
        )
    }

    /// Append `payload` to `topic` and wake any subscriber parked on it.
    ///
    /// # Errors
    /// Propagates the backing store's failure.
    pub async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<EventRecord, EngineError> {
        let record = self.store.append(topic, payload).await?;
        self.tips
            .entry(topic.to_owned())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_max(record.cursor + 1, Ordering::SeqCst);
        self.notifier_for(topic).notify_waiters();
        Ok(record)
    }

    /// Register a new pull subscription starting at the topic's current
    /// tip (only events published from this point on are delivered; a
    /// consumer that needs history reads the store directly via its own
    /// offset). Returns an opaque cursor id.
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> String {
        let position = self
            .tips
            .entry(topic.to_owned())
            .or_insert_with(|| AtomicU64::new(0))
            .load(Ordering::SeqCst);
        let id = Uuid::new_v4().to_string();
        self.cursors.insert(
            id.clone(),
            Mutex::new(CursorState {
                topic: topic.to_owned(),
                position,
                expired: false,
            }),
        );
        id
    }

    pub fn unsubscribe(&self, cursor_id: &str) {
        self.cursors.remove(cursor_id);
    }

    fn tip_of(&self, topic: &str) -> u64 {
        self.tips.get(topic).map_or(0, |t| t.load(Ordering::SeqCst))
    }

    /// Pull the next batch for `cursor_id`, waiting up to `max_wait` if
    /// nothing is ready yet. A cursor whose lag against the topic's tip
    /// exceeds the configured limit is marked `expired` and must be
    /// re-subscribed (§4.5: "bounded subscriber lag... forces
    /// re-subscribe").
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] for an unknown cursor id, or
    /// propagates the backing store's failure.
    pub async fn next(&self, cursor_id: &str, max_wait: Duration) -> Result<NextPage, EngineError> {
        let (topic, position, was_expired) = {
            let entry = self.cursors.get(cursor_id).ok_or(EngineError::NotFound)?;
            let guard = entry.lock();
            (guard.topic.clone(), guard.position, guard.expired)
        };
        if was_expired {
            return Ok(NextPage {
                events: Vec::new(),
                expired: true,
            });
        }

        if self.tip_of(&topic).saturating_sub(position) > self.lag_limit {
            self.expire(cursor_id);
            return Ok(NextPage {
                events: Vec::new(),
                expired: true,
            });
        }

        let mut events = self.store.read(&topic, position, READ_BATCH).await?;
        if events.is_empty() && max_wait > Duration::ZERO {
            let notify = self.notifier_for(&topic);
            let _ = tokio::time::timeout(max_wait, notify.notified()).await;
            events = self.store.read(&topic, position, READ_BATCH).await?;
        }

        if let Some(last) = events.last() {
            let next_position = last.cursor + 1;
            if let Some(entry) = self.cursors.get(cursor_id) {
                entry.lock().position = next_position;
            }
        }

        Ok(NextPage { events, expired: false })
    }

    fn expire(&self, cursor_id: &str) {
        if let Some(entry) = self.cursors.get(cursor_id) {
            entry.lock().expired = true;
        }
    }

    /// Proactively expire any cursor whose lag already exceeds the
    /// bound, so an abandoned subscriber is flagged without waiting for
    /// its next pull.
    pub fn sweep_expired(&self) {
        let stale: Vec<String> = self
            .cursors
            .iter()
            .filter_map(|entry| {
                let guard = entry.value().lock();
                let lagging = self.tip_of(&guard.topic).saturating_sub(guard.position) > self.lag_limit;
                (lagging && !guard.expired).then(|| entry.key().clone())
            })
            .collect();
        for id in stale {
            self.expire(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_stores::mem::InMemoryEventStore;
    use serde_json::json;

    fn service(lag_limit: usize) -> EventBusService {
        EventBusService::new(Arc::new(InMemoryEventStore::new()), lag_limit)
    }

    #[tokio::test]
    async fn subscribe_only_sees_events_published_after() {
        let bus = service(100);
        bus.publish("prices", json!({"n": 1})).await.unwrap();
        let cursor = bus.subscribe("prices");
        bus.publish("prices", json!({"n": 2})).await.unwrap();

        let page = bus.next(&cursor, Duration::ZERO).await.unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].payload, json!({"n": 2}));
        assert!(!page.expired);
    }

    #[tokio::test]
    async fn next_is_empty_without_waiting_when_nothing_due() {
        let bus = service(100);
        let cursor = bus.subscribe("prices");
        let page = bus.next(&cursor, Duration::ZERO).await.unwrap();
        assert!(page.events.is_empty());
        assert!(!page.expired);
    }

    #[tokio::test]
    async fn lag_beyond_limit_expires_cursor() {
        let bus = service(2);
        let cursor = bus.subscribe("prices");
        for n in 0..5 {
            bus.publish("prices", json!({"n": n})).await.unwrap();
        }
        let page = bus.next(&cursor, Duration::ZERO).await.unwrap();
        assert!(page.expired);
        assert!(page.events.is_empty());
    }

    #[tokio::test]
    async fn unknown_cursor_is_not_found() {
        let bus = service(100);
        let err = bus.next("nope", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound));
    }

    #[tokio::test]
    async fn sweep_expires_lagging_cursors_without_a_pull() {
        let bus = service(1);
        let cursor = bus.subscribe("prices");
        for n in 0..5 {
            bus.publish("prices", json!({"n": n})).await.unwrap();
        }
        bus.sweep_expired();
        let page = bus.next(&cursor, Duration::ZERO).await.unwrap();
        assert!(page.expired);
    }
}
