use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use engine_errors::EngineError;
use parking_lot::Mutex;

use crate::model::EventRecord;
use crate::traits::EventStore;

/// Append-only per-topic log, read by cursor. This is the durable
/// replay path a bounded in-process fan-out (see the `eventbus` module)
/// falls back to once a subscriber's lag exceeds its ring buffer.
pub struct InMemoryEventStore {
    topics: DashMap<String, Mutex<Vec<EventRecord>>>,
}

impl InMemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, topic: &str, payload: serde_json::Value) -> Result<EventRecord, EngineError> {
        let log = self
            .topics
            .entry(topic.to_owned())
            .or_insert_with(|| Mutex::new(Vec::new()));
        let mut log = log.lock();
        let cursor = log.len() as u64;
        let record = EventRecord {
            topic: topic.to_owned(),
            cursor,
            payload,
            recorded_at: Utc::now(),
        };
        log.push(record.clone());
        Ok(record)
    }

    async fn read(&self, topic: &str, cursor: u64, max: usize) -> Result<Vec<EventRecord>, EngineError> {
        let Some(log) = self.topics.get(topic) else {
            return Ok(Vec::new());
        };
        let log = log.lock();
        Ok(log
            .iter()
            .filter(|e| e.cursor >= cursor)
            .take(max)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_assigns_increasing_cursor() {
        let store = InMemoryEventStore::new();
        let a = store.append("topic", json!({"n": 1})).await.unwrap();
        let b = store.append("topic", json!({"n": 2})).await.unwrap();
        assert_eq!(a.cursor, 0);
        assert_eq!(b.cursor, 1);
    }

    #[tokio::test]
    async fn read_from_cursor_is_fifo_and_bounded() {
        let store = InMemoryEventStore::new();
        for n in 0..5 {
            store.append("topic", json!({"n": n})).await.unwrap();
        }
        let page = store.read("topic", 2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].cursor, 2);
        assert_eq!(page[1].cursor, 3);
    }

    #[tokio::test]
    async fn read_unknown_topic_is_empty_not_error() {
        let store = InMemoryEventStore::new();
        let page = store.read("nope", 0, 10).await.unwrap();
        assert!(page.is_empty());
    }
}
