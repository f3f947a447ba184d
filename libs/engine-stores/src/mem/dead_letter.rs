use async_trait::async_trait;
use dashmap::DashMap;
use engine_errors::EngineError;

use crate::model::Request;
use crate::traits::DeadLetterStore;

/// In-memory dead-letter store. A real adapter would append to a
/// durable table; writes here are still best-effort from the
/// dispatcher's point of view — a failure here never blocks the
/// terminal status update.
pub struct InMemoryDeadLetterStore {
    entries: DashMap<String, Vec<Request>>,
}

impl InMemoryDeadLetterStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn for_request(&self, id: &str) -> Vec<Request> {
        self.entries.get(id).map(|e| e.clone()).unwrap_or_default()
    }
}

impl Default for InMemoryDeadLetterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn append(&self, request: Request) -> Result<(), EngineError> {
        self.entries.entry(request.id.clone()).or_default().push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::model::RequestStatus;
    use serde_json::json;

    #[tokio::test]
    async fn appended_requests_are_retained_for_replay() {
        let store = InMemoryDeadLetterStore::new();
        let now = Utc::now();
        store
            .append(Request {
                id: "r1".to_owned(),
                account_id: "a1".to_owned(),
                data_source_id: "s1".to_owned(),
                payload: json!({}),
                status: RequestStatus::Failed,
                attempts: 5,
                result: None,
                error: Some("AttemptsExhausted".to_owned()),
                retry_after: now,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        assert_eq!(store.for_request("r1").len(), 1);
    }
}
