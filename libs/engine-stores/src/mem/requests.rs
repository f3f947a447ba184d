use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use engine_errors::EngineError;

use crate::model::{Request, RequestStatus};
use crate::traits::{RequestFilter, RequestStore, TransitionFields};

/// In-memory request store. `atomic_transition` relies on `DashMap`'s
/// per-shard write lock held across the read-check-write sequence,
/// giving the same linearizability a `SELECT ... FOR UPDATE` transition
/// would in a real store.
pub struct InMemoryRequestStore {
    requests: DashMap<String, Request>,
}

impl InMemoryRequestStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
        }
    }
}

impl Default for InMemoryRequestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn create(&self, request: Request) -> Result<Request, EngineError> {
        if self.requests.contains_key(&request.id) {
            return Err(EngineError::Conflict(format!(
                "request '{}' already exists",
                request.id
            )));
        }
        self.requests.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    async fn get(&self, id: &str) -> Result<Request, EngineError> {
        self.requests.get(id).map(|r| r.clone()).ok_or(EngineError::NotFound)
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, EngineError> {
        Ok(self
            .requests
            .iter()
            .filter(|e| {
                filter
                    .account_id
                    .as_deref()
                    .is_none_or(|a| e.account_id == a)
                    && filter.status.is_none_or(|s| e.status == s)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn list_due(&self, now: DateTime<Utc>, batch_size: usize) -> Result<Vec<Request>, EngineError> {
        let mut due: Vec<Request> = self
            .requests
            .iter()
            .filter(|e| e.status == RequestStatus::Pending && e.retry_after <= now)
            .map(|e| e.value().clone())
            .collect();
        due.sort_by_key(|r| r.created_at);
        due.truncate(batch_size);
        Ok(due)
    }

    async fn list_stalled(&self, older_than: DateTime<Utc>) -> Result<Vec<Request>, EngineError> {
        Ok(self
            .requests
            .iter()
            .filter(|e| e.status == RequestStatus::Running && e.updated_at < older_than)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn atomic_transition(
        &self,
        id: &str,
        from_status: RequestStatus,
        to_status: RequestStatus,
        fields: TransitionFields,
    ) -> Result<Request, EngineError> {
        let mut entry = self.requests.get_mut(id).ok_or(EngineError::NotFound)?;
        if entry.status != from_status {
            return Err(EngineError::Conflict(format!(
                "request '{id}' is '{:?}', expected '{:?}'",
                entry.status, from_status
            )));
        }
        entry.status = to_status;
        if let Some(attempts) = fields.attempts {
            entry.attempts = attempts;
        }
        if let Some(result) = fields.result {
            entry.result = Some(result);
            entry.error = None;
        }
        if let Some(error) = fields.error {
            entry.error = Some(error);
            entry.result = None;
        }
        if let Some(retry_after) = fields.retry_after {
            entry.retry_after = retry_after;
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}
