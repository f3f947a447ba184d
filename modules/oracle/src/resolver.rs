//! The pluggable resolver contract (C5, §4.4). The dispatcher never
//! peers inside a resolver's outcome beyond this enum — "polymorphic
//! resolver handling via interface satisfaction" (spec.md §9 Design
//! Notes) becomes a capability trait instead.

use std::time::Duration;

use async_trait::async_trait;
use engine_stores::model::DataSource;
use serde_json::Value;

/// What a single resolver attempt decided.
pub enum ResolveOutcome {
    /// Terminal success; `result` is the canonical string payload.
    Success { result: String },
    /// Terminal failure; `error` is user-visible.
    Failure { error: String },
    /// Non-terminal; `after` is a minimum delay before the next attempt
    /// (the dispatcher may extend it, never shorten it).
    Retry { after: Duration },
    /// Unexpected error; the dispatcher treats this as retryable with
    /// its own exponential backoff.
    Error(anyhow::Error),
}

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, account_id: &str, source: &DataSource, payload: &Value) -> ResolveOutcome;
}
