//! Narrow store interfaces the core depends on (§6 External interfaces).
//!
//! Each trait is intentionally small: CRUD plus the few domain
//! operations the core actually calls. Concrete adapters (Postgres,
//! etc.) are external collaborators; this crate ships only the
//! in-memory reference implementations under [`crate::mem`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_errors::EngineError;

use crate::model::{
    Account, DataSource, EventRecord, GasBankAccount, Request, RequestStatus, Reservation,
    ReservationOutcome, SecretPolicy, SecretRecord, WalletBinding,
};

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create(&self, account: Account) -> Result<Account, EngineError>;
    async fn get(&self, id: &str) -> Result<Account, EngineError>;
    async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Account>, EngineError>;
    /// Returns the existing account or creates one on first use.
    async fn ensure_account(&self, id: &str, tenant_id: &str) -> Result<Account, EngineError>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Upserts `(account_id, name)`. Returns the stored record with its
    /// new version (monotonically increasing, starting at 1).
    async fn upsert(
        &self,
        account_id: &str,
        name: &str,
        ciphertext: String,
    ) -> Result<SecretRecord, EngineError>;
    async fn get(&self, account_id: &str, name: &str) -> Result<SecretRecord, EngineError>;
    async fn delete(&self, account_id: &str, name: &str) -> Result<(), EngineError>;
    async fn list(&self, account_id: &str) -> Result<Vec<SecretRecord>, EngineError>;

    async fn set_policy(
        &self,
        account_id: &str,
        secret_name: &str,
        allowed_service_ids: Vec<String>,
    ) -> Result<SecretPolicy, EngineError>;
    async fn get_policy(
        &self,
        account_id: &str,
        secret_name: &str,
    ) -> Result<Option<SecretPolicy>, EngineError>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn create_binding(&self, binding: WalletBinding) -> Result<WalletBinding, EngineError>;
    async fn get_binding(&self, account_id: &str, id: &str) -> Result<WalletBinding, EngineError>;
    async fn list_bindings(&self, account_id: &str) -> Result<Vec<WalletBinding>, EngineError>;
    async fn mark_verified(
        &self,
        account_id: &str,
        id: &str,
        signature: String,
    ) -> Result<WalletBinding, EngineError>;
}

#[async_trait]
pub trait GasBankStore: Send + Sync {
    async fn get_account(&self, account_id: &str) -> Result<GasBankAccount, EngineError>;
    async fn deposit(&self, account_id: &str, amount: i64) -> Result<GasBankAccount, EngineError>;
    async fn reserve(
        &self,
        account_id: &str,
        amount: i64,
    ) -> Result<(GasBankAccount, Reservation), EngineError>;
    async fn settle(
        &self,
        reservation_id: &str,
        outcome: ReservationOutcome,
    ) -> Result<GasBankAccount, EngineError>;
    async fn list_deposits(&self, account_id: &str) -> Result<Vec<i64>, EngineError>;
    async fn list_transactions(&self, account_id: &str) -> Result<Vec<Reservation>, EngineError>;
    /// Orphaned reservations older than `older_than`, for the janitor sweep.
    async fn list_open_reservations(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, EngineError>;
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub account_id: Option<String>,
    pub status: Option<RequestStatus>,
}

/// Fields an atomic transition may update alongside the status change.
#[derive(Debug, Clone, Default)]
pub struct TransitionFields {
    pub result: Option<String>,
    pub error: Option<String>,
    pub retry_after: Option<DateTime<Utc>>,
    pub attempts: Option<u32>,
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn create(&self, request: Request) -> Result<Request, EngineError>;
    async fn get(&self, id: &str) -> Result<Request, EngineError>;
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, EngineError>;

    /// Requests in `pending` whose `retry_after <= now`, oldest-created
    /// first, bounded by `batch_size`. Used by the dispatcher's tick.
    async fn list_due(&self, now: DateTime<Utc>, batch_size: usize) -> Result<Vec<Request>, EngineError>;

    /// Requests stuck in `running` past `updated_at + attempt_timeout`,
    /// for the reclaim sweep.
    async fn list_stalled(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Request>, EngineError>;

    /// The hard contract: linearizable across dispatcher instances. Only
    /// the caller whose `from_status` still matches wins; all others see
    /// [`EngineError::Conflict`].
    async fn atomic_transition(
        &self,
        id: &str,
        from_status: RequestStatus,
        to_status: RequestStatus,
        fields: TransitionFields,
    ) -> Result<Request, EngineError>;
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn append(&self, request: Request) -> Result<(), EngineError>;
}

#[async_trait]
pub trait DataSourceStore: Send + Sync {
    async fn create(&self, source: DataSource) -> Result<DataSource, EngineError>;
    async fn get(&self, account_id: &str, id: &str) -> Result<DataSource, EngineError>;
    async fn list(&self, account_id: &str) -> Result<Vec<DataSource>, EngineError>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, topic: &str, payload: serde_json::Value) -> Result<EventRecord, EngineError>;
    async fn read(
        &self,
        topic: &str,
        cursor: u64,
        max: usize,
    ) -> Result<Vec<EventRecord>, EngineError>;
}
