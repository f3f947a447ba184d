//! Persisted entity shapes shared by every store trait.
//!
//! These are plain data structs; the stores own persistence, the core
//! owns only the in-memory registry and dispatcher state built on top
//! of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub owner: String,
    pub tenant_id: String,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    pub account_id: String,
    pub name: String,
    pub ciphertext: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretPolicy {
    pub account_id: String,
    pub secret_name: String,
    pub allowed_service_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBinding {
    pub id: String,
    pub account_id: String,
    pub address: String,
    pub label: String,
    pub verified: bool,
    pub is_primary: bool,
    pub verification_signature: Option<String>,
    pub pending_nonce: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasBankAccount {
    pub id: String,
    pub account_id: String,
    pub balance: i64,
    pub reserved: i64,
    pub updated_at: DateTime<Utc>,
}

impl GasBankAccount {
    #[must_use]
    pub fn available(&self) -> i64 {
        self.balance - self.reserved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationOutcome {
    Consume,
    Release,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub account_id: String,
    pub amount: i64,
    pub settled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub account_id: String,
    pub data_source_id: String,
    pub payload: serde_json::Value,
    pub status: RequestStatus,
    pub attempts: u32,
    pub result: Option<String>,
    pub error: Option<String>,
    pub retry_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Median,
    Mean,
    Min,
    Max,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body_template: Option<serde_json::Value>,
    pub aggregation: Option<AggregationKind>,
    pub alternate_source_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub topic: String,
    pub cursor: u64,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}
