//! REST wire shapes for the oracle module (§6 HTTP surface).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use engine_stores::model::{AggregationKind, DataSource, Request, RequestStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDataSourceRequest {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body_template: Option<serde_json::Value>,
    #[serde(default)]
    pub aggregation: Option<AggregationKind>,
    #[serde(default)]
    pub alternate_source_ids: Vec<String>,
}

fn default_method() -> String {
    "GET".to_owned()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DataSourceResponse {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub aggregation: Option<AggregationKind>,
    pub alternate_source_ids: Vec<String>,
}

impl From<DataSource> for DataSourceResponse {
    fn from(s: DataSource) -> Self {
        Self {
            id: s.id,
            name: s.name,
            url: s.url,
            method: s.method,
            headers: s.headers,
            aggregation: s.aggregation,
            alternate_source_ids: s.alternate_source_ids,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRequestRequest {
    pub data_source_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestResponse {
    pub id: String,
    pub account_id: String,
    pub data_source_id: String,
    pub status: RequestStatus,
    pub attempts: u32,
    pub result: Option<String>,
    pub error: Option<String>,
    pub retry_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Request> for RequestResponse {
    fn from(r: Request) -> Self {
        Self {
            id: r.id,
            account_id: r.account_id,
            data_source_id: r.data_source_id,
            status: r.status,
            attempts: r.attempts,
            result: r.result,
            error: r.error,
            retry_after: r.retry_after,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
}

/// Operator override (§6: "PATCH .../requests/{id} — operator override:
/// running/failed/retry"), admin-only.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum OverrideRequestRequest {
    Running,
    Failed { error: String },
    Retry { retry_after_secs: Option<i64> },
}
