//! REST wire shapes for the event bus module (§6 HTTP surface: "long-poll
//! clients observe").

use chrono::{DateTime, Utc};
use engine_stores::model::EventRecord;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishRequest {
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventRecordResponse {
    pub topic: String,
    pub cursor: u64,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl From<EventRecord> for EventRecordResponse {
    fn from(e: EventRecord) -> Self {
        Self {
            topic: e.topic,
            cursor: e.cursor,
            payload: e.payload,
            recorded_at: e.recorded_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscribeResponse {
    pub cursor_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NextQuery {
    pub cursor_id: String,
    pub max_wait_ms: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NextResponse {
    pub events: Vec<EventRecordResponse>,
    pub expired: bool,
}
