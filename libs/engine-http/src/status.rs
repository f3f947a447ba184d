//! `GET /system/status` (§4.6): engine version, modules, capabilities
//! summary, uptime. Authenticated, never tenant-scoped.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::Extension;
use engine_errors::EngineError;
use engine_kit::{CapabilitySummaryEntry, Engine, ModuleHealth};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthContext;

#[derive(Clone)]
pub struct Uptime(Arc<Instant>);

impl Uptime {
    #[must_use]
    pub fn start_now() -> Self {
        Self(Arc::new(Instant::now()))
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> u64 {
        self.0.elapsed().as_secs()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemStatus {
    pub engine_version: &'static str,
    pub modules: Vec<ModuleHealth>,
    pub capabilities: Vec<CapabilitySummaryEntry>,
    pub uptime_secs: u64,
}

/// # Errors
/// Returns [`EngineError::Unauthorized`] if the [`AuthContext`]
/// extractor rejects the request; never fails otherwise.
pub async fn get_status(
    _auth: AuthContext,
    Extension(engine): Extension<Arc<Engine>>,
    Extension(uptime): Extension<Uptime>,
) -> Result<Json<SystemStatus>, EngineError> {
    Ok(Json(SystemStatus {
        engine_version: env!("CARGO_PKG_VERSION"),
        modules: engine.modules_health(),
        capabilities: engine.modules_api_summary(),
        uptime_secs: uptime.elapsed_secs(),
    }))
}
