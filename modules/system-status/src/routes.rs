//! Supplementary topology routes beyond the baseline `GET /system/status`
//! `engine-http` already mounts (§4.1: `InstalledPackages`,
//! `ModulesAPISummary`). Pulls `Arc<Engine>` straight from request
//! extensions, the same way `engine_http::status::get_status` does,
//! since the engine does not exist yet when this module's own
//! descriptor is assembled (`ModuleCtx` carries only per-module state).

use std::sync::Arc;

use axum::Json;
use axum::extract::Extension;
use axum::routing::get;
use axum::Router;
use engine_errors::EngineError;
use engine_http::auth::AuthContext;
use engine_kit::{CapabilitySummaryEntry, Engine, InstalledPackage};

pub fn mount(router: Router) -> Router {
    router
        .route("/system/packages", get(list_packages))
        .route("/system/capabilities", get(list_capabilities))
}

/// # Errors
/// Returns [`EngineError::Unauthorized`] if the [`AuthContext`] extractor
/// rejects the request.
async fn list_packages(
    _auth: AuthContext,
    Extension(engine): Extension<Arc<Engine>>,
) -> Result<Json<Vec<InstalledPackage>>, EngineError> {
    Ok(Json(engine.installed_packages()))
}

/// # Errors
/// Returns [`EngineError::Unauthorized`] if the [`AuthContext`] extractor
/// rejects the request.
async fn list_capabilities(
    _auth: AuthContext,
    Extension(engine): Extension<Arc<Engine>>,
) -> Result<Json<Vec<CapabilitySummaryEntry>>, EngineError> {
    Ok(Json(engine.modules_api_summary()))
}
