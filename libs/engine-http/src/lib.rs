//! Unified HTTP surface (C7, §4.6): authentication, tenant scoping,
//! the status endpoint, and the ambient middleware stack (structured
//! request logging, rate limiting).

pub mod auth;
pub mod rate_limit;
pub mod status;
pub mod tenant;

use std::sync::Arc;
use std::time::Duration;

use axum::Extension;
use axum::Router;
use axum::routing::get;
use engine_kit::{Engine, EngineConfig};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use rate_limit::RateLimiterLayer;
use status::Uptime;

/// Compose the status route and the ambient middleware stack (auth
/// context extensions, trace, rate limit, CORS, request timeout, panic
/// catch) around whatever routes the modules registered via
/// `RestApiCapability`. Every module router stays state-free
/// (`Router<()>`); the engine-wide handles below are threaded through
/// request extensions instead, so modules never need to share one
/// monolithic `AppState` type.
#[must_use]
pub fn wrap_router(
    module_routes: Router,
    config: Arc<EngineConfig>,
    engine: Arc<Engine>,
    uptime: Uptime,
    rate_limiter: RateLimiterLayer,
) -> Router {
    module_routes
        .route("/system/status", get(status::get_status))
        .layer(axum::middleware::from_fn(rate_limit::rate_limit_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CatchPanicLayer::new())
        .layer(Extension(rate_limiter))
        .layer(Extension(uptime))
        .layer(Extension(engine))
        .layer(Extension(config))
}
