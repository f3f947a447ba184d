//! REST handlers mounted by [`crate::module::EventBusModule`]. Not
//! account-scoped (the bus is a shared cross-module fabric, not a
//! per-tenant resource); every authenticated caller may publish to and
//! pull from any topic. Same closure-over-`Arc<EventBusService>` shape
//! as the other modules' routes.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Router, http::StatusCode};
use engine_errors::EngineError;
use engine_http::auth::AuthContext;

use crate::domain::EventBusService;
use crate::dto::{EventRecordResponse, NextQuery, NextResponse, PublishRequest, SubscribeResponse};

const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(20);
const MAX_MAX_WAIT: Duration = Duration::from_secs(30);

pub fn mount(router: Router, svc: Arc<EventBusService>) -> Router {
    let s = svc;
    router
        .route(
            "/events/{topic}/publish",
            post({
                let svc = Arc::clone(&s);
                move |auth, path, body| publish(svc.clone(), auth, path, body)
            }),
        )
        .route(
            "/events/{topic}/subscribe",
            post({
                let svc = Arc::clone(&s);
                move |auth, path| subscribe(svc.clone(), auth, path)
            }),
        )
        .route(
            "/events/{topic}/next",
            get({
                let svc = Arc::clone(&s);
                move |auth, path, query| next(svc.clone(), auth, path, query)
            }),
        )
}

async fn publish(
    svc: Arc<EventBusService>,
    _auth: AuthContext,
    Path(topic): Path<String>,
    Json(req): Json<PublishRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let record = svc.publish(&topic, req.payload).await?;
    Ok((StatusCode::CREATED, Json(EventRecordResponse::from(record))))
}

async fn subscribe(
    svc: Arc<EventBusService>,
    _auth: AuthContext,
    Path(topic): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let cursor_id = svc.subscribe(&topic);
    Ok((StatusCode::CREATED, Json(SubscribeResponse { cursor_id })))
}

async fn next(
    svc: Arc<EventBusService>,
    _auth: AuthContext,
    Path(_topic): Path<String>,
    Query(query): Query<NextQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let max_wait = query
        .max_wait_ms
        .map_or(DEFAULT_MAX_WAIT, |ms| Duration::from_millis(ms).min(MAX_MAX_WAIT));
    let page = svc.next(&query.cursor_id, max_wait).await?;
    Ok(Json(NextResponse {
        events: page.events.into_iter().map(EventRecordResponse::from).collect(),
        expired: page.expired,
    }))
}
