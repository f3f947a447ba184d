//! REST handlers mounted by [`crate::module::OracleModule`] (§6 HTTP
//! surface table). Same state-free closure-over-`Arc<OracleService>`
//! shape as `modules/accounts::routes`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Router, http::StatusCode};
use engine_errors::EngineError;
use engine_http::auth::AuthContext;

use crate::domain::OracleService;
use crate::dto::{
    CreateDataSourceRequest, CreateRequestRequest, DataSourceResponse, ListRequestsQuery, OverrideRequestRequest,
    RequestResponse,
};

pub fn mount(router: Router, svc: Arc<OracleService>) -> Router {
    let s = svc;
    router
        .route(
            "/accounts/{id}/oracle/sources",
            post({
                let svc = Arc::clone(&s);
                move |auth, path, body| create_source(svc.clone(), auth, path, body)
            })
            .get({
                let svc = Arc::clone(&s);
                move |auth, path| list_sources(svc.clone(), auth, path)
            }),
        )
        .route(
            "/accounts/{id}/oracle/requests",
            post({
                let svc = Arc::clone(&s);
                move |auth, path, body| create_request(svc.clone(), auth, path, body)
            })
            .get({
                let svc = Arc::clone(&s);
                move |auth, path, query| list_requests(svc.clone(), auth, path, query)
            }),
        )
        .route(
            "/accounts/{id}/oracle/requests/{request_id}",
            patch({
                let svc = Arc::clone(&s);
                move |auth, path, body| override_request(svc.clone(), auth, path, body)
            }),
        )
}

fn require_tenant(auth: &AuthContext) -> Result<&str, EngineError> {
    auth.tenant_id.as_deref().ok_or(EngineError::Unauthorized)
}

fn require_admin(auth: &AuthContext) -> Result<(), EngineError> {
    if auth.is_admin {
        Ok(())
    } else {
        Err(EngineError::PermissionDenied)
    }
}

async fn create_source(
    svc: Arc<OracleService>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<CreateDataSourceRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let source = svc.create_source(tenant_id, &id, req).await?;
    Ok((StatusCode::CREATED, Json(DataSourceResponse::from(source))))
}

async fn list_sources(
    svc: Arc<OracleService>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let sources = svc.list_sources(tenant_id, &id).await?;
    Ok(Json(
        sources.into_iter().map(DataSourceResponse::from).collect::<Vec<_>>(),
    ))
}

async fn create_request(
    svc: Arc<OracleService>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<CreateRequestRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let request = svc.create_request(tenant_id, &id, req).await?;
    Ok((StatusCode::CREATED, Json(RequestResponse::from(request))))
}

async fn list_requests(
    svc: Arc<OracleService>,
    auth: AuthContext,
    Path(id): Path<String>,
    Query(query): Query<ListRequestsQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let requests = svc.list_requests(tenant_id, &id, query.status).await?;
    Ok(Json(
        requests.into_iter().map(RequestResponse::from).collect::<Vec<_>>(),
    ))
}

async fn override_request(
    svc: Arc<OracleService>,
    auth: AuthContext,
    Path((id, request_id)): Path<(String, String)>,
    Json(req): Json<OverrideRequestRequest>,
) -> Result<impl IntoResponse, EngineError> {
    require_admin(&auth)?;
    let tenant_id = require_tenant(&auth)?;
    let request = svc.override_request(tenant_id, &id, &request_id, req).await?;
    Ok(Json(RequestResponse::from(request)))
}
