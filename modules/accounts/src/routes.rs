//! REST handlers mounted by [`crate::module::AccountsModule`] (§6 HTTP
//! surface table). Every handler captures `Arc<AccountsService>` via
//! closure rather than axum `State`, so the router this module
//! contributes stays state-free and composes with every other module's
//! routes on one shared `Router<()>` (see `engine_http::wrap_router`).

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Router, http::StatusCode};
use engine_errors::EngineError;
use engine_http::auth::AuthContext;
use engine_http::tenant::require_tenant_match;
use engine_stores::model::ReservationOutcome;

use crate::domain::AccountsService;
use crate::dto::{
    AccountResponse, CreateAccountRequest, DepositRequest, GasBankResponse, IssueWalletNonceRequest,
    ReservationResponse, ReserveRequest, SecretMetadataResponse, SecretValueResponse, SetSecretPolicyRequest,
    UpsertSecretRequest, VerifyWalletRequest, WalletBindingResponse,
};

pub fn mount(router: Router, svc: Arc<AccountsService>) -> Router {
    let s = svc;
    router
        .route(
            "/accounts",
            post({
                let svc = Arc::clone(&s);
                move |auth, body| create_account(svc.clone(), auth, body)
            })
            .get({
                let svc = Arc::clone(&s);
                move |auth| list_accounts(svc.clone(), auth)
            }),
        )
        .route(
            "/accounts/{id}",
            get({
                let svc = Arc::clone(&s);
                move |auth, path| get_account(svc.clone(), auth, path)
            }),
        )
        .route(
            "/accounts/{id}/secrets",
            post({
                let svc = Arc::clone(&s);
                move |auth, path, body| upsert_secret(svc.clone(), auth, path, body)
            })
            .get({
                let svc = Arc::clone(&s);
                move |auth, path| list_secrets(svc.clone(), auth, path)
            }),
        )
        .route(
            "/accounts/{id}/secrets/{name}",
            get({
                let svc = Arc::clone(&s);
                move |auth, path| get_secret(svc.clone(), auth, path)
            })
            .delete({
                let svc = Arc::clone(&s);
                move |auth, path| delete_secret(svc.clone(), auth, path)
            }),
        )
        .route(
            "/accounts/{id}/secrets/{name}/policy",
            post({
                let svc = Arc::clone(&s);
                move |auth, path, body| set_secret_policy(svc.clone(), auth, path, body)
            }),
        )
        .route(
            "/accounts/{id}/wallets",
            post({
                let svc = Arc::clone(&s);
                move |auth, path, body| issue_wallet_nonce(svc.clone(), auth, path, body)
            })
            .get({
                let svc = Arc::clone(&s);
                move |auth, path| list_wallets(svc.clone(), auth, path)
            }),
        )
        .route(
            "/accounts/{id}/wallets/{wallet_id}/verify",
            post({
                let svc = Arc::clone(&s);
                move |auth, path, body| verify_wallet(svc.clone(), auth, path, body)
            }),
        )
        .route(
            "/accounts/{id}/gasbank",
            get({
                let svc = Arc::clone(&s);
                move |auth, path| get_gasbank(svc.clone(), auth, path)
            }),
        )
        .route(
            "/accounts/{id}/gasbank/deposit",
            post({
                let svc = Arc::clone(&s);
                move |auth, path, body| deposit(svc.clone(), auth, path, body)
            }),
        )
        .route(
            "/accounts/{id}/gasbank/reserve",
            post({
                let svc = Arc::clone(&s);
                move |auth, path, body| reserve(svc.clone(), auth, path, body)
            }),
        )
        .route(
            "/accounts/{id}/gasbank/settle/{reservation_id}",
            post({
                let svc = Arc::clone(&s);
                move |auth, path| settle(svc.clone(), auth, path)
            }),
        )
}

fn require_tenant(auth: &AuthContext) -> Result<&str, EngineError> {
    auth.tenant_id.as_deref().ok_or(EngineError::Unauthorized)
}

async fn create_account(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Json(req): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let account = svc.create_account(&req.owner, tenant_id, req.metadata).await?;
    Ok((StatusCode::CREATED, Json(AccountResponse::from(account))))
}

async fn list_accounts(svc: Arc<AccountsService>, auth: AuthContext) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let accounts = svc.list_accounts(tenant_id).await?;
    Ok(Json(
        accounts.into_iter().map(AccountResponse::from).collect::<Vec<_>>(),
    ))
}

async fn get_account(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let account = svc.get_account(tenant_id, &id).await?;
    require_tenant_match(&auth, &account.tenant_id)?;
    Ok(Json(AccountResponse::from(account)))
}

async fn upsert_secret(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<UpsertSecretRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let record = svc.upsert_secret(tenant_id, &id, &req.name, &req.value).await?;
    Ok(Json(SecretMetadataResponse::from(record)))
}

async fn list_secrets(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let secrets = svc.list_secrets(tenant_id, &id).await?;
    Ok(Json(
        secrets.into_iter().map(SecretMetadataResponse::from).collect::<Vec<_>>(),
    ))
}

async fn get_secret(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path((id, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let value = svc.get_secret(tenant_id, &id, &name, &auth.subject).await?;
    Ok(Json(SecretValueResponse { name, value }))
}

async fn delete_secret(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path((id, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    svc.delete_secret(tenant_id, &id, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_secret_policy(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path((id, name)): Path<(String, String)>,
    Json(req): Json<SetSecretPolicyRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    svc.set_secret_policy(tenant_id, &id, &name, req.allowed_service_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn issue_wallet_nonce(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<IssueWalletNonceRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let binding = svc
        .issue_wallet_nonce(tenant_id, &id, &req.address, &req.label)
        .await?;
    Ok((StatusCode::CREATED, Json(WalletBindingResponse::from(binding))))
}

async fn list_wallets(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let bindings = svc.list_wallets(tenant_id, &id).await?;
    Ok(Json(
        bindings.into_iter().map(WalletBindingResponse::from).collect::<Vec<_>>(),
    ))
}

async fn verify_wallet(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path((id, wallet_id)): Path<(String, String)>,
    Json(req): Json<VerifyWalletRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let binding = svc.verify_wallet(tenant_id, &id, &wallet_id, req.signature).await?;
    Ok(Json(WalletBindingResponse::from(binding)))
}

async fn get_gasbank(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let account = svc.get_gasbank_account(tenant_id, &id).await?;
    Ok(Json(GasBankResponse::from(account)))
}

async fn deposit(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<DepositRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let account = svc.gasbank_deposit(tenant_id, &id, req.amount).await?;
    Ok(Json(GasBankResponse::from(account)))
}

async fn reserve(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<ReserveRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    let (account, reservation) = svc.gasbank_reserve(tenant_id, &id, req.amount).await?;
    Ok(Json(ReservationResponse::from((account, reservation))))
}

async fn settle(
    svc: Arc<AccountsService>,
    auth: AuthContext,
    Path((id, reservation_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, EngineError> {
    let tenant_id = require_tenant(&auth)?;
    svc.get_account(tenant_id, &id).await?;
    let account = svc
        .gasbank_settle(&reservation_id, ReservationOutcome::Consume)
        .await?;
    Ok(Json(GasBankResponse::from(account)))
}
