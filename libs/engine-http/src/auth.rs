//! Authentication (§4.6): a configured bearer-token set, or a signed
//! JWT validated for issuer/audience/signature with `sub`/tenant/role
//! claim extraction.

use axum::extract::FromRequestParts;
use engine_errors::EngineError;
use engine_kit::EngineConfig;
use http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::Value;
use std::sync::Arc;

/// The authenticated identity for one request, carried through the
/// handler via extractor (§4.6: "the tenant id, once extracted, is
/// carried in the request context").
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: String,
    pub tenant_id: Option<String>,
    pub is_admin: bool,
}

impl AuthContext {
    #[must_use]
    pub fn bearer(token: &str) -> Self {
        Self {
            subject: format!("bearer:{token}"),
            tenant_id: None,
            is_admin: true,
        }
    }
}

/// Pulled from request extensions rather than axum `State` so that
/// every module's router stays state-free (`Router<()>`) — each module
/// owns its own service handles via closures, not a shared app state
/// struct. `engine_http::wrap_router` is what inserts the extension.
///
/// Bearer-token auth (and a role-admin JWT with no tenant claim) never
/// carries a tenant id on its own (§4.6: bearer tokens are the
/// administrative/service-to-service mode). Such a caller names the
/// tenant it is acting on via the `X-Tenant-Id` header instead — the
/// same header `engine_http::rate_limit` already keys on for
/// non-tenant-claim traffic. Restricted to admin-authenticated callers
/// so a non-admin JWT holder cannot widen its own scope by simply
/// omitting the tenant claim and supplying the header.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = EngineError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let config = parts
            .extensions
            .get::<Arc<EngineConfig>>()
            .cloned()
            .ok_or_else(|| EngineError::internal(anyhow::anyhow!("EngineConfig extension missing")))?;
        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(EngineError::Unauthorized)?;
        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();

        let mut ctx = authenticate(token, &config)?;
        if ctx.tenant_id.is_none() && ctx.is_admin {
            ctx.tenant_id = parts
                .headers
                .get("x-tenant-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
        }
        Ok(ctx)
    }
}

/// Validate `token` against the configured bearer-token set first, then
/// as a signed JWT.
///
/// # Errors
/// Returns [`EngineError::Unauthorized`] if `token` matches neither a
/// configured bearer token nor a validly signed JWT.
pub fn authenticate(token: &str, config: &EngineConfig) -> Result<AuthContext, EngineError> {
    if config.bearer_tokens.contains(token) {
        return Ok(AuthContext::bearer(token));
    }

    let Some(secret) = &config.jwt_secret else {
        return Err(EngineError::Unauthorized);
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    if let Some(aud) = &config.jwt_audience {
        validation.set_audience(&[aud]);
    } else {
        validation.validate_aud = false;
    }

    let data = decode::<Value>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|_| EngineError::Unauthorized)?;
    let claims = data.claims;

    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .ok_or(EngineError::Unauthorized)?
        .to_owned();

    let tenant_id = claims
        .get(&config.tenant_claim)
        .and_then(Value::as_str)
        .map(str::to_owned);

    let is_admin = claims
        .get(&config.role_claim)
        .and_then(|v| v.as_str().map(str::to_owned).or_else(|| {
            v.as_array().and_then(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .find(|r| *r == "admin")
                    .map(str::to_owned)
            })
        }))
        .is_some_and(|role| role == "admin");

    Ok(AuthContext {
        subject,
        tenant_id,
        is_admin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_crypto::MasterKey;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;
    use std::collections::HashSet;

    fn base_config(jwt_secret: Option<&str>) -> EngineConfig {
        EngineConfig {
            port: 0,
            bearer_tokens: HashSet::from(["svc-token-1".to_owned()]),
            jwt_secret: jwt_secret.map(str::to_owned),
            jwt_audience: Some("engine".to_owned()),
            tenant_claim: "tenant_id".to_owned(),
            role_claim: "role".to_owned(),
            master_key: MasterKey::new([0u8; 32]),
            dispatcher: engine_kit::DispatcherConfig::default(),
            dispatcher_workers: 1,
            router_workers: 1,
            module_start_timeout: std::time::Duration::from_secs(1),
            shutdown_drain_timeout: std::time::Duration::from_secs(1),
            subscriber_lag_limit: 10,
        }
    }

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        tenant_id: String,
        role: String,
        aud: String,
        exp: i64,
    }

    #[test]
    fn bearer_token_authenticates_as_admin() {
        let cfg = base_config(None);
        let ctx = authenticate("svc-token-1", &cfg).unwrap();
        assert!(ctx.is_admin);
        assert!(ctx.tenant_id.is_none());
    }

    #[test]
    fn unknown_token_without_jwt_secret_is_unauthorized() {
        let cfg = base_config(None);
        let err = authenticate("garbage", &cfg).unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized));
    }

    #[test]
    fn valid_jwt_extracts_subject_tenant_and_role() {
        let cfg = base_config(Some("jwt-secret"));
        let claims = TestClaims {
            sub: "user-1".to_owned(),
            tenant_id: "tenant-a".to_owned(),
            role: "admin".to_owned(),
            aud: "engine".to_owned(),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"jwt-secret"),
        )
        .unwrap();

        let ctx = authenticate(&token, &cfg).unwrap();
        assert_eq!(ctx.subject, "user-1");
        assert_eq!(ctx.tenant_id.as_deref(), Some("tenant-a"));
        assert!(ctx.is_admin);
    }

    #[tokio::test]
    async fn bearer_caller_adopts_tenant_from_header() {
        use axum::body::{Body, to_bytes};
        use http::{Request, StatusCode};
        use tower::ServiceExt;

        async fn handler(auth: AuthContext) -> String {
            auth.tenant_id.unwrap_or_default()
        }

        let app = axum::Router::new()
            .route("/", axum::routing::get(handler))
            .layer(axum::Extension(Arc::new(base_config(None))));

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("authorization", "Bearer svc-token-1")
                    .header("x-tenant-id", "tenant-z")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "tenant-z".as_bytes());
    }

    #[tokio::test]
    async fn non_admin_jwt_without_tenant_claim_ignores_header() {
        use axum::body::{Body, to_bytes};
        use http::{Request, StatusCode};
        use tower::ServiceExt;

        #[derive(Serialize)]
        struct NoTenantClaims {
            sub: String,
            role: String,
            aud: String,
            exp: i64,
        }

        let cfg = base_config(Some("jwt-secret"));
        let token = encode(
            &Header::default(),
            &NoTenantClaims {
                sub: "user-2".to_owned(),
                role: "user".to_owned(),
                aud: "engine".to_owned(),
                exp: chrono::Utc::now().timestamp() + 3600,
            },
            &EncodingKey::from_secret(b"jwt-secret"),
        )
        .unwrap();

        async fn handler(auth: AuthContext) -> String {
            auth.tenant_id.unwrap_or_else(|| "none".to_owned())
        }

        let app = axum::Router::new()
            .route("/", axum::routing::get(handler))
            .layer(axum::Extension(Arc::new(cfg)));

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("authorization", format!("Bearer {token}"))
                    .header("x-tenant-id", "tenant-z")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "none".as_bytes());
    }

    #[test]
    fn expired_jwt_is_unauthorized() {
        let cfg = base_config(Some("jwt-secret"));
        let claims = TestClaims {
            sub: "user-1".to_owned(),
            tenant_id: "tenant-a".to_owned(),
            role: "user".to_owned(),
            aud: "engine".to_owned(),
            exp: chrono::Utc::now().timestamp() - 10,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"jwt-secret"),
        )
        .unwrap();
        let err = authenticate(&token, &cfg).unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized));
    }
}
