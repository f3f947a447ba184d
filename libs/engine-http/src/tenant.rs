//! Tenant scoping helpers (§4.6, §4.1 account invariant).

use engine_errors::EngineError;

use crate::auth::AuthContext;

/// Confirm `ctx`'s tenant matches `resource_tenant_id`. Mismatches are
/// reported as [`EngineError::NotFound`], never `PermissionDenied`, so a
/// caller cannot distinguish "wrong tenant" from "does not exist" (§4.6:
/// "to avoid leaking tenancy").
///
/// # Errors
/// Returns [`EngineError::Unauthorized`] if `ctx` carries no tenant
/// (bearer-token callers are tenant-less and must pass an explicit
/// tenant elsewhere), or [`EngineError::NotFound`] on mismatch.
pub fn require_tenant_match(ctx: &AuthContext, resource_tenant_id: &str) -> Result<(), EngineError> {
    let Some(tenant_id) = &ctx.tenant_id else {
        return Err(EngineError::Unauthorized);
    };
    if tenant_id == resource_tenant_id {
        Ok(())
    } else {
        Err(EngineError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(tenant: Option<&str>) -> AuthContext {
        AuthContext {
            subject: "u".to_owned(),
            tenant_id: tenant.map(str::to_owned),
            is_admin: false,
        }
    }

    #[test]
    fn matching_tenant_passes() {
        require_tenant_match(&ctx(Some("t1")), "t1").unwrap();
    }

    #[test]
    fn mismatched_tenant_is_not_found_not_forbidden() {
        let err = require_tenant_match(&ctx(Some("t1")), "t2").unwrap_err();
        assert!(matches!(err, EngineError::NotFound));
    }

    #[test]
    fn missing_tenant_is_unauthorized() {
        let err = require_tenant_match(&ctx(None), "t2").unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized));
    }
}
