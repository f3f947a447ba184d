//! Module glue: wires [`AccountsService`] into the engine lifecycle
//! (C2/C7) the way the teacher's per-module `init`-then-mount pattern
//! does, minus the `inventory::submit!` registration (§9 Design Notes).

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::Router;
use engine_kit::contracts::{Module, RestApiCapability};
use engine_kit::context::ModuleCtx;
use engine_kit::registry::{Bus, ModuleDescriptor, ModuleManifest};

use crate::domain::AccountsService;

pub struct AccountsModule {
    service: ArcSwapOption<AccountsService>,
}

impl AccountsModule {
    #[must_use]
    pub fn new() -> Self {
        Self {
            service: ArcSwapOption::empty(),
        }
    }
}

impl Default for AccountsModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for AccountsModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        let service = AccountsService::new(
            Arc::clone(&ctx.stores.accounts),
            Arc::clone(&ctx.stores.secrets),
            Arc::clone(&ctx.stores.wallets),
            Arc::clone(&ctx.stores.gasbank),
            ctx.config.master_key.clone(),
        );
        self.service.store(Some(Arc::new(service)));
        ctx.mark_ready(true);
        Ok(())
    }
}

impl RestApiCapability for AccountsModule {
    fn register_rest(&self, ctx: &ModuleCtx, router: Router) -> anyhow::Result<Router> {
        let service = self
            .service
            .load_full()
            .ok_or_else(|| anyhow::anyhow!("{} module's service handle is not initialized", ctx.name))?;
        Ok(crate::routes::mount(router, service))
    }
}

/// Build the [`ModuleDescriptor`] this module contributes to
/// `Engine::new` (§9 Design Notes: descriptors are assembled explicitly
/// by the binary rather than discovered via a global registry).
#[must_use]
pub fn descriptor() -> ModuleDescriptor {
    let module = Arc::new(AccountsModule::new());
    ModuleDescriptor {
        manifest: ModuleManifest {
            name: "accounts",
            domain: "account-fabric",
            description: "Account records, envelope-encrypted secrets, wallet bindings, gasbank ledger",
            layer: "core",
            depends_on: vec![],
            requires_apis: vec![],
            capabilities: vec![Bus::Account, Bus::Store],
        },
        core: module.clone(),
        rest: Some(module),
        runnable: None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use engine_kit::context::{ModuleCtx, Readiness};
    use engine_kit::{DispatcherConfig, EngineConfig};
    use engine_stores::Stores;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn test_ctx() -> ModuleCtx {
        let config = Arc::new(EngineConfig {
            port: 0,
            bearer_tokens: Default::default(),
            jwt_secret: None,
            jwt_audience: None,
            tenant_claim: "tenant_id".to_owned(),
            role_claim: "role".to_owned(),
            master_key: engine_crypto::MasterKey::new([3u8; 32]),
            dispatcher: DispatcherConfig::default(),
            dispatcher_workers: 1,
            router_workers: 1,
            module_start_timeout: std::time::Duration::from_secs(1),
            shutdown_drain_timeout: std::time::Duration::from_secs(1),
            subscriber_lag_limit: 10,
        });
        ModuleCtx::new(
            "accounts",
            Arc::new(Stores::in_memory()),
            config,
            CancellationToken::new(),
            Readiness::new(),
        )
    }

    #[tokio::test]
    async fn register_rest_before_init_fails() {
        let module = AccountsModule::new();
        let ctx = test_ctx();
        assert!(module.register_rest(&ctx, Router::new()).is_err());
    }

    #[tokio::test]
    async fn init_then_register_rest_succeeds() {
        let module = AccountsModule::new();
        let ctx = test_ctx();
        module.init(&ctx).await.unwrap();
        assert!(ctx.is_ready());
        assert!(module.register_rest(&ctx, Router::new()).is_ok());
    }

    #[test]
    fn descriptor_declares_account_and_store_buses() {
        let d = descriptor();
        assert_eq!(d.manifest.name, "accounts");
        assert!(d.manifest.capabilities.contains(&Bus::Account));
        assert!(d.rest.is_some());
    }
}
