//! Module glue for the topology/health surface. This module owns no
//! store, no bus, and no background loop: its [`Module::init`] has
//! nothing to build and exists only to satisfy the lifecycle contract,
//! and its REST routes read the already-running [`engine_kit::Engine`]
//! straight out of request extensions (see `routes.rs`).

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use engine_kit::contracts::{Module, RestApiCapability, RunnableCapability};
use engine_kit::context::ModuleCtx;
use engine_kit::registry::{ModuleDescriptor, ModuleManifest};
use tokio_util::sync::CancellationToken;

pub struct SystemStatusModule;

impl SystemStatusModule {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemStatusModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for SystemStatusModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        ctx.mark_ready(true);
        Ok(())
    }
}

impl RestApiCapability for SystemStatusModule {
    fn register_rest(&self, _ctx: &ModuleCtx, router: Router) -> anyhow::Result<Router> {
        Ok(crate::routes::mount(router))
    }
}

#[async_trait]
impl RunnableCapability for SystemStatusModule {
    async fn start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Build the [`ModuleDescriptor`] this module contributes to
/// `Engine::new`. Declares no bus ownership and no dependency edges: it
/// is pure observability over whatever topology the rest of the
/// registry already assembled.
#[must_use]
pub fn descriptor() -> ModuleDescriptor {
    let module = Arc::new(SystemStatusModule::new());
    ModuleDescriptor {
        manifest: ModuleManifest {
            name: "system-status",
            domain: "observability",
            description: "Topology and health surface over the running module registry",
            layer: "core",
            depends_on: vec![],
            requires_apis: vec![],
            capabilities: vec![],
        },
        core: module.clone(),
        rest: Some(module.clone()),
        runnable: Some(module),
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
            "system-status",
            Arc::new(Stores::in_memory()),
            config,
            CancellationToken::new(),
            Readiness::new(),
        )
    }

    #[tokio::test]
    async fn init_marks_ready_and_registers_routes() {
        let module = SystemStatusModule::new();
        let ctx = test_ctx();
        module.init(&ctx).await.unwrap();
        assert!(ctx.is_ready());
        assert!(module.register_rest(&ctx, Router::new()).is_ok());
    }

    #[tokio::test]
    async fn start_and_stop_are_no_ops() {
        let module = SystemStatusModule::new();
        let cancel = CancellationToken::new();
        module.start(cancel.clone()).await.unwrap();
        module.stop(cancel).await.unwrap();
    }

    #[test]
    fn descriptor_owns_no_bus_and_no_dependencies() {
        let d = descriptor();
        assert_eq!(d.manifest.name, "system-status");
        assert!(d.manifest.capabilities.is_empty());
        assert!(d.manifest.depends_on.is_empty());
    }
}
