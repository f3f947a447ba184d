//! Module glue: wires [`EventBusService`] into the engine lifecycle plus
//! a [`RunnableCapability`] janitor loop that proactively expires
//! lagging cursors (§4.5), the same init-builds-service-then-publish
//! shape as `modules/accounts` and `modules/oracle`.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::Router;
use engine_kit::contracts::{Module, RestApiCapability, RunnableCapability};
use engine_kit::context::ModuleCtx;
use engine_kit::registry::{Bus, ModuleDescriptor, ModuleManifest};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::EventBusService;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct EventBusModule {
    service: ArcSwapOption<EventBusService>,
    janitor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl EventBusModule {
    #[must_use]
    pub fn new() -> Self {
        Self {
            service: ArcSwapOption::empty(),
            janitor: std::sync::Mutex::new(None),
        }
    }
}

impl Default for EventBusModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for EventBusModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        let service = EventBusService::new(Arc::clone(&ctx.stores.events), ctx.config.subscriber_lag_limit);
        self.service.store(Some(Arc::new(service)));
        ctx.mark_ready(true);
        Ok(())
    }
}

impl RestApiCapability for EventBusModule {
    fn register_rest(&self, ctx: &ModuleCtx, router: Router) -> anyhow::Result<Router> {
        let service = self
            .service
            .load_full()
            .ok_or_else(|| anyhow::anyhow!("{} module's service handle is not initialized", ctx.name))?;
        Ok(crate::routes::mount(router, service))
    }
}

#[async_trait]
impl RunnableCapability for EventBusModule {
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let service = self
            .service
            .load_full()
            .ok_or_else(|| anyhow::anyhow!("eventbus module's service handle is not initialized"))?;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(SWEEP_INTERVAL) => {
                        service.sweep_expired();
                    }
                }
            }
        });

        #[allow(clippy::unwrap_used)]
        {
            *self.janitor.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
        }
        Ok(())
    }

    async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        #[allow(clippy::unwrap_used)]
        let handle = self
            .janitor
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }
}

/// Build the [`ModuleDescriptor`] this module contributes to
/// `Engine::new`.
#[must_use]
pub fn descriptor() -> ModuleDescriptor {
    let module = Arc::new(EventBusModule::new());
    ModuleDescriptor {
        manifest: ModuleManifest {
            name: "eventbus",
            domain: "event-fabric",
            description: "Topic-keyed pull-based fan-out with at-least-once delivery over a durable append log",
            layer: "core",
            depends_on: vec![],
            requires_apis: vec![],
            capabilities: vec![Bus::Event],
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
            "eventbus",
            Arc::new(Stores::in_memory()),
            config,
            CancellationToken::new(),
            Readiness::new(),
        )
    }

    #[tokio::test]
    async fn init_then_register_rest_succeeds() {
        let module = EventBusModule::new();
        let ctx = test_ctx();
        module.init(&ctx).await.unwrap();
        assert!(ctx.is_ready());
        assert!(module.register_rest(&ctx, Router::new()).is_ok());
    }

    #[tokio::test]
    async fn start_then_stop_drains_janitor() {
        let module = EventBusModule::new();
        let ctx = test_ctx();
        module.init(&ctx).await.unwrap();
        let cancel = CancellationToken::new();
        module.start(cancel.clone()).await.unwrap();
        cancel.cancel();
        module.stop(cancel).await.unwrap();
    }

    #[test]
    fn descriptor_declares_event_bus() {
        let d = descriptor();
        assert_eq!(d.manifest.name, "eventbus");
        assert!(d.manifest.capabilities.contains(&Bus::Event));
    }
}
