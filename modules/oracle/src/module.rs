//! Module glue: wires [`OracleService`] and the generic
//! [`crate::dispatcher::Dispatcher`] into the engine lifecycle, the same
//! `init`-builds-service-then-publish shape as `modules/accounts`, plus
//! a [`RunnableCapability`] control loop for the dispatcher (§4.1/§9:
//! "named worker pools sized from config... a single supervisor task
//! that restarts crashed workers with exponential backoff").

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::Router;
use engine_kit::contracts::{Module, RestApiCapability, RunnableCapability};
use engine_kit::context::ModuleCtx;
use engine_kit::registry::{Bus, ModuleDescriptor, ModuleManifest};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::domain::OracleService;
use crate::http_resolver::HttpResolver;

const TICK_INTERVAL: Duration = Duration::from_millis(250);
const SUPERVISOR_BACKOFF: Duration = Duration::from_secs(1);

pub struct OracleModule {
    service: ArcSwapOption<OracleService>,
    dispatcher: ArcSwapOption<Dispatcher>,
    workers: AtomicUsize,
    supervisors: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl OracleModule {
    #[must_use]
    pub fn new() -> Self {
        Self {
            service: ArcSwapOption::empty(),
            dispatcher: ArcSwapOption::empty(),
            workers: AtomicUsize::new(1),
            supervisors: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for OracleModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for OracleModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        let service = OracleService::new(
            Arc::clone(&ctx.stores.accounts),
            Arc::clone(&ctx.stores.data_sources),
            Arc::clone(&ctx.stores.requests),
        );
        self.service.store(Some(Arc::new(service)));

        let resolver = Arc::new(HttpResolver::new(Arc::clone(&ctx.stores.data_sources)));
        let dispatcher = Dispatcher::new(
            "oracle",
            Arc::clone(&ctx.stores.requests),
            Arc::clone(&ctx.stores.data_sources),
            Arc::clone(&ctx.stores.dead_letter),
            resolver,
            ctx.config.dispatcher.clone(),
        );
        self.dispatcher.store(Some(Arc::new(dispatcher)));
        self.workers.store(ctx.config.dispatcher_workers.max(1), Ordering::SeqCst);

        ctx.mark_ready(true);
        Ok(())
    }
}

impl RestApiCapability for OracleModule {
    fn register_rest(&self, ctx: &ModuleCtx, router: Router) -> anyhow::Result<Router> {
        let service = self
            .service
            .load_full()
            .ok_or_else(|| anyhow::anyhow!("{} module's service handle is not initialized", ctx.name))?;
        Ok(crate::routes::mount(router, service))
    }
}

/// Runs `ctx.config.dispatcher_workers` concurrent tick loops plus one
/// sweep loop, each independently safe to race because every state
/// change goes through `RequestStore::atomic_transition`'s CAS.
async fn worker_loop(dispatcher: Arc<Dispatcher>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(TICK_INTERVAL) => {
                if let Err(error) = dispatcher.tick().await {
                    tracing::warn!(error = %error, "oracle dispatcher tick failed");
                }
            }
        }
    }
}

async fn sweep_loop(dispatcher: Arc<Dispatcher>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(TICK_INTERVAL * 4) => {
                if let Err(error) = dispatcher.sweep_stalled().await {
                    tracing::warn!(error = %error, "oracle stalled-request sweep failed");
                }
            }
        }
    }
}

/// Supervises one worker task: if it exits early (it should only ever
/// return via cancellation, so an early return means a panic was caught
/// by the runtime and unwound the task), restart it after a fixed
/// backoff until cancellation is observed.
fn spawn_supervised(dispatcher: Arc<Dispatcher>, cancel: CancellationToken, sweep: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let d = Arc::clone(&dispatcher);
            let c = cancel.clone();
            let handle = if sweep {
                tokio::spawn(sweep_loop(d, c))
            } else {
                tokio::spawn(worker_loop(d, c))
            };
            let outcome = handle.await;
            if cancel.is_cancelled() {
                return;
            }
            if let Err(join_error) = outcome {
                tracing::warn!(error = %join_error, "oracle dispatcher worker panicked; restarting");
            }
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(SUPERVISOR_BACKOFF) => {}
            }
        }
    })
}

#[async_trait]
impl RunnableCapability for OracleModule {
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let dispatcher = self
            .dispatcher
            .load_full()
            .ok_or_else(|| anyhow::anyhow!("oracle module's dispatcher is not initialized"))?;

        let workers = self.workers.load(Ordering::SeqCst);
        let mut handles = Vec::with_capacity(workers + 1);
        for _ in 0..workers {
            handles.push(spawn_supervised(Arc::clone(&dispatcher), cancel.clone(), false));
        }
        handles.push(spawn_supervised(dispatcher, cancel, true));

        #[allow(clippy::unwrap_used)]
        self.supervisors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend(handles);
        Ok(())
    }

    async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        #[allow(clippy::unwrap_used)]
        let handles = std::mem::take(
            &mut *self
                .supervisors
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}

/// Build the [`ModuleDescriptor`] this module contributes to
/// `Engine::new`.
#[must_use]
pub fn descriptor() -> ModuleDescriptor {
    let module = Arc::new(OracleModule::new());
    ModuleDescriptor {
        manifest: ModuleManifest {
            name: "oracle",
            domain: "request-dispatcher",
            description: "Account-scoped data sources and the canonical long-running request dispatcher",
            layer: "core",
            depends_on: vec!["accounts"],
            requires_apis: vec![],
            capabilities: vec![Bus::Data],
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
            "oracle",
            Arc::new(Stores::in_memory()),
            config,
            CancellationToken::new(),
            Readiness::new(),
        )
    }

    #[tokio::test]
    async fn init_then_register_rest_succeeds() {
        let module = OracleModule::new();
        let ctx = test_ctx();
        module.init(&ctx).await.unwrap();
        assert!(ctx.is_ready());
        assert!(module.register_rest(&ctx, Router::new()).is_ok());
    }

    #[tokio::test]
    async fn start_then_stop_drains_workers() {
        let module = OracleModule::new();
        let ctx = test_ctx();
        module.init(&ctx).await.unwrap();
        let cancel = CancellationToken::new();
        module.start(cancel.clone()).await.unwrap();
        cancel.cancel();
        module.stop(cancel).await.unwrap();
    }

    #[test]
    fn descriptor_declares_data_bus_and_depends_on_accounts() {
        let d = descriptor();
        assert_eq!(d.manifest.name, "oracle");
        assert!(d.manifest.capabilities.contains(&Bus::Data));
        assert_eq!(d.manifest.depends_on, vec!["accounts"]);
        assert!(d.runnable.is_some());
    }
}
