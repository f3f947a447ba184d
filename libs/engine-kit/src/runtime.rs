//! Boot/shutdown phase orchestration (§4.1).
//!
//! Trimmed from the teacher's `HostRuntime`: no `ApiGateway`/`System`
//! capability phase, no out-of-process module spawn. Four phases
//! remain: `init` (dependency order), `rest` (route composition),
//! `start` (runnables, dependency order, rollback on failure), `stop`
//! (runnables, reverse order, best-effort).

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::context::ModuleCtx;
use crate::registry::{ModuleRegistry, ModuleState};
use engine_stores::Stores;

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("module '{module}' failed to initialize: {source}")]
    Init {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}' failed to register rest routes: {source}")]
    Rest {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}' failed to start: {source}")]
    Start {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}' did not start within {timeout:?}")]
    StartTimeout {
        module: &'static str,
        timeout: Duration,
    },
}

/// Run `Module::init` for every module, in dependency order.
///
/// # Errors
/// Returns [`BootError::Init`] on the first module whose `init` fails;
/// modules already initialized are left as-is (there is no per-module
/// rollback for `init`, only for `start`).
pub async fn run_init(
    registry: &ModuleRegistry,
    stores: &Arc<Stores>,
    config: &Arc<EngineConfig>,
    cancel: &CancellationToken,
) -> Result<(), BootError> {
    for entry in &registry.modules {
        let ctx = ModuleCtx::new(
            entry.manifest.name,
            Arc::clone(stores),
            Arc::clone(config),
            cancel.clone(),
            entry.readiness.clone(),
        );
        entry
            .core
            .init(&ctx)
            .await
            .map_err(|source| BootError::Init {
                module: entry.manifest.name,
                source,
            })?;
        tracing::info!(module = entry.manifest.name, "module initialized");
    }
    Ok(())
}

/// Fold every module's REST routes onto one router, in dependency
/// order (later modules can rely on earlier ones having already
/// claimed their prefixes, though route paths should not collide).
///
/// # Errors
/// Returns [`BootError::Rest`] if any module's `register_rest` fails.
pub fn run_rest(
    registry: &ModuleRegistry,
    stores: &Arc<Stores>,
    config: &Arc<EngineConfig>,
    cancel: &CancellationToken,
) -> Result<Router, BootError> {
    let mut router = Router::new();
    for entry in &registry.modules {
        let Some(rest) = &entry.rest else { continue };
        let ctx = ModuleCtx::new(
            entry.manifest.name,
            Arc::clone(stores),
            Arc::clone(config),
            cancel.clone(),
            entry.readiness.clone(),
        );
        router = rest
            .register_rest(&ctx, router)
            .map_err(|source| BootError::Rest {
                module: entry.manifest.name,
                source,
            })?;
        tracing::info!(module = entry.manifest.name, "rest routes registered");
    }
    Ok(router)
}

/// Start every runnable module, in dependency order, each bounded by
/// `config.module_start_timeout`. On failure or timeout, already-started
/// modules are stopped in reverse order before the error is returned
/// (§4.1: "a failed or timed-out `start` triggers rollback: every
/// module started so far is stopped, in reverse order").
///
/// # Errors
/// Returns [`BootError::Start`] or [`BootError::StartTimeout`] if any
/// module fails to start; rollback failures are logged, not returned
/// (the original start failure is the one that matters to the caller).
pub async fn run_start(
    registry: &ModuleRegistry,
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<(), BootError> {
    let mut started: Vec<usize> = Vec::new();

    for (i, entry) in registry.modules.iter().enumerate() {
        let Some(runnable) = &entry.runnable else { continue };
        set_state(entry, ModuleState::Starting);

        let outcome = tokio::time::timeout(
            config.module_start_timeout,
            runnable.start(cancel.clone()),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                set_state(entry, ModuleState::Ready);
                entry.readiness.mark_ready();
                started.push(i);
                tracing::info!(module = entry.manifest.name, "module started");
            }
            Ok(Err(source)) => {
                set_state_failed(entry, source.to_string());
                rollback(registry, &started, cancel).await;
                return Err(BootError::Start {
                    module: entry.manifest.name,
                    source,
                });
            }
            Err(_elapsed) => {
                set_state_failed(entry, "start timed out".to_owned());
                rollback(registry, &started, cancel).await;
                return Err(BootError::StartTimeout {
                    module: entry.manifest.name,
                    timeout: config.module_start_timeout,
                });
            }
        }
    }

    Ok(())
}

async fn rollback(registry: &ModuleRegistry, started: &[usize], cancel: &CancellationToken) {
    for &i in started.iter().rev() {
        let entry = &registry.modules[i];
        let Some(runnable) = &entry.runnable else { continue };
        if let Err(e) = runnable.stop(cancel.clone()).await {
            tracing::warn!(module = entry.manifest.name, error = %e, "rollback stop failed");
        }
        entry.readiness.mark_not_ready();
    }
}

/// Stop every runnable module, in reverse dependency order. Per-module
/// failures are logged and aggregated, not short-circuited — every
/// module gets a chance to release its resources (§4.1: "shutdown is
/// best-effort and does not abort on a single module's failure").
///
/// # Errors
/// Returns an aggregate error if one or more modules failed to stop
/// cleanly; all modules are still attempted regardless.
pub async fn run_stop(
    registry: &ModuleRegistry,
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut failures = Vec::new();

    for entry in registry.modules.iter().rev() {
        let Some(runnable) = &entry.runnable else { continue };
        set_state(entry, ModuleState::Stopping);
        let outcome =
            tokio::time::timeout(config.shutdown_drain_timeout, runnable.stop(cancel.clone()))
                .await;
        match outcome {
            Ok(Ok(())) => {
                set_state(entry, ModuleState::Stopped);
            }
            Ok(Err(e)) => {
                tracing::warn!(module = entry.manifest.name, error = %e, "module stop failed");
                failures.push(format!("{}: {e}", entry.manifest.name));
                set_state_failed(entry, e.to_string());
            }
            Err(_elapsed) => {
                tracing::warn!(module = entry.manifest.name, "module stop timed out");
                failures.push(format!("{}: stop timed out", entry.manifest.name));
                set_state_failed(entry, "stop timed out".to_owned());
            }
        }
        entry.readiness.mark_not_ready();
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("module shutdown failures: {}", failures.join("; ")))
    }
}

fn set_state(entry: &crate::registry::ModuleEntry, state: ModuleState) {
    #[allow(clippy::unwrap_used)]
    let mut guard = entry.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    guard.state = state;
    if state == ModuleState::Ready {
        guard.started_at = Some(chrono::Utc::now());
    }
}

fn set_state_failed(entry: &crate::registry::ModuleEntry, error: String) {
    #[allow(clippy::unwrap_used)]
    let mut guard = entry.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    guard.state = ModuleState::Failed;
    guard.last_error = Some(error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{Module, RunnableCapability};
    use crate::registry::{Bus, ModuleDescriptor, ModuleManifest, RegistryBuilder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NoopCore;
    #[async_trait]
    impl Module for NoopCore {
        async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct OkRunnable(Arc<AtomicBool>);
    #[async_trait]
    impl RunnableCapability for OkRunnable {
        async fn start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            self.0.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailRunnable;
    #[async_trait]
    impl RunnableCapability for FailRunnable {
        async fn start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("boom"))
        }
        async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FailStopRunnable;
    #[async_trait]
    impl RunnableCapability for FailStopRunnable {
        async fn start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
        async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("boom"))
        }
    }

    fn manifest(name: &'static str, deps: &[&'static str]) -> ModuleManifest {
        ModuleManifest {
            name,
            domain: "test",
            description: "",
            layer: "core",
            depends_on: deps.to_vec(),
            requires_apis: vec![],
            capabilities: Vec::<Bus>::new(),
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            port: 0,
            bearer_tokens: Default::default(),
            jwt_secret: None,
            jwt_audience: None,
            tenant_claim: "tenant_id".to_owned(),
            role_claim: "role".to_owned(),
            master_key: engine_crypto::MasterKey::new([0u8; 32]),
            dispatcher: crate::config::DispatcherConfig::default(),
            dispatcher_workers: 1,
            router_workers: 1,
            module_start_timeout: Duration::from_millis(200),
            shutdown_drain_timeout: Duration::from_millis(200),
            subscriber_lag_limit: 10,
        }
    }

    #[tokio::test]
    async fn start_rolls_back_already_started_on_later_failure() {
        let started_flag = Arc::new(AtomicBool::new(false));
        let registry = RegistryBuilder::new()
            .register(ModuleDescriptor {
                manifest: manifest("a", &[]),
                core: Arc::new(NoopCore),
                rest: None,
                runnable: Some(Arc::new(OkRunnable(Arc::clone(&started_flag)))),
            })
            .register(ModuleDescriptor {
                manifest: manifest("b", &["a"]),
                core: Arc::new(NoopCore),
                rest: None,
                runnable: Some(Arc::new(FailRunnable)),
            })
            .build()
            .unwrap();

        let cfg = test_config();
        let cancel = CancellationToken::new();
        let err = run_start(&registry, &cfg, &cancel).await.unwrap_err();
        assert!(matches!(err, BootError::Start { module: "b", .. }));
        assert!(!started_flag.load(Ordering::SeqCst), "module a must be rolled back");
    }

    #[tokio::test]
    async fn stop_aggregates_failures_without_aborting() {
        let registry = RegistryBuilder::new()
            .register(ModuleDescriptor {
                manifest: manifest("a", &[]),
                core: Arc::new(NoopCore),
                rest: None,
                runnable: Some(Arc::new(FailStopRunnable)),
            })
            .register(ModuleDescriptor {
                manifest: manifest("b", &[]),
                core: Arc::new(NoopCore),
                rest: None,
                runnable: Some(Arc::new(FailStopRunnable)),
            })
            .build()
            .unwrap();
        let cfg = test_config();
        let cancel = CancellationToken::new();
        let err = run_stop(&registry, &cfg, &cancel).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains('a'), "aggregated error must mention module a: {message}");
        assert!(message.contains('b'), "aggregated error must mention module b: {message}");
    }
}
