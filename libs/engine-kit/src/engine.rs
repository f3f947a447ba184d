//! Top-level `Engine`: the construction-time replacement for the
//! teacher's global module catalog (§9 Design Notes).

use std::sync::Arc;

use axum::Router;
use engine_errors::EngineError;
use engine_stores::Stores;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::config::EngineConfig;
use crate::registry::{Bus, ModuleDescriptor, ModuleRegistry, ModuleState, RegistryBuilder};
use crate::runtime;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModuleHealth {
    pub name: &'static str,
    pub domain: &'static str,
    pub ready: bool,
    pub state: ModuleState,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InstalledPackage {
    pub manifest_name: &'static str,
    pub domain: &'static str,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CapabilitySummaryEntry {
    pub bus: Bus,
    pub owner: &'static str,
}

/// The running service engine: a resolved module registry plus the
/// shared stores/config every module was constructed with.
pub struct Engine {
    registry: ModuleRegistry,
    stores: Arc<Stores>,
    config: Arc<EngineConfig>,
    cancel: CancellationToken,
    router: Mutex<Option<Router>>,
}

impl Engine {
    /// Validate and resolve the module set. Does not start anything —
    /// call [`Engine::start`] to run `init`/`rest`/`start`.
    ///
    /// # Errors
    /// Returns [`EngineError::ConfigInvalid`] if the module set has an
    /// unknown dependency, a cycle, or a bus claimed by two modules.
    pub fn new(
        descriptors: Vec<ModuleDescriptor>,
        stores: Arc<Stores>,
        config: Arc<EngineConfig>,
    ) -> Result<Self, EngineError> {
        let mut builder = RegistryBuilder::new();
        for d in descriptors {
            builder = builder.register(d);
        }
        let registry = builder
            .build()
            .map_err(|e| EngineError::ConfigInvalid(e.to_string()))?;

        Ok(Self {
            registry,
            stores,
            config,
            cancel: CancellationToken::new(),
            router: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the full boot sequence: `init`, `rest` (router assembly), then
    /// `start` for every runnable module, in dependency order.
    ///
    /// # Errors
    /// Propagates the first [`runtime::BootError`] encountered, wrapped
    /// as [`EngineError::DependencyUnavailable`]. On a `start` failure,
    /// already-started modules have already been rolled back by the
    /// time this returns.
    pub async fn start(&self) -> Result<(), EngineError> {
        runtime::run_init(&self.registry, &self.stores, &self.config, &self.cancel)
            .await
            .map_err(|e| EngineError::DependencyUnavailable(e.to_string()))?;

        let router = runtime::run_rest(&self.registry, &self.stores, &self.config, &self.cancel)
            .map_err(|e| EngineError::DependencyUnavailable(e.to_string()))?;
        *self.router.lock().await = Some(router);

        runtime::run_start(&self.registry, &self.config, &self.cancel)
            .await
            .map_err(|e| EngineError::DependencyUnavailable(e.to_string()))?;

        Ok(())
    }

    /// Signal shutdown and stop every runnable module in reverse order.
    ///
    /// # Errors
    /// Returns [`EngineError::Internal`] if one or more modules failed
    /// to stop cleanly; every module is still attempted.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.cancel.cancel();
        runtime::run_stop(&self.registry, &self.config, &self.cancel)
            .await
            .map_err(EngineError::internal)
    }

    /// The axum router assembled during `start`'s rest phase. `None`
    /// until [`Engine::start`] has run.
    pub async fn router(&self) -> Option<Router> {
        self.router.lock().await.clone()
    }

    #[must_use]
    pub fn modules_health(&self) -> Vec<ModuleHealth> {
        self.registry
            .modules
            .iter()
            .map(|entry| {
                #[allow(clippy::unwrap_used)]
                let guard = entry
                    .state
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                ModuleHealth {
                    name: entry.manifest.name,
                    domain: entry.manifest.domain,
                    ready: entry.readiness.is_ready(),
                    state: guard.state,
                    last_error: guard.last_error.clone(),
                }
            })
            .collect()
    }

    #[must_use]
    pub fn installed_packages(&self) -> Vec<InstalledPackage> {
        self.registry
            .modules
            .iter()
            .map(|entry| {
                #[allow(clippy::unwrap_used)]
                let guard = entry
                    .state
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                InstalledPackage {
                    manifest_name: entry.manifest.name,
                    domain: entry.manifest.domain,
                    started_at: guard.started_at,
                }
            })
            .collect()
    }

    #[must_use]
    pub fn modules_api_summary(&self) -> Vec<CapabilitySummaryEntry> {
        self.registry
            .modules
            .iter()
            .flat_map(|entry| {
                entry.manifest.capabilities.iter().map(|bus| CapabilitySummaryEntry {
                    bus: *bus,
                    owner: entry.manifest.name,
                })
            })
            .collect()
    }
}
