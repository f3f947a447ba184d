//! Capability traits a module may implement, and the plain `Module`
//! core every module must implement.

use async_trait::async_trait;
use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::context::ModuleCtx;

/// Every module's mandatory core. `init` runs once, in dependency
/// order, before any capability is exercised.
#[async_trait]
pub trait Module: Send + Sync {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()>;
}

/// A module that contributes HTTP routes.
pub trait RestApiCapability: Send + Sync {
    /// Mount this module's routes onto the shared router. Errors abort
    /// the rest wiring phase and therefore the boot sequence.
    ///
    /// # Errors
    /// Returns an error if route registration fails (e.g. a route
    /// conflict detected at mount time).
    fn register_rest(&self, ctx: &ModuleCtx, router: Router) -> anyhow::Result<Router>;
}

/// A module that runs a background control loop (the Oracle dispatcher,
/// the event bus fan-out, the gasbank janitor, ...).
#[async_trait]
pub trait RunnableCapability: Send + Sync {
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()>;
    async fn stop(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}
