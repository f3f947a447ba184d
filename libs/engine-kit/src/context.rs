//! Per-module context handed to `init` and to capability methods.
//!
//! Mirrors the teacher's `ModuleCtx` idea (a narrow, per-module facade
//! over runtime-owned state) but carries the store bundle and config
//! directly rather than resolving them through a process-global
//! manager, per the Design Notes' construction-time `Engine` guidance.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use engine_stores::Stores;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;

/// Shared readiness flag for one module. The registry hands out a
/// handle; only the module itself calls `mark_ready`/`mark_not_ready`.
#[derive(Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn mark_not_ready(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct ModuleCtx {
    pub name: &'static str,
    pub stores: Arc<Stores>,
    pub config: Arc<EngineConfig>,
    pub cancel: CancellationToken,
    readiness: Readiness,
}

impl ModuleCtx {
    #[must_use]
    pub fn new(
        name: &'static str,
        stores: Arc<Stores>,
        config: Arc<EngineConfig>,
        cancel: CancellationToken,
        readiness: Readiness,
    ) -> Self {
        Self {
            name,
            stores,
            config,
            cancel,
            readiness,
        }
    }

    pub fn mark_ready(&self, ready: bool) {
        if ready {
            self.readiness.mark_ready();
        } else {
            self.readiness.mark_not_ready();
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_starts_false_and_is_mutated_only_by_caller() {
        let r = Readiness::new();
        assert!(!r.is_ready());
        r.mark_ready();
        assert!(r.is_ready());
        r.mark_not_ready();
        assert!(!r.is_ready());
    }
}
