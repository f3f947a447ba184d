//! Core runtime scaffolding shared by every module: the `Module`
//! contract, per-module context, configuration, the dependency
//! registry, boot/shutdown orchestration, and the top-level `Engine`.

pub mod config;
pub mod context;
pub mod contracts;
pub mod engine;
pub mod registry;
pub mod runtime;

pub use config::{DispatcherConfig, EngineConfig};
pub use context::{ModuleCtx, Readiness};
pub use contracts::{Module, RestApiCapability, RunnableCapability};
pub use engine::{CapabilitySummaryEntry, Engine, InstalledPackage, ModuleHealth};
pub use registry::{
    Bus, ModuleDescriptor, ModuleManifest, ModuleRegistry, ModuleState, RegistryBuilder,
    RegistryError,
};
