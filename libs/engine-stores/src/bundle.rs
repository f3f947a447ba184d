use std::sync::Arc;

use crate::mem::{
    InMemoryAccountStore, InMemoryDataSourceStore, InMemoryDeadLetterStore, InMemoryEventStore,
    InMemoryGasBankStore, InMemoryRequestStore, InMemorySecretStore, InMemoryWalletStore,
};
use crate::traits::{
    AccountStore, DataSourceStore, DeadLetterStore, EventStore, GasBankStore, RequestStore,
    SecretStore, WalletStore,
};

/// The opaque handle bundle the Engine is constructed with (§4.1,
/// §9 Design Notes: "fold [stores] into a construction-time `Engine`
/// value parameterized by a `Stores` bundle"). Modules never see this
/// type directly; they receive the individual `Arc<dyn Trait>` handles
/// they declared a need for via `ModuleCtx`.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub wallets: Arc<dyn WalletStore>,
    pub gasbank: Arc<dyn GasBankStore>,
    pub requests: Arc<dyn RequestStore>,
    pub dead_letter: Arc<dyn DeadLetterStore>,
    pub data_sources: Arc<dyn DataSourceStore>,
    pub events: Arc<dyn EventStore>,
}

impl Stores {
    /// Build the in-memory reference bundle. Intended for the binary's
    /// default wiring and for tests; a deployment with a real database
    /// constructs its own `Stores` from Postgres-backed adapters that
    /// satisfy the same traits.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(InMemoryAccountStore::new()),
            secrets: Arc::new(InMemorySecretStore::new()),
            wallets: Arc::new(InMemoryWalletStore::new()),
            gasbank: Arc::new(InMemoryGasBankStore::new()),
            requests: Arc::new(InMemoryRequestStore::new()),
            dead_letter: Arc::new(InMemoryDeadLetterStore::new()),
            data_sources: Arc::new(InMemoryDataSourceStore::new()),
            events: Arc::new(InMemoryEventStore::new()),
        }
    }
}
