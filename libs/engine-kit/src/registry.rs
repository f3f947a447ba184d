//! Module registry: manifest intake, dependency resolution, topology
//! export (§4.1, C3).
//!
//! Adapted from the teacher's inventory-fed `RegistryBuilder`, but
//! construction-time rather than global: `Engine::new` is handed an
//! explicit list of module descriptors instead of discovering them via
//! a process-wide `inventory::submit!` catalog (§9 Design Notes).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::context::Readiness;
use crate::contracts::{Module, RestApiCapability, RunnableCapability};

/// The five capability buses modules may advertise (C1). Used only for
/// topology/query purposes — cross-module calls always go through a
/// module's service handle, never a capability lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Bus {
    Compute,
    Data,
    Event,
    Store,
    Account,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModuleManifest {
    pub name: &'static str,
    pub domain: &'static str,
    pub description: &'static str,
    pub layer: &'static str,
    pub depends_on: Vec<&'static str>,
    pub requires_apis: Vec<&'static str>,
    pub capabilities: Vec<Bus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Registered,
    Starting,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

/// What a factory produces: the manifest plus the capability objects it
/// is prepared to offer. `rest`/`runnable` are independent of each
/// other and of the bus list in the manifest.
pub struct ModuleDescriptor {
    pub manifest: ModuleManifest,
    pub core: Arc<dyn Module>,
    pub rest: Option<Arc<dyn RestApiCapability>>,
    pub runnable: Option<Arc<dyn RunnableCapability>>,
}

pub(crate) struct ModuleEntry {
    pub manifest: ModuleManifest,
    pub core: Arc<dyn Module>,
    pub rest: Option<Arc<dyn RestApiCapability>>,
    pub runnable: Option<Arc<dyn RunnableCapability>>,
    pub readiness: Readiness,
    pub state: std::sync::Mutex<ModuleEntryState>,
}

pub(crate) struct ModuleEntryState {
    pub state: ModuleState,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: Vec<ModuleDescriptor>,
    errors: Vec<String>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(mut self, descriptor: ModuleDescriptor) -> Self {
        if self
            .descriptors
            .iter()
            .any(|d| d.manifest.name == descriptor.manifest.name)
        {
            self.errors
                .push(format!("module '{}' is already registered", descriptor.manifest.name));
        }
        self.descriptors.push(descriptor);
        self
    }

    fn validate_bus_uniqueness(&self) -> Result<(), RegistryError> {
        // Per §9 Design Note resolution: two sibling services both
        // registering for the `data` bus is a configuration error, not
        // a silent last-writer-wins.
        let mut owners: HashMap<Bus, &'static str> = HashMap::new();
        for d in &self.descriptors {
            for bus in &d.manifest.capabilities {
                if let Some(existing) = owners.insert(*bus, d.manifest.name)
                    && existing != d.manifest.name
                {
                    return Err(RegistryError::DuplicateBusOwner {
                        bus: *bus,
                        first: existing,
                        second: d.manifest.name,
                    });
                }
            }
        }
        Ok(())
    }

    fn detect_cycle(names: &[&'static str], adj: &[Vec<usize>]) -> Option<Vec<&'static str>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn dfs(
            node: usize,
            names: &[&'static str],
            adj: &[Vec<usize>],
            colors: &mut [Color],
            path: &mut Vec<usize>,
        ) -> Option<Vec<&'static str>> {
            colors[node] = Color::Gray;
            path.push(node);
            for &next in &adj[node] {
                match colors[next] {
                    Color::Gray => {
                        let start = path.iter().position(|&n| n == next)?;
                        let mut cycle: Vec<&'static str> =
                            path[start..].iter().map(|&i| names[i]).collect();
                        cycle.push(names[next]);
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = dfs(next, names, adj, colors, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
            path.pop();
            colors[node] = Color::Black;
            None
        }

        let mut colors = vec![Color::White; names.len()];
        let mut path = Vec::new();
        for i in 0..names.len() {
            if colors[i] == Color::White
                && let Some(cycle) = dfs(i, names, adj, &mut colors, &mut path)
            {
                return Some(cycle);
            }
        }
        None
    }

    /// Validate, topo-sort, and produce the final registry.
    ///
    /// # Errors
    /// Returns [`RegistryError`] on duplicate registration, an unknown
    /// dependency, a dependency cycle, or a bus claimed by two modules.
    pub fn build(self) -> Result<ModuleRegistry, RegistryError> {
        if !self.errors.is_empty() {
            return Err(RegistryError::InvalidConfiguration(self.errors));
        }
        self.validate_bus_uniqueness()?;

        let names: Vec<&'static str> = self.descriptors.iter().map(|d| d.manifest.name).collect();
        let mut idx: HashMap<&'static str, usize> = HashMap::new();
        for (i, &n) in names.iter().enumerate() {
            idx.insert(n, i);
        }

        let mut adj = vec![Vec::<usize>::new(); names.len()];
        for d in &self.descriptors {
            let u = idx[d.manifest.name];
            for dep in &d.manifest.depends_on {
                let Some(&v) = idx.get(dep) else {
                    return Err(RegistryError::UnknownDependency {
                        module: d.manifest.name,
                        depends_on: dep,
                    });
                };
                adj[v].push(u);
            }
        }

        if let Some(path) = Self::detect_cycle(&names, &adj) {
            return Err(RegistryError::CycleDetected { path });
        }

        let mut indeg = vec![0usize; names.len()];
        for list in &adj {
            for &t in list {
                indeg[t] += 1;
            }
        }
        let mut queue: VecDeque<usize> = indeg
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(names.len());
        while let Some(u) = queue.pop_front() {
            order.push(u);
            for &w in &adj[u] {
                indeg[w] -= 1;
                if indeg[w] == 0 {
                    queue.push_back(w);
                }
            }
        }

        let mut descriptors: Vec<Option<ModuleDescriptor>> =
            self.descriptors.into_iter().map(Some).collect();
        let mut modules = Vec::with_capacity(order.len());
        for i in order {
            let d = descriptors[i].take().expect("each index visited once");
            modules.push(ModuleEntry {
                manifest: d.manifest,
                core: d.core,
                rest: d.rest,
                runnable: d.runnable,
                readiness: Readiness::new(),
                state: std::sync::Mutex::new(ModuleEntryState {
                    state: ModuleState::Registered,
                    started_at: None,
                    last_error: None,
                }),
            });
        }

        tracing::info!(
            modules = ?modules.iter().map(|m| m.manifest.name).collect::<Vec<_>>(),
            "module dependency order resolved"
        );

        Ok(ModuleRegistry { modules })
    }
}

pub struct ModuleRegistry {
    pub(crate) modules: Vec<ModuleEntry>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn names_in_start_order(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.manifest.name).collect()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("module '{module}' depends on unknown module '{depends_on}'")]
    UnknownDependency {
        module: &'static str,
        depends_on: &'static str,
    },
    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<&'static str> },
    #[error("bus '{bus:?}' claimed by both '{first}' and '{second}'; exactly one owner is allowed")]
    DuplicateBusOwner {
        bus: Bus,
        first: &'static str,
        second: &'static str,
    },
    #[error("invalid registry configuration:\n{0:#?}")]
    InvalidConfiguration(Vec<String>),
}
