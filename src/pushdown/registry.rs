use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{
    aggregate::AggregateKind,
    filter::FilterKind,
    pushdown::{AggregatePushDown, BackendKind, Capabilities, FilterPushDown},
};

/// Explicit `(backend, kind) → implementation` table. Each backend module
/// contributes its entries through a `register` function; a missing entry
/// means "evaluate in memory".
#[derive(Clone, Default)]
pub struct PushDownRegistry {
    filters: HashMap<(BackendKind, FilterKind), Arc<dyn FilterPushDown>>,
    aggregates: HashMap<(BackendKind, AggregateKind), Arc<dyn AggregatePushDown>>,
    capabilities: HashMap<BackendKind, Capabilities>,
}

impl PushDownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_filter(
        &mut self,
        backend: BackendKind,
        kind: FilterKind,
        implementation: Arc<dyn FilterPushDown>,
    ) -> &mut Self {
        self.filters.insert((backend, kind), implementation);
        self
    }

    pub fn register_aggregate(
        &mut self,
        backend: BackendKind,
        kind: AggregateKind,
        implementation: Arc<dyn AggregatePushDown>,
    ) -> &mut Self {
        self.aggregates.insert((backend, kind), implementation);
        self
    }

    pub fn set_capabilities(&mut self, backend: BackendKind, capabilities: Capabilities) -> &mut Self {
        self.capabilities.insert(backend, capabilities);
        self
    }

    pub fn remove_filter(&mut self, backend: BackendKind, kind: FilterKind) -> &mut Self {
        self.filters.remove(&(backend, kind));
        self
    }

    /// Snapshot of one backend's entries, taken when the repository is built.
    pub fn resolve(&self, backend: BackendKind) -> BackendPushDown {
        BackendPushDown {
            backend,
            filters: self
                .filters
                .iter()
                .filter(|((b, _), _)| *b == backend)
                .map(|((_, kind), imp)| (*kind, imp.clone()))
                .collect(),
            aggregates: self
                .aggregates
                .iter()
                .filter(|((b, _), _)| *b == backend)
                .map(|((_, kind), imp)| (*kind, imp.clone()))
                .collect(),
            capabilities: self.capabilities.get(&backend).copied().unwrap_or_default(),
        }
    }
}

impl fmt::Debug for PushDownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushDownRegistry")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("aggregates", &self.aggregates.keys().collect::<Vec<_>>())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// The resolved push-down table of a single backend.
#[derive(Clone)]
pub struct BackendPushDown {
    backend: BackendKind,
    filters: HashMap<FilterKind, Arc<dyn FilterPushDown>>,
    aggregates: HashMap<AggregateKind, Arc<dyn AggregatePushDown>>,
    capabilities: Capabilities,
}

impl BackendPushDown {
    /// Nothing is pushed down; every predicate runs in memory.
    pub fn none(backend: BackendKind) -> Self {
        Self {
            backend,
            filters: HashMap::new(),
            aggregates: HashMap::new(),
            capabilities: Capabilities::none(),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn filter(&self, kind: FilterKind) -> Option<&Arc<dyn FilterPushDown>> {
        self.filters.get(&kind)
    }

    pub fn aggregate(&self, kind: AggregateKind) -> Option<&Arc<dyn AggregatePushDown>> {
        self.aggregates.get(&kind)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

impl fmt::Debug for BackendPushDown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendPushDown")
            .field("backend", &self.backend)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("aggregates", &self.aggregates.keys().collect::<Vec<_>>())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
