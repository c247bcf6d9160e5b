use std::sync::Arc;

use dashmap::DashMap;

use crate::config::TableConfig;
use crate::tables::SharedTables;

/// Namespace of pinned table sets.
///
/// A pinned set outlives any control-plane process that loads it: `load`
/// returns the existing set if one is pinned under the name, and only
/// `unload` destroys it.
pub struct PinRegistry<S> {
    pins: DashMap<String, Arc<SharedTables<S>>>,
}

impl<S: Clone> PinRegistry<S> {
    pub fn new() -> Self {
        Self {
            pins: DashMap::new(),
        }
    }

    /// Open the set pinned under `config.pin_name`, creating and pinning it
    /// if absent. An existing set keeps its original capacity and contents.
    pub fn load(&self, config: &TableConfig) -> Arc<SharedTables<S>> {
        self.pins
            .entry(config.pin_name.clone())
            .or_insert_with(|| {
                tracing::info!(
                    pin = %config.pin_name,
                    capacity = config.capacity,
                    "creating pinned tables"
                );
                Arc::new(SharedTables::new(config.capacity))
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<SharedTables<S>>> {
        self.pins.get(name).map(|p| p.value().clone())
    }

    /// Destroy the pin. Handlers still holding the set keep it alive until they
    /// drop it, but no later `load` will see it.
    pub fn unload(&self, name: &str) -> bool {
        let removed = self.pins.remove(name).is_some();
        if removed {
            tracing::info!(pin = %name, "unpinned tables");
        }
        removed
    }

    pub fn is_pinned(&self, name: &str) -> bool {
        self.pins.contains_key(name)
    }
}

impl<S: Clone> Default for PinRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
