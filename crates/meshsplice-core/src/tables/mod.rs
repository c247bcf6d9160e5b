//! The correlation tables shared by every handler.

pub mod active;
pub mod debug;
pub mod proxy;
pub mod redirect;

use serde::Serialize;

pub use active::ActiveEstablishTable;
pub use debug::{ConfigCounterTable, Verbosity};
pub use proxy::ProxyPairTable;
pub use redirect::RedirectTable;

/// The full table set. Created once at load time and handed to handlers by
/// reference; handlers never build their own.
pub struct SharedTables<S> {
    pub active: ActiveEstablishTable,
    pub proxy: ProxyPairTable,
    pub redirect: RedirectTable<S>,
    pub debug: ConfigCounterTable,
    capacity: usize,
}

/// Point-in-time view of table occupancy and the debug slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub capacity: usize,
    pub active_entries: usize,
    pub proxy_entries: usize,
    pub redirect_entries: usize,
    pub verbosity: Verbosity,
    pub redirects: u32,
}

impl<S: Clone> SharedTables<S> {
    pub fn new(capacity: usize) -> Self {
        Self {
            active: ActiveEstablishTable::new(capacity),
            proxy: ProxyPairTable::new(capacity),
            redirect: RedirectTable::new(capacity),
            debug: ConfigCounterTable::new(),
            capacity,
        }
    }

    pub fn snapshot(&self) -> TableStats {
        TableStats {
            capacity: self.capacity,
            active_entries: self.active.len(),
            proxy_entries: self.proxy.len(),
            redirect_entries: self.redirect.len(),
            verbosity: self.debug.verbosity(),
            redirects: self.debug.redirects(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
