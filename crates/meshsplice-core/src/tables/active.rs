use meshsplice_common::Endpoint;

use crate::error::TableError;
use crate::table::{BoundedTable, InsertMode};

/// Locally bound endpoint of a just-opened outbound connection, mapped to the
/// destination the application originally asked for.
///
/// Entries live only between the active open and the passive open that
/// consumes them (or the close of either side).
pub struct ActiveEstablishTable {
    inner: BoundedTable<Endpoint, Endpoint>,
}

impl ActiveEstablishTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: BoundedTable::new(capacity),
        }
    }

    /// First writer wins: an existing entry for `local` is never replaced.
    pub fn record(&self, local: Endpoint, original_dst: Endpoint) -> Result<(), TableError> {
        self.inner.insert(local, original_dst, InsertMode::NoExist)
    }

    pub fn original_dst(&self, local: &Endpoint) -> Option<Endpoint> {
        self.inner.get(local)
    }

    pub fn forget(&self, local: &Endpoint) -> Option<Endpoint> {
        self.inner.remove(local)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
