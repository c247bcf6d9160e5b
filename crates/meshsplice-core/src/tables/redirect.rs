use meshsplice_common::ConnTuple;

use crate::error::TableError;
use crate::table::{BoundedTable, InsertMode};

/// Live socket handles the host's redirect primitive can deliver into,
/// keyed by the tuple of the socket that owns them.
pub struct RedirectTable<S> {
    inner: BoundedTable<ConnTuple, S>,
}

impl<S: Clone> RedirectTable<S> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: BoundedTable::new(capacity),
        }
    }

    pub fn register(&self, tuple: ConnTuple, socket: S) -> Result<(), TableError> {
        self.inner.insert(tuple, socket, InsertMode::Any)
    }

    pub fn socket(&self, tuple: &ConnTuple) -> Option<S> {
        self.inner.get(tuple)
    }

    pub fn is_registered(&self, tuple: &ConnTuple) -> bool {
        self.inner.contains(tuple)
    }

    pub fn unregister(&self, tuple: &ConnTuple) -> Option<S> {
        self.inner.remove(tuple)
    }

    /// Drop every entry whose socket matches `invalid`. Used by the host once
    /// a handle stops being valid.
    pub fn evict(&self, mut invalid: impl FnMut(&S) -> bool) -> usize {
        self.inner.retain(|_, socket| !invalid(socket))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use meshsplice_common::Endpoint;

    use super::*;

    #[test]
    fn test_register_replaces() {
        let table = RedirectTable::new(4);
        let t = ConnTuple::new(Endpoint::new(1, 1), Endpoint::new(2, 2));
        table.register(t, 7u64).unwrap();
        table.register(t, 8u64).unwrap();
        assert_eq!(table.socket(&t), Some(8));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_evict() {
        let table = RedirectTable::new(4);
        let a = ConnTuple::new(Endpoint::new(1, 1), Endpoint::new(2, 2));
        let b = a.mirror();
        table.register(a, 1u64).unwrap();
        table.register(b, 2u64).unwrap();
        assert_eq!(table.evict(|s| *s == 1), 1);
        assert!(!table.is_registered(&a));
        assert!(table.is_registered(&b));
    }
}
