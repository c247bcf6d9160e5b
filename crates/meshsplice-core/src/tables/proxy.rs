use meshsplice_common::ConnTuple;

use crate::error::TableError;
use crate::table::{BoundedTable, InsertMode};

/// Symmetric pairing of the two hairpinned connections around the proxy.
///
/// `X -> Y` means bytes sent on X belong in Y's receive queue. Entries are
/// always written and removed as a pair; between the two single-key writes a
/// reader may briefly see one direction without the other.
pub struct ProxyPairTable {
    inner: BoundedTable<ConnTuple, ConnTuple>,
}

impl ProxyPairTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: BoundedTable::new(capacity),
        }
    }

    /// Insert `a <-> b`. If the second direction cannot be stored the first is
    /// rolled back so no half pair survives.
    pub fn insert_pair(&self, a: ConnTuple, b: ConnTuple) -> Result<(), TableError> {
        self.inner.insert(a, b, InsertMode::Any)?;
        if let Err(e) = self.inner.insert(b, a, InsertMode::Any) {
            self.inner.remove_if(&a, |_, v| *v == b);
            return Err(e);
        }
        Ok(())
    }

    pub fn partner(&self, tuple: &ConnTuple) -> Option<ConnTuple> {
        self.inner.get(tuple)
    }

    /// Remove `tuple` and, if it still points back, its partner's entry.
    /// Returns the partner that was paired with `tuple`.
    pub fn remove_pair(&self, tuple: &ConnTuple) -> Option<ConnTuple> {
        let partner = self.inner.remove(tuple)?;
        self.inner.remove_if(&partner, |_, back| back == tuple);
        Some(partner)
    }

    /// Drop both directions of a pairing that no longer describes a managed
    /// flow, whatever they currently point at.
    pub fn discard(&self, a: &ConnTuple, b: &ConnTuple) {
        self.inner.remove(a);
        self.inner.remove(b);
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

    fn tuple(lp: u16, rp: u16) -> ConnTuple {
        ConnTuple::new(Endpoint::new(0x7f00_0001, lp), Endpoint::new(0x0a00_0005, rp))
    }

    #[test]
    fn test_pair_is_symmetric() {
        let table = ProxyPairTable::new(8);
        let (a, b) = (tuple(40000, 8080), tuple(15001, 40000));
        table.insert_pair(a, b).unwrap();
        assert_eq!(table.partner(&a), Some(b));
        assert_eq!(table.partner(&b), Some(a));
    }

    #[test]
    fn test_remove_either_side_removes_both() {
        let table = ProxyPairTable::new(8);
        let (a, b) = (tuple(40000, 8080), tuple(15001, 40000));
        table.insert_pair(a, b).unwrap();
        assert_eq!(table.remove_pair(&b), Some(a));
        assert!(table.is_empty());
        assert_eq!(table.remove_pair(&a), None);
    }

    #[test]
    fn test_remove_keeps_partner_repaired_elsewhere() {
        let table = ProxyPairTable::new(8);
        let (a, b, c) = (tuple(1, 1), tuple(2, 2), tuple(3, 3));
        table.insert_pair(a, b).unwrap();
        // b re-paired with c; a's entry is now stale.
        table.insert_pair(b, c).unwrap();
        assert_eq!(table.remove_pair(&a), Some(b));
        assert_eq!(table.partner(&b), Some(c));
    }

    #[test]
    fn test_full_table_leaves_no_half_pair() {
        let table = ProxyPairTable::new(3);
        table.insert_pair(tuple(1, 1), tuple(2, 2)).unwrap();
        let (a, b) = (tuple(3, 3), tuple(4, 4));
        assert_eq!(table.insert_pair(a, b), Err(TableError::Full { capacity: 3 }));
        assert_eq!(table.partner(&a), None);
        assert_eq!(table.partner(&b), None);
        assert_eq!(table.len(), 2);
    }
}
