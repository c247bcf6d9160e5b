use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::TableError;

/// Write semantics for [`BoundedTable::insert`], matching the kernel's map
/// update flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Create or replace.
    Any,
    /// Create only; an existing entry is left untouched.
    NoExist,
}

/// Concurrent keyed store with a fixed capacity.
///
/// Every operation is atomic for a single key. A new key is admitted only
/// after a slot has been reserved, so the table never holds more than
/// `capacity` entries; inserts past that point fail with
/// [`TableError::Full`] and are not retried.
pub struct BoundedTable<K, V> {
    entries: DashMap<K, V>,
    used: AtomicUsize,
    capacity: usize,
}

impl<K, V> BoundedTable<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            used: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn insert(&self, key: K, value: V, mode: InsertMode) -> Result<(), TableError> {
        match self.entries.entry(key) {
            Entry::Occupied(mut existing) => match mode {
                InsertMode::NoExist => Err(TableError::KeyExists),
                InsertMode::Any => {
                    existing.insert(value);
                    Ok(())
                }
            },
            Entry::Vacant(slot) => {
                self.reserve()?;
                slot.insert(value);
                Ok(())
            }
        }
    }

    fn reserve(&self) -> Result<(), TableError> {
        let capacity = self.capacity;
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| TableError::Full { capacity })
    }

    fn release(&self, n: usize) {
        if n > 0 {
            self.used.fetch_sub(n, Ordering::AcqRel);
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.release(1);
        }
        removed
    }

    /// Remove `key` only if `f` approves its current value.
    pub fn remove_if(&self, key: &K, f: impl FnOnce(&K, &V) -> bool) -> Option<V> {
        let removed = self.entries.remove_if(key, f).map(|(_, v)| v);
        if removed.is_some() {
            self.release(1);
        }
        removed
    }

    /// Keep only entries for which `f` returns true. Returns how many were
    /// dropped.
    pub fn retain(&self, mut f: impl FnMut(&K, &V) -> bool) -> usize {
        let mut dropped = 0;
        self.entries.retain(|k, v| {
            let keep = f(k, v);
            if !keep {
                dropped += 1;
            }
            keep
        });
        self.release(dropped);
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let table = BoundedTable::new(4);
        table.insert(1u32, "a", InsertMode::Any).unwrap();
        assert_eq!(table.get(&1), Some("a"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_no_exist_keeps_first_value() {
        let table = BoundedTable::new(4);
        table.insert(1u32, "first", InsertMode::NoExist).unwrap();
        assert_eq!(
            table.insert(1, "second", InsertMode::NoExist),
            Err(TableError::KeyExists)
        );
        assert_eq!(table.get(&1), Some("first"));
    }

    #[test]
    fn test_any_replaces_without_consuming_capacity() {
        let table = BoundedTable::new(1);
        table.insert(1u32, 10u32, InsertMode::Any).unwrap();
        table.insert(1, 20, InsertMode::Any).unwrap();
        assert_eq!(table.get(&1), Some(20));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_full_table_rejects_new_keys() {
        let table = BoundedTable::new(2);
        table.insert(1u32, (), InsertMode::Any).unwrap();
        table.insert(2, (), InsertMode::Any).unwrap();
        assert_eq!(
            table.insert(3, (), InsertMode::Any),
            Err(TableError::Full { capacity: 2 })
        );
        assert!(!table.contains(&3));

        table.remove(&1);
        table.insert(3, (), InsertMode::Any).unwrap();
        assert!(table.contains(&3));
    }

    #[test]
    fn test_remove_missing_is_none() {
        let table: BoundedTable<u32, u32> = BoundedTable::new(2);
        assert_eq!(table.remove(&7), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_if() {
        let table = BoundedTable::new(2);
        table.insert(1u32, 5u32, InsertMode::Any).unwrap();
        assert_eq!(table.remove_if(&1, |_, v| *v == 6), None);
        assert_eq!(table.remove_if(&1, |_, v| *v == 5), Some(5));
        assert!(table.is_empty());
    }

    #[test]
    fn test_retain_frees_capacity() {
        let table = BoundedTable::new(3);
        for k in 0u32..3 {
            table.insert(k, k, InsertMode::Any).unwrap();
        }
        assert_eq!(table.retain(|_, v| *v == 0), 2);
        table.insert(10, 10, InsertMode::Any).unwrap();
        table.insert(11, 11, InsertMode::Any).unwrap();
        assert_eq!(table.len(), 3);
    }
}
