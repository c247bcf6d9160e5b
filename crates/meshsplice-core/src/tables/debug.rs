use std::sync::atomic::{AtomicU32, Ordering};

use meshsplice_common::{DEBUG_SLOTS, DEBUG_SLOT_LEVEL, DEBUG_SLOT_REDIRECTS};
use serde::{Deserialize, Serialize};

use crate::error::TableError;

/// Diagnostic verbosity held in slot 0 of the debug table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Verbosity(pub u32);

impl Verbosity {
    pub const OFF: Self = Self(0);
    pub const BASIC: Self = Self(1);
    pub const COUNTING: Self = Self(2);

    /// Per-message records are emitted.
    pub fn logs(self) -> bool {
        self >= Self::BASIC
    }

    /// Successful redirects are counted.
    pub fn counts(self) -> bool {
        self >= Self::COUNTING
    }
}

/// Two-slot table: verbosity, then the successful-redirect counter.
///
/// Both slots are externally writable, mirroring the pinned array map the
/// kernel program reads.
pub struct ConfigCounterTable {
    slots: [AtomicU32; DEBUG_SLOTS as usize],
}

impl ConfigCounterTable {
    pub fn new() -> Self {
        Self {
            slots: [AtomicU32::new(0), AtomicU32::new(0)],
        }
    }

    pub fn get(&self, slot: u32) -> Result<u32, TableError> {
        self.slots
            .get(slot as usize)
            .map(|s| s.load(Ordering::Relaxed))
            .ok_or(TableError::SlotOutOfRange(slot))
    }

    pub fn set(&self, slot: u32, value: u32) -> Result<(), TableError> {
        self.slots
            .get(slot as usize)
            .map(|s| s.store(value, Ordering::Relaxed))
            .ok_or(TableError::SlotOutOfRange(slot))
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity(self.slots[DEBUG_SLOT_LEVEL as usize].load(Ordering::Relaxed))
    }

    pub fn set_verbosity(&self, level: Verbosity) {
        self.slots[DEBUG_SLOT_LEVEL as usize].store(level.0, Ordering::Relaxed);
    }

    pub fn redirects(&self) -> u32 {
        self.slots[DEBUG_SLOT_REDIRECTS as usize].load(Ordering::Relaxed)
    }

    /// Count one successful redirect. Saturates instead of wrapping so the
    /// counter never goes backwards.
    pub fn record_redirect(&self) -> u32 {
        let prev = self.slots[DEBUG_SLOT_REDIRECTS as usize]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_add(1)))
            .unwrap_or(u32::MAX);
        prev.saturating_add(1)
    }
}

impl Default for ConfigCounterTable {
    fn default() -> Self {
        Self::new()
    }
}
