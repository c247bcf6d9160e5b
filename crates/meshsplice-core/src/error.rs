use thiserror::Error;

/// Outcome of a failed table write.
///
/// None of these are fatal: handlers log them and let the affected flow
/// degrade to plain pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("table full (capacity {capacity})")]
    Full { capacity: usize },
    #[error("key already present")]
    KeyExists,
    #[error("slot {0} out of range")]
    SlotOutOfRange(u32),
}

/// Failure reported by the host's redirect primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedirectError {
    #[error("no socket registered for target")]
    NoSocket,
    #[error("target socket is closed")]
    SocketClosed,
    #[error("host rejected redirect: {0}")]
    Rejected(String),
}
