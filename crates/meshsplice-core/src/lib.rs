//! Sidecar connection splicing.
//!
//! Correlates the two hairpinned local connections a sidecar proxy sits
//! between and, per outbound message, moves bytes straight into the paired
//! connection's receive queue.

pub mod accel;
pub mod config;
pub mod error;
pub mod hooks;
pub mod host;
mod lifecycle;
pub mod message;
pub mod pin;
pub mod sim;
pub mod table;
pub mod tables;

pub use accel::Accelerator;
pub use error::{RedirectError, TableError};
pub use hooks::{dispatch_msg, dispatch_sock_ops, ConnectionHooks};
pub use host::{Direction, HostStack, Message, MsgEvent, SockOp, SockOpsEvent, TcpState, Verdict};
pub use message::{Decision, MessageOutcome};
pub use pin::PinRegistry;
pub use tables::{SharedTables, TableStats, Verbosity};
