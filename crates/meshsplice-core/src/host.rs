//! Interface to the host network stack: the events it emits and the redirect
//! primitive it provides.

use std::fmt;

use meshsplice_common::{ConnTuple, WireAddrs, AF_INET};

use crate::error::RedirectError;

/// Target queue for a redirected message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Into the target socket's receive path.
    Ingress,
    /// Out of the target socket's send path.
    Egress,
}

/// Completion verdict returned to the host for a message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
}

/// An outbound message after address normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    /// The sending socket's own view of its connection.
    pub tuple: ConnTuple,
    pub size: u32,
}

/// The host stack's side of the splice.
pub trait HostStack: Send + Sync {
    /// Handle identifying a live socket.
    type Socket: Clone + Send + Sync + fmt::Debug;

    /// Move `msg`'s bytes into `target`. Failure leaves the message on its
    /// normal send path.
    fn redirect(
        &self,
        target: &Self::Socket,
        msg: &Message,
        direction: Direction,
    ) -> Result<(), RedirectError>;
}

/// TCP states the lifecycle handlers distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Established,
    FinWait,
    CloseWait,
    TimeWait,
    Close,
    Other(u32),
}

/// Connection-state transition reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockOp {
    /// A locally initiated connection finished its handshake.
    ActiveEstablished,
    /// A connection was accepted by a local listener.
    PassiveEstablished,
    StateChange { new: TcpState },
    Other(u32),
}

/// A raw connection-lifecycle event as emitted by the host.
#[derive(Debug, Clone)]
pub struct SockOpsEvent<S> {
    pub family: u32,
    pub op: SockOp,
    pub addrs: WireAddrs,
    pub socket: S,
}

impl<S> SockOpsEvent<S> {
    /// IPv4 sockets, and dual-stack sockets talking to an IPv4 peer.
    pub fn is_ipv4(&self) -> bool {
        self.family == AF_INET || self.addrs.remote_ip4 != 0
    }

    /// State-change callbacks must be enabled on every tracked socket so the
    /// close handler fires.
    pub fn wants_state_callbacks(&self) -> bool {
        self.is_ipv4()
    }
}

/// A raw outbound-message event as emitted by the host.
#[derive(Debug, Clone, Copy)]
pub struct MsgEvent {
    pub family: u32,
    pub addrs: WireAddrs,
    pub size: u32,
}

impl MsgEvent {
    pub fn is_ipv4(&self) -> bool {
        self.family == AF_INET || self.addrs.remote_ip4 != 0
    }
}
