//! In-process host stack and event-trace replay.
//!
//! `SimHost` stands in for the kernel: it owns socket liveness and counts what
//! the redirect primitive delivers. `Trace` feeds a recorded sequence of
//! lifecycle and message events through the same wire boundary the kernel
//! uses.

use std::cell::Cell;
use std::net::SocketAddrV4;
use std::path::Path;

use dashmap::DashMap;
use meshsplice_common::{ConnTuple, Endpoint, WireAddrs, AF_INET};
use serde::{Deserialize, Serialize};

use crate::accel::Accelerator;
use crate::error::RedirectError;
use crate::hooks::{dispatch_msg, dispatch_sock_ops, ConnectionHooks};
use crate::host::{
    Direction, HostStack, Message, MsgEvent, SockOp, SockOpsEvent, TcpState, Verdict,
};
use crate::message::Decision;
use crate::tables::TableStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketId(pub u64);

/// Delivery counters for one simulated socket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SocketCounters {
    pub open: bool,
    /// State-change callbacks were requested, so the close event will fire.
    pub state_callbacks: bool,
    pub ingress_msgs: u64,
    pub ingress_bytes: u64,
    pub egress_msgs: u64,
    pub egress_bytes: u64,
}

#[derive(Default)]
pub struct SimHost {
    sockets: DashMap<SocketId, SocketCounters>,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, id: SocketId) {
        self.sockets.entry(id).or_default().open = true;
    }

    pub fn close(&self, id: SocketId) {
        if let Some(mut socket) = self.sockets.get_mut(&id) {
            socket.open = false;
        }
    }

    pub fn enable_state_callbacks(&self, id: SocketId) {
        self.sockets.entry(id).or_default().state_callbacks = true;
    }

    pub fn state_callbacks(&self, id: SocketId) -> bool {
        self.sockets
            .get(&id)
            .map(|s| s.state_callbacks)
            .unwrap_or(false)
    }

    pub fn is_open(&self, id: SocketId) -> bool {
        self.sockets.get(&id).map(|s| s.open).unwrap_or(false)
    }

    pub fn counters(&self, id: SocketId) -> Option<SocketCounters> {
        self.sockets.get(&id).map(|s| s.clone())
    }
}

impl HostStack for SimHost {
    type Socket = SocketId;

    fn redirect(
        &self,
        target: &SocketId,
        msg: &Message,
        direction: Direction,
    ) -> Result<(), RedirectError> {
        let mut socket = self
            .sockets
            .get_mut(target)
            .ok_or(RedirectError::NoSocket)?;
        if !socket.open {
            return Err(RedirectError::SocketClosed);
        }
        match direction {
            Direction::Ingress => {
                socket.ingress_msgs += 1;
                socket.ingress_bytes += u64::from(msg.size);
            }
            Direction::Egress => {
                socket.egress_msgs += 1;
                socket.egress_bytes += u64::from(msg.size);
            }
        }
        Ok(())
    }
}

/// One recorded host event. Endpoints are `a.b.c.d:port`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    ActiveOpen {
        socket: SocketId,
        local: SocketAddrV4,
        remote: SocketAddrV4,
    },
    PassiveOpen {
        socket: SocketId,
        local: SocketAddrV4,
        remote: SocketAddrV4,
    },
    Close {
        socket: SocketId,
        local: SocketAddrV4,
        remote: SocketAddrV4,
    },
    Message {
        local: SocketAddrV4,
        remote: SocketAddrV4,
        #[serde(default = "default_message_size")]
        size: u32,
    },
}

fn default_message_size() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    pub events: Vec<TraceEvent>,
}

/// Reportable form of a [`Decision`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReplayedDecision {
    Redirected { target: String },
    RedirectFailed { target: String, reason: String },
    Pass,
    StalePairing { paired: String },
}

impl From<&Decision> for ReplayedDecision {
    fn from(decision: &Decision) -> Self {
        match decision {
            Decision::Redirected { target } => Self::Redirected {
                target: target.to_string(),
            },
            Decision::RedirectFailed { target, reason } => Self::RedirectFailed {
                target: target.to_string(),
                reason: reason.to_string(),
            },
            Decision::Unmanaged => Self::Pass,
            Decision::StalePairing { paired } => Self::StalePairing {
                paired: paired.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub index: usize,
    pub tuple: String,
    #[serde(flatten)]
    pub outcome: ReplayedDecision,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub messages: Vec<MessageRecord>,
    pub stats: TableStats,
}

impl ReplayReport {
    pub fn redirected(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m.outcome, ReplayedDecision::Redirected { .. }))
            .count()
    }
}

/// Forwards to the accelerator and keeps the last message decision, which the
/// hook interface itself reduces to a verdict.
struct ReplayHooks<'a> {
    accel: &'a Accelerator<SimHost>,
    last: Cell<Option<Decision>>,
}

impl ConnectionHooks for ReplayHooks<'_> {
    type Socket = SocketId;

    fn on_active_open(&self, tuple: ConnTuple, socket: &SocketId) {
        self.accel.on_active_open(tuple, socket);
    }

    fn on_passive_open(&self, tuple: ConnTuple, socket: &SocketId) {
        self.accel.on_passive_open(tuple, socket);
    }

    fn on_close(&self, tuple: ConnTuple) {
        self.accel.on_close(tuple);
    }

    fn on_message(&self, msg: &Message) -> Verdict {
        let outcome = self.accel.handle_message(msg);
        self.last.set(Some(outcome.decision));
        outcome.verdict
    }
}

fn tuple_of(local: SocketAddrV4, remote: SocketAddrV4) -> ConnTuple {
    ConnTuple::new(Endpoint::from(local), Endpoint::from(remote))
}

impl Trace {
    /// Load a trace from a YAML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Drive every event through the dispatch entry points in order.
    ///
    /// Opens enable state callbacks the way the kernel program does, and a
    /// close is only delivered to sockets that asked for it. On `close` the
    /// host also invalidates the socket and scrubs its redirect entries, as
    /// the kernel does when a socket is released.
    pub fn replay(&self, accel: &Accelerator<SimHost>) -> ReplayReport {
        let host = accel.host();
        let hooks = ReplayHooks {
            accel,
            last: Cell::new(None),
        };
        let mut messages = Vec::new();

        for (index, event) in self.events.iter().enumerate() {
            match *event {
                TraceEvent::ActiveOpen {
                    socket,
                    local,
                    remote,
                } => {
                    host.open(socket);
                    let event = sock_event(SockOp::ActiveEstablished, local, remote, socket);
                    open_socket(&hooks, &event);
                }
                TraceEvent::PassiveOpen {
                    socket,
                    local,
                    remote,
                } => {
                    host.open(socket);
                    let event = sock_event(SockOp::PassiveEstablished, local, remote, socket);
                    open_socket(&hooks, &event);
                }
                TraceEvent::Close {
                    socket,
                    local,
                    remote,
                } => {
                    if host.state_callbacks(socket) {
                        let op = SockOp::StateChange {
                            new: TcpState::Close,
                        };
                        dispatch_sock_ops(&hooks, &sock_event(op, local, remote, socket));
                    }
                    host.close(socket);
                    accel.tables().redirect.evict(|s| *s == socket);
                }
                TraceEvent::Message {
                    local,
                    remote,
                    size,
                } => {
                    let tuple = tuple_of(local, remote);
                    let event = MsgEvent {
                        family: AF_INET,
                        addrs: WireAddrs::from_tuple(&tuple),
                        size,
                    };
                    dispatch_msg(&hooks, &event);
                    let decision = hooks.last.take().unwrap_or(Decision::Unmanaged);
                    tracing::debug!(
                        index,
                        tuple = %tuple,
                        decision = ?decision,
                        "replayed message"
                    );
                    messages.push(MessageRecord {
                        index,
                        tuple: tuple.to_string(),
                        outcome: ReplayedDecision::from(&decision),
                    });
                }
            }
        }

        ReplayReport {
            messages,
            stats: accel.tables().snapshot(),
        }
    }
}

fn open_socket(hooks: &ReplayHooks<'_>, event: &SockOpsEvent<SocketId>) {
    if event.wants_state_callbacks() {
        hooks.accel.host().enable_state_callbacks(event.socket);
    }
    dispatch_sock_ops(hooks, event);
}

fn sock_event(
    op: SockOp,
    local: SocketAddrV4,
    remote: SocketAddrV4,
    socket: SocketId,
) -> SockOpsEvent<SocketId> {
    SockOpsEvent {
        family: AF_INET,
        op,
        addrs: WireAddrs::from_tuple(&tuple_of(local, remote)),
        socket,
    }
}
