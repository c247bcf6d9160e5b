use meshsplice_common::ConnTuple;

use crate::host::{Message, MsgEvent, SockOp, SockOpsEvent, TcpState, Verdict};

/// The four callbacks the host stack drives.
///
/// Implementations run synchronously in the host's dispatch context and must
/// not block.
pub trait ConnectionHooks {
    type Socket;

    fn on_active_open(&self, tuple: ConnTuple, socket: &Self::Socket);
    fn on_passive_open(&self, tuple: ConnTuple, socket: &Self::Socket);
    fn on_close(&self, tuple: ConnTuple);
    fn on_message(&self, msg: &Message) -> Verdict;
}

/// Route a lifecycle event to `hooks`.
///
/// Addresses are normalized here and nowhere else. Non-IPv4 events and state
/// changes other than into `Close` are ignored.
pub fn dispatch_sock_ops<H>(hooks: &H, event: &SockOpsEvent<H::Socket>)
where
    H: ConnectionHooks + ?Sized,
{
    if !event.is_ipv4() {
        return;
    }
    let tuple = event.addrs.normalize();
    match event.op {
        SockOp::ActiveEstablished => hooks.on_active_open(tuple, &event.socket),
        SockOp::PassiveEstablished => hooks.on_passive_open(tuple, &event.socket),
        SockOp::StateChange {
            new: TcpState::Close,
        } => hooks.on_close(tuple),
        SockOp::StateChange { .. } | SockOp::Other(_) => {}
    }
}

/// Route a message event to `hooks`. Irrelevant families pass untouched.
pub fn dispatch_msg<H>(hooks: &H, event: &MsgEvent) -> Verdict
where
    H: ConnectionHooks + ?Sized,
{
    if !event.is_ipv4() {
        return Verdict::Pass;
    }
    let msg = Message {
        tuple: event.addrs.normalize(),
        size: event.size,
    };
    hooks.on_message(&msg)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use meshsplice_common::{Endpoint, WireAddrs, AF_INET};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(&'static str, ConnTuple)>>,
    }

    impl ConnectionHooks for Recorder {
        type Socket = u64;

        fn on_active_open(&self, tuple: ConnTuple, _socket: &u64) {
            self.calls.lock().unwrap().push(("active", tuple));
        }
        fn on_passive_open(&self, tuple: ConnTuple, _socket: &u64) {
            self.calls.lock().unwrap().push(("passive", tuple));
        }
        fn on_close(&self, tuple: ConnTuple) {
            self.calls.lock().unwrap().push(("close", tuple));
        }
        fn on_message(&self, msg: &Message) -> Verdict {
            self.calls.lock().unwrap().push(("message", msg.tuple));
            Verdict::Pass
        }
    }

    fn tuple() -> ConnTuple {
        ConnTuple::new(Endpoint::new(0x0a00_0005, 40000), Endpoint::new(0x0a00_0009, 8080))
    }

    fn event(family: u32, op: SockOp) -> SockOpsEvent<u64> {
        SockOpsEvent {
            family,
            op,
            addrs: WireAddrs::from_tuple(&tuple()),
            socket: 1,
        }
    }

    #[test]
    fn test_routes_ops_with_normalized_tuple() {
        let rec = Recorder::default();
        dispatch_sock_ops(&rec, &event(AF_INET, SockOp::ActiveEstablished));
        dispatch_sock_ops(&rec, &event(AF_INET, SockOp::PassiveEstablished));
        dispatch_sock_ops(
            &rec,
            &event(AF_INET, SockOp::StateChange { new: TcpState::Close }),
        );
        let calls = rec.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![("active", tuple()), ("passive", tuple()), ("close", tuple())]
        );
    }

    #[test]
    fn test_ignores_non_close_state_changes() {
        let rec = Recorder::default();
        dispatch_sock_ops(
            &rec,
            &event(AF_INET, SockOp::StateChange { new: TcpState::FinWait }),
        );
        dispatch_sock_ops(&rec, &event(AF_INET, SockOp::Other(7)));
        assert!(rec.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_ignores_non_ipv4_without_remote_v4() {
        let rec = Recorder::default();
        let mut ev = event(10, SockOp::ActiveEstablished);
        ev.addrs.remote_ip4 = 0;
        assert!(!ev.wants_state_callbacks());
        dispatch_sock_ops(&rec, &ev);
        assert!(rec.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_accepts_dual_stack_with_v4_peer() {
        let rec = Recorder::default();
        dispatch_sock_ops(&rec, &event(10, SockOp::ActiveEstablished));
        assert_eq!(rec.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_message_dispatch() {
        let rec = Recorder::default();
        let ev = MsgEvent {
            family: AF_INET,
            addrs: WireAddrs::from_tuple(&tuple()),
            size: 64,
        };
        assert_eq!(dispatch_msg(&rec, &ev), Verdict::Pass);
        assert_eq!(*rec.calls.lock().unwrap(), vec![("message", tuple())]);
    }
}
