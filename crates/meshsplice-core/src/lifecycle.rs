//! Connection open/close bookkeeping.

use meshsplice_common::{is_intercept_port, ConnTuple, INBOUND_PROXY_ADDR};

use crate::accel::Accelerator;
use crate::host::HostStack;

impl<H: HostStack> Accelerator<H> {
    /// A locally initiated connection finished its handshake.
    pub fn active_open(&self, tuple: ConnTuple, socket: &H::Socket) {
        // Inbound proxy dialing a local application: no correlation needed.
        if tuple.local.addr == INBOUND_PROXY_ADDR {
            self.register(tuple, socket);
            return;
        }
        if tuple.local.addr == tuple.remote.addr {
            return;
        }

        if let Err(e) = self.tables.active.record(tuple.local, tuple.remote) {
            tracing::trace!(local = %tuple.local, error = %e, "active establish entry kept");
        }
        self.register(tuple, socket);
    }

    /// A local listener accepted a connection.
    pub fn passive_open(&self, tuple: ConnTuple, socket: &H::Socket) {
        if tuple.remote.addr == INBOUND_PROXY_ADDR {
            self.register(tuple, socket);
            return;
        }

        let Some(original_dst) = self.tables.active.original_dst(&tuple.remote) else {
            return;
        };
        if !is_intercept_port(tuple.local.port) {
            tracing::trace!(tuple = %tuple, "accept on non-sidecar listener ignored");
            return;
        }

        let client = ConnTuple::new(tuple.remote, original_dst);
        if let Err(e) = self.tables.proxy.insert_pair(client, tuple) {
            tracing::debug!(client = %client, proxy = %tuple, error = %e, "pairing not stored");
        }
        self.register(tuple, socket);
        self.tables.active.forget(&tuple.remote);
    }

    /// The connection reached the closed state. Safe to call repeatedly.
    pub fn close(&self, tuple: ConnTuple) {
        self.tables.proxy.remove_pair(&tuple);
        self.tables.active.forget(&tuple.local);
    }

    fn register(&self, tuple: ConnTuple, socket: &H::Socket) {
        if let Err(e) = self.tables.redirect.register(tuple, socket.clone()) {
            tracing::debug!(tuple = %tuple, error = %e, "socket not registered for redirect");
        }
    }
}
