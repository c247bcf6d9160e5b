use std::sync::Arc;

use meshsplice_common::ConnTuple;

use crate::hooks::ConnectionHooks;
use crate::host::{HostStack, Message, Verdict};
use crate::tables::SharedTables;

/// The sidecar fast path: lifecycle bookkeeping plus per-message splicing.
///
/// Holds the shared tables and the host by reference only. Any number of
/// accelerators may run against the same tables concurrently.
pub struct Accelerator<H: HostStack> {
    pub(crate) tables: Arc<SharedTables<H::Socket>>,
    pub(crate) host: Arc<H>,
}

impl<H: HostStack> Accelerator<H> {
    pub fn new(tables: Arc<SharedTables<H::Socket>>, host: Arc<H>) -> Self {
        Self { tables, host }
    }

    pub fn tables(&self) -> &Arc<SharedTables<H::Socket>> {
        &self.tables
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }
}

impl<H: HostStack> Clone for Accelerator<H> {
    fn clone(&self) -> Self {
        Self {
            tables: self.tables.clone(),
            host: self.host.clone(),
        }
    }
}

impl<H: HostStack> ConnectionHooks for Accelerator<H> {
    type Socket = H::Socket;

    fn on_active_open(&self, tuple: ConnTuple, socket: &H::Socket) {
        self.active_open(tuple, socket);
    }

    fn on_passive_open(&self, tuple: ConnTuple, socket: &H::Socket) {
        self.passive_open(tuple, socket);
    }

    fn on_close(&self, tuple: ConnTuple) {
        self.close(tuple);
    }

    fn on_message(&self, msg: &Message) -> Verdict {
        self.handle_message(msg).verdict
    }
}
