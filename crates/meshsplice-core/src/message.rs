//! Per-message redirect decision.

use meshsplice_common::{is_intercept_port, ConnTuple};

use crate::accel::Accelerator;
use crate::error::RedirectError;
use crate::host::{Direction, HostStack, Message, Verdict};

/// What the handler did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Bytes were spliced into the socket registered under `target`.
    Redirected { target: ConnTuple },
    /// A redirect was attempted and the host refused it.
    RedirectFailed {
        target: ConnTuple,
        reason: RedirectError,
    },
    /// No pairing: not a sidecar flow.
    Unmanaged,
    /// A pairing existed but neither side sits on an interception port. It
    /// has been removed.
    StalePairing { paired: ConnTuple },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    pub decision: Decision,
    /// Always [`Verdict::Pass`]; a redirect is a side effect, not a verdict.
    pub verdict: Verdict,
}

impl MessageOutcome {
    fn new(decision: Decision) -> Self {
        Self {
            decision,
            verdict: Verdict::Pass,
        }
    }

    pub fn redirected(&self) -> bool {
        matches!(self.decision, Decision::Redirected { .. })
    }
}

impl<H: HostStack> Accelerator<H> {
    pub fn handle_message(&self, msg: &Message) -> MessageOutcome {
        let this = msg.tuple;

        let target = if this.touches_inbound_proxy() {
            // Inbound leg between proxy and application: deliver straight to
            // the other end of this same connection.
            this.mirror()
        } else {
            match self.outbound_target(&this) {
                Ok(paired) => paired,
                Err(decision) => return MessageOutcome::new(decision),
            }
        };

        MessageOutcome::new(self.splice(msg, target))
    }

    /// Resolve the pairing for an outbound or proxy-to-proxy message, cleaning
    /// up whatever turns out to be unmanaged.
    fn outbound_target(&self, this: &ConnTuple) -> Result<ConnTuple, Decision> {
        // A locally initiated connection that never got paired leaves this
        // behind; clear it on first traffic.
        self.tables.active.forget(&this.local);

        let Some(paired) = self.tables.proxy.partner(this) else {
            self.tables.redirect.unregister(this);
            return Err(Decision::Unmanaged);
        };

        if !is_intercept_port(this.local.port) && !is_intercept_port(paired.local.port) {
            tracing::debug!(tuple = %this, paired = %paired, "dropping stale pairing");
            self.tables.proxy.discard(this, &paired);
            self.tables.redirect.unregister(this);
            self.tables.redirect.unregister(&paired);
            return Err(Decision::StalePairing { paired });
        }

        Ok(paired)
    }

    fn splice(&self, msg: &Message, target: ConnTuple) -> Decision {
        let this = msg.tuple;
        let verbosity = self.tables.debug.verbosity();

        if verbosity.logs() {
            tracing::info!(src = %this.local, dst = %this.remote, size = msg.size, "message");
        }

        let result = match self.tables.redirect.socket(&target) {
            Some(socket) => self.host.redirect(&socket, msg, Direction::Ingress),
            None => Err(RedirectError::NoSocket),
        };

        match result {
            Ok(()) => {
                if verbosity.logs() {
                    tracing::info!(
                        src = %this.local.ip(),
                        dst = %this.remote.ip(),
                        "data redirection ok"
                    );
                }
                if verbosity.counts() {
                    let total = self.tables.debug.record_redirect();
                    tracing::info!(
                        src = %this.local.ip(),
                        dst = %this.remote.ip(),
                        total,
                        "data redirection succeeded, recording the number of redirections"
                    );
                }
                Decision::Redirected { target }
            }
            Err(reason) => {
                if verbosity.logs() {
                    tracing::warn!(
                        src = %this.local.ip(),
                        dst = %this.remote.ip(),
                        src_port = this.local.port,
                        dst_port = this.remote.port,
                        error = %reason,
                        "data redirection failed"
                    );
                }
                Decision::RedirectFailed { target, reason }
            }
        }
    }
}
