//! Per-connection capability negotiation.
//!
//! Before the server can send MXP tags it has to ask the client whether
//! it understands them. For each extension the exchange is:
//!
//! ```text
//!   server: IAC WILL <opt>            Idle → AwaitingResponse
//!   client: IAC DO <opt>              → Granted
//!        or IAC DONT <opt>            → Denied
//!        or nothing before timeout    → Denied
//!        or the connection closes     → Denied
//! ```
//!
//! Granted and Denied are final. Every callback registered for an
//! extension runs exactly once with the final result.
//!
//! # Concurrency
//!
//! A [`Negotiator`] belongs to one connection task. The only other party
//! touching its state is the timeout task spawned per offer, which holds
//! a weak reference and takes the same mutex. Callbacks are always run
//! after the mutex is released, so a callback may call back into the
//! negotiator.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use mudwire_protocol::telnet::{TelnetCommand, TelnetVerb};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{Extension, NegotiationConfig, SessionError};

/// Where an extension stands on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityState {
    /// Never offered.
    Idle,
    /// Offered, no answer yet.
    AwaitingResponse,
    /// The client accepted. Final.
    Granted,
    /// The client refused, timed out, or went away. Final.
    Denied,
}

impl CapabilityState {
    /// `true` for [`Granted`](Self::Granted) and [`Denied`](Self::Denied).
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Granted | Self::Denied)
    }
}

impl fmt::Display for CapabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingResponse => "awaiting-response",
            Self::Granted => "granted",
            Self::Denied => "denied",
        };
        f.write_str(s)
    }
}

type Callback = Box<dyn FnOnce(bool) + Send + 'static>;

/// An offer in flight.
struct Pending {
    callbacks: Vec<Callback>,
    timer: JoinHandle<()>,
}

/// Internal phase of one extension. An extension that was never offered
/// has no entry. Once `Settled`, nothing replaces it.
enum Phase {
    Awaiting(Pending),
    Settled(bool),
}

struct Shared {
    conn: String,
    timeout: Duration,
    extensions: Vec<Extension>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    phases: Mutex<HashMap<String, Phase>>,
}

impl Shared {
    fn phases(&self) -> MutexGuard<'_, HashMap<String, Phase>> {
        // A panicking callback never runs under this lock, so the map is
        // consistent even if poisoned.
        self.phases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn by_option(&self, option: u8) -> Option<&Extension> {
        self.extensions.iter().find(|ext| ext.option == option)
    }

    /// Settles `name` if it is still awaiting a reply. Returns the
    /// callbacks to run, or `None` if it had already settled.
    fn settle(
        &self,
        name: &str,
        granted: bool,
    ) -> Option<Vec<Callback>> {
        let mut phases = self.phases();
        let phase = phases.get_mut(name)?;
        if matches!(phase, Phase::Settled(_)) {
            return None;
        }
        match std::mem::replace(phase, Phase::Settled(granted)) {
            Phase::Awaiting(pending) => {
                pending.timer.abort();
                Some(pending.callbacks)
            }
            Phase::Settled(_) => None,
        }
    }
}

fn run_callbacks(callbacks: Vec<Callback>, granted: bool) {
    for callback in callbacks {
        callback(granted);
    }
}

/// Negotiates telnet extensions for one connection.
///
/// Offers go out through the connection's outbound byte channel; replies
/// are fed in with [`handle_command`](Self::handle_command). Dropping the
/// negotiator is the same as [`close`](Self::close).
pub struct Negotiator {
    shared: Arc<Shared>,
}

impl Negotiator {
    /// Creates a negotiator for a connection.
    ///
    /// `conn` labels log lines. `outbound` is the connection's writer
    /// channel; every offer is one message on it.
    pub fn new(
        conn: impl fmt::Display,
        config: &NegotiationConfig,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                conn: conn.to_string(),
                timeout: config.timeout(),
                extensions: config.extensions.clone(),
                outbound,
                phases: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Offers `extension` to the client.
    ///
    /// The offer is sent at most once per connection. `on_result` runs
    /// exactly once with the final answer:
    ///
    /// - first call: sends the offer and starts the reply timer; the
    ///   callback runs when the extension settles.
    /// - while awaiting: nothing is sent; the callback runs alongside the
    ///   first one.
    /// - already settled: nothing is sent; the callback runs immediately.
    ///
    /// Returns `Ok(true)` if this call sent the offer. A connection that
    /// is already gone gets no offer, so the extension settles as denied
    /// and this returns `Ok(false)`. Must be called
    /// from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns [`SessionError::UnknownExtension`] if `extension` isn't in
    /// the negotiation table.
    pub fn negotiate<F>(
        &self,
        extension: &str,
        on_result: F,
    ) -> Result<bool, SessionError>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let shared = &self.shared;
        let ext = shared
            .extensions
            .iter()
            .find(|ext| ext.name == extension)
            .ok_or_else(|| SessionError::UnknownExtension(extension.into()))?;

        let mut phases = shared.phases();
        match phases.get_mut(extension) {
            Some(Phase::Awaiting(pending)) => {
                pending.callbacks.push(Box::new(on_result));
                return Ok(false);
            }
            Some(Phase::Settled(granted)) => {
                let granted = *granted;
                drop(phases);
                on_result(granted);
                return Ok(false);
            }
            None => {}
        }

        let offer = TelnetCommand::new(TelnetVerb::Will, ext.option);
        if shared.outbound.send(offer.to_bytes().to_vec()).is_err() {
            debug!(
                conn = %shared.conn,
                extension = %ext.name,
                "connection closed before offer, denying"
            );
            phases.insert(ext.name.clone(), Phase::Settled(false));
            drop(phases);
            on_result(false);
            return Ok(false);
        }

        let timer = tokio::spawn(expire_after(
            Arc::downgrade(shared),
            ext.name.clone(),
            shared.timeout,
        ));
        phases.insert(
            ext.name.clone(),
            Phase::Awaiting(Pending {
                callbacks: vec![Box::new(on_result)],
                timer,
            }),
        );

        debug!(
            conn = %shared.conn,
            extension = %ext.name,
            option = ext.option,
            "offered extension"
        );
        Ok(true)
    }

    /// Feeds a negotiation command received from the client.
    ///
    /// `DO` for an awaited extension grants it, `DONT` denies it. Replies
    /// for an extension that isn't awaiting one are ignored.
    ///
    /// Returns `true` if the command was a reply to one of this
    /// negotiator's extensions (whether or not it changed anything), so
    /// the caller knows not to refuse it.
    pub fn handle_command(&self, command: TelnetCommand) -> bool {
        let shared = &self.shared;
        let granted = match command.verb {
            TelnetVerb::Do => true,
            TelnetVerb::Dont => false,
            TelnetVerb::Will | TelnetVerb::Wont => return false,
        };
        let Some(ext) = shared.by_option(command.option) else {
            return false;
        };

        match shared.settle(&ext.name, granted) {
            Some(callbacks) => {
                info!(
                    conn = %shared.conn,
                    extension = %ext.name,
                    granted,
                    "extension negotiated"
                );
                run_callbacks(callbacks, granted);
            }
            None => {
                debug!(
                    conn = %shared.conn,
                    extension = %ext.name,
                    verb = ?command.verb,
                    "unsolicited reply ignored"
                );
            }
        }
        true
    }

    /// Returns `true` only if `extension` has been granted.
    ///
    /// Never blocks. While an offer is outstanding the answer is `false`,
    /// so callers render plain text until the client says otherwise.
    pub fn is_capable(&self, extension: &str) -> bool {
        self.state(extension) == CapabilityState::Granted
    }

    /// Current state of `extension`. Unknown names are always `Idle`.
    pub fn state(&self, extension: &str) -> CapabilityState {
        match self.shared.phases().get(extension) {
            None => CapabilityState::Idle,
            Some(Phase::Awaiting(_)) => CapabilityState::AwaitingResponse,
            Some(Phase::Settled(true)) => CapabilityState::Granted,
            Some(Phase::Settled(false)) => CapabilityState::Denied,
        }
    }

    /// The option code for `extension`, if it is in the table.
    pub fn option(&self, extension: &str) -> Option<u8> {
        self.shared
            .extensions
            .iter()
            .find(|ext| ext.name == extension)
            .map(|ext| ext.option)
    }

    /// Denies every outstanding offer and cancels its timer.
    ///
    /// Called when the connection goes away. Settled extensions keep
    /// their result.
    pub fn close(&self) {
        let shared = &self.shared;
        let mut callbacks = Vec::new();
        {
            let mut phases = shared.phases();
            for (name, phase) in phases.iter_mut() {
                if let Phase::Awaiting(_) = phase {
                    if let Phase::Awaiting(pending) =
                        std::mem::replace(phase, Phase::Settled(false))
                    {
                        pending.timer.abort();
                        callbacks.extend(pending.callbacks);
                    }
                    debug!(
                        conn = %shared.conn,
                        extension = %name,
                        "connection closed mid-negotiation, denying"
                    );
                }
            }
        }
        run_callbacks(callbacks, false);
    }
}

impl Drop for Negotiator {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("conn", &self.shared.conn)
            .field("timeout", &self.shared.timeout)
            .finish_non_exhaustive()
    }
}

/// Body of the per-offer timer task.
async fn expire_after(shared: Weak<Shared>, name: String, timeout: Duration) {
    tokio::time::sleep(timeout).await;

    let Some(shared) = shared.upgrade() else {
        return;
    };
    if let Some(callbacks) = shared.settle(&name, false) {
        info!(
            conn = %shared.conn,
            extension = %name,
            "no reply before timeout, denying"
        );
        run_callbacks(callbacks, false);
    }
}
