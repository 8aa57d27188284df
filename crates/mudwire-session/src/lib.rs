//! Per-connection session state for Mudwire.
//!
//! This crate owns the one piece of per-connection state the rendering
//! path depends on: which telnet extensions the client has agreed to.
//!
//! 1. **Configuration** ([`NegotiationConfig`], [`Extension`]): the
//!    extension table and reply timeout.
//! 2. **Negotiation** ([`Negotiator`], [`CapabilityState`]): offers an
//!    extension, waits for the answer, settles it exactly once.
//! 3. **Rendering** ([`Session`]): parses outgoing text and encodes it
//!    for whatever the client turned out to support.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)      ← feeds telnet replies in, asks for rendered text
//!     ↕
//! Session (this crate)
//!     ↕
//! Protocol (below)    ← telnet commands, markup parser, wire encoder
//! ```

mod config;
mod error;
mod negotiator;
mod session;

pub use config::{Extension, MXP, NegotiationConfig};
pub use error::SessionError;
pub use negotiator::{CapabilityState, Negotiator};
pub use session::Session;
