//! Wire protocol for Mudwire.
//!
//! This crate holds everything that turns game text and telnet bytes into
//! something else, with no knowledge of connections or sessions:
//!
//! - **Markup** ([`parse`], [`MarkupToken`], [`LinkSyntax`]): splits
//!   outgoing text into literal runs and clickable links.
//! - **Encoder** ([`encode`], [`render`], [`MarkupConfig`]): writes
//!   tokens either as MXP `SEND` tags or as plain text.
//! - **Telnet** ([`telnet`]): option negotiation commands, subnegotiation
//!   framing and an incremental stream codec; [`LineCodec`] splits the
//!   data that remains into command lines.
//! - **Packets** ([`PeerPacket`], [`Codec`], [`JsonCodec`]): peer
//!   announcement payloads for the inter-server registry.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (telnet events, tokens)
//!                    → Session (capabilities)
//! ```

mod codec;
mod encoder;
mod error;
mod line;
mod markup;
mod packet;
pub mod telnet;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use encoder::{ESC, MXP_TEMP_SECURE, MarkupConfig, encode, render};
pub use error::ProtocolError;
pub use line::{DEFAULT_MAX_LINE, LineCodec};
pub use markup::{LinkSyntax, MarkupToken, Tokens, parse};
pub use packet::PeerPacket;
