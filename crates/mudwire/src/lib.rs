//! # Mudwire
//!
//! Telnet and WebSocket front end for text games.
//!
//! Mudwire accepts connections, negotiates client extensions (MXP) over
//! telnet, renders clickable links for clients that agreed to them and
//! plain text for everyone else, and keeps a registry of peer servers.
//! The game implements a single [`CommandHandler`] trait.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mudwire::prelude::*;
//!
//! struct Echo;
//!
//! impl CommandHandler for Echo {
//!     async fn handle_line(
//!         &self,
//!         _ctx: &ConnectionContext,
//!         line: &str,
//!     ) -> Response {
//!         Response::from(format!("You said {{lc{line}{{lt{line}{{le"))
//!     }
//! }
//!
//! # async fn start() -> Result<(), MudwireError> {
//! let server = MudwireServerBuilder::new()
//!     .telnet_addr("0.0.0.0:4000")
//!     .build(Echo)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
pub mod intake;
mod server;

pub use config::ServerConfig;
pub use error::MudwireError;
pub use handler::{CommandHandler, ConnectionContext, Response, TransportKind};
pub use server::{MudwireServer, MudwireServerBuilder};

pub use mudwire_peers as peers;
pub use mudwire_protocol as protocol;
pub use mudwire_session as session;
pub use mudwire_transport as transport;

/// Everything a game needs to implement a handler and start a server.
pub mod prelude {
    pub use crate::{
        CommandHandler, ConnectionContext, MudwireError, MudwireServer,
        MudwireServerBuilder, Response, ServerConfig, TransportKind,
    };
    pub use mudwire_peers::{PeerRecord, PeerRegistry};
    pub use mudwire_protocol::{LinkSyntax, MarkupConfig, PeerPacket};
    pub use mudwire_session::{Extension, MXP, NegotiationConfig};
}
