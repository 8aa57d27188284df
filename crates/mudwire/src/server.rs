//! `MudwireServer` builder and server loop.
//!
//! This is the entry point for running a Mudwire server. It ties together
//! all the layers: transport → protocol → session, plus the process-wide
//! peer registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mudwire_peers::PeerRegistry;
use mudwire_transport::{TelnetTransport, Transport, WebSocketTransport};
use tokio::net::UdpSocket;

use crate::handler::{CommandHandler, handle_telnet, handle_websocket};
use crate::{MudwireError, ServerConfig, intake};

/// Pause after a failed accept (out of file descriptors, usually).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<H> {
    pub(crate) config: ServerConfig,
    pub(crate) handler: H,
    pub(crate) peers: PeerRegistry,
}

/// Builder for configuring and starting a Mudwire server.
///
/// # Example
///
/// ```rust,ignore
/// use mudwire::prelude::*;
///
/// let server = MudwireServerBuilder::new()
///     .telnet_addr("0.0.0.0:4000")
///     .build(MyGame)
///     .await?;
/// server.run().await
/// ```
pub struct MudwireServerBuilder {
    config: ServerConfig,
}

impl MudwireServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the telnet listen address.
    pub fn telnet_addr(mut self, addr: &str) -> Self {
        self.config.telnet_addr = addr.to_string();
        self
    }

    /// Enables the WebSocket listener on `addr`.
    pub fn websocket_addr(mut self, addr: &str) -> Self {
        self.config.websocket_addr = Some(addr.to_string());
        self
    }

    /// Enables the peer announcement listener on `addr`.
    pub fn peer_listen_addr(mut self, addr: &str) -> Self {
        self.config.peer_listen_addr = Some(addr.to_string());
        self
    }

    /// Binds every configured listener and starts the peer registry.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns an error if any listener fails to bind.
    pub async fn build<H: CommandHandler>(
        self,
        handler: H,
    ) -> Result<MudwireServer<H>, MudwireError> {
        let config = self.config.validated();

        let telnet = TelnetTransport::bind(&config.telnet_addr).await?;
        let websocket = match &config.websocket_addr {
            Some(addr) => Some(WebSocketTransport::bind(addr).await?),
            None => None,
        };
        let peer_socket = match &config.peer_listen_addr {
            Some(addr) => {
                let socket = UdpSocket::bind(addr).await?;
                tracing::info!(addr, "peer listener bound");
                Some(socket)
            }
            None => None,
        };

        let state = Arc::new(ServerState {
            config,
            handler,
            peers: PeerRegistry::spawn(),
        });

        Ok(MudwireServer {
            telnet,
            websocket,
            peer_socket,
            state,
        })
    }
}

impl Default for MudwireServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Mudwire server, created by [`MudwireServerBuilder::build`].
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct MudwireServer<H> {
    telnet: TelnetTransport,
    websocket: Option<WebSocketTransport>,
    peer_socket: Option<UdpSocket>,
    state: Arc<ServerState<H>>,
}

impl<H: CommandHandler> MudwireServer<H> {
    /// The telnet listener's address.
    pub fn telnet_addr(&self) -> Result<SocketAddr, MudwireError> {
        Ok(self.telnet.local_addr()?)
    }

    /// The WebSocket listener's address, if enabled.
    pub fn websocket_addr(
        &self,
    ) -> Result<Option<SocketAddr>, MudwireError> {
        match &self.websocket {
            Some(ws) => Ok(Some(ws.local_addr()?)),
            None => Ok(None),
        }
    }

    /// The peer listener's address, if enabled.
    pub fn peer_listen_addr(
        &self,
    ) -> Result<Option<SocketAddr>, MudwireError> {
        match &self.peer_socket {
            Some(socket) => Ok(Some(socket.local_addr()?)),
            None => Ok(None),
        }
    }

    /// A handle to the server's peer registry.
    pub fn peers(&self) -> PeerRegistry {
        self.state.peers.clone()
    }

    /// The validated configuration in effect.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Runs the server.
    ///
    /// Spawns the WebSocket accept loop, the peer listener and the stale
    /// peer sweep (each if enabled), then accepts telnet connections on
    /// the current task until the process is terminated.
    pub async fn run(self) -> Result<(), MudwireError> {
        tracing::info!("Mudwire server running");

        if let Some(ws) = self.websocket {
            tokio::spawn(websocket_loop(ws, Arc::clone(&self.state)));
        }
        if let Some(socket) = self.peer_socket {
            let peers = self.state.peers.clone();
            tokio::spawn(intake::run_listener(socket, peers));
        }
        if let Some(interval) = self.state.config.peer_sweep_interval() {
            tokio::spawn(sweep_loop(
                self.state.peers.clone(),
                interval,
                self.state.config.peer_staleness(),
            ));
        }

        telnet_loop(self.telnet, self.state).await;
        Ok(())
    }
}

async fn telnet_loop<H: CommandHandler>(
    mut transport: TelnetTransport,
    state: Arc<ServerState<H>>,
) {
    loop {
        match transport.accept().await {
            Ok(conn) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_telnet(conn, state).await {
                        tracing::debug!(
                            error = %e,
                            "telnet connection ended with error"
                        );
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "telnet accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn websocket_loop<H: CommandHandler>(
    mut transport: WebSocketTransport,
    state: Arc<ServerState<H>>,
) {
    loop {
        // The upgrade runs on the connection's task so a stalled client
        // can't hold up the next accept.
        match transport.accept_pending().await {
            Ok(pending) => {
                let state = Arc::clone(&state);
                let addr = pending.peer_addr();
                tokio::spawn(async move {
                    if let Err(e) = handle_websocket(pending, state).await {
                        tracing::debug!(
                            %addr,
                            error = %e,
                            "websocket connection ended with error"
                        );
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "websocket accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Expires stale peers every `interval` until the registry shuts down.
async fn sweep_loop(
    peers: PeerRegistry,
    interval: Duration,
    staleness: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match peers.expire(staleness).await {
            Ok(expired) if !expired.is_empty() => {
                tracing::debug!(count = expired.len(), "swept stale peers");
            }
            Ok(_) => {}
            Err(_) => {
                tracing::info!("peer registry gone, stopping sweep");
                return;
            }
        }
    }
}
