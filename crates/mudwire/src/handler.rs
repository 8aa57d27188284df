//! Per-connection handlers: negotiation, line input, rendered output.
//!
//! Each accepted connection gets its own Tokio task running one of these.
//! The telnet flow is:
//!   1. Start a writer task fed by an unbounded byte channel
//!   2. Offer the configured extensions (the negotiator writes to the
//!      same channel)
//!   3. Loop: take telnet events from the framed reader, feed replies to
//!      the negotiator, split data into lines, pass each line to the
//!      [`CommandHandler`], render what it returns for this connection
//!
//! WebSocket clients skip negotiation and always get the plain path with
//! entity escaping, since the browser renders HTML.

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use mudwire_peers::PeerRegistry;
use mudwire_protocol::telnet::{self, TelnetCommand, TelnetEvent, TelnetVerb};
use mudwire_protocol::{LineCodec, MarkupConfig, render};
use mudwire_session::{MXP, Session};
use mudwire_transport::{
    Connection, ConnectionId, PendingWebSocket, TelnetConnection,
    WebSocketConnection,
};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

use crate::MudwireError;
use crate::server::ServerState;

/// How long to wait for queued output to flush when a connection ends.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a browser gets to finish the WebSocket upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Which transport a connection arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Telnet,
    WebSocket,
}

/// What a command handler knows about the connection it's serving.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub transport: TransportKind,
    /// Whether this connection currently receives MXP links.
    pub mxp: bool,
    /// The process-wide peer registry.
    pub peers: PeerRegistry,
}

/// Text to send back for one input line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Lines of game text, which may contain link markup.
    pub lines: Vec<String>,
    /// Close the connection after sending `lines`.
    pub disconnect: bool,
}

impl Response {
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            disconnect: false,
        }
    }

    /// Sends `lines`, then hangs up.
    pub fn disconnect<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disconnect: true,
            ..Self::lines(lines)
        }
    }
}

impl From<String> for Response {
    fn from(line: String) -> Self {
        Self::lines([line])
    }
}

impl From<&str> for Response {
    fn from(line: &str) -> Self {
        Self::lines([line])
    }
}

/// The game's command layer.
///
/// The server handles the wire; the implementor decides what each input
/// line means. Output may contain link markup in the configured
/// grammar and is rendered per connection.
pub trait CommandHandler: Send + Sync + 'static {
    /// Text sent when a client connects, before any input.
    fn greeting(&self, ctx: &ConnectionContext) -> Vec<String> {
        let _ = ctx;
        Vec::new()
    }

    /// Handles one line of input, already stripped of its line ending
    /// and surrounding whitespace.
    fn handle_line(
        &self,
        ctx: &ConnectionContext,
        line: &str,
    ) -> impl Future<Output = Response> + Send;
}

// ---------------------------------------------------------------------------
// Output encoding
// ---------------------------------------------------------------------------

/// Turns rendered text into telnet output: one line, `\r\n` line endings,
/// IAC bytes doubled.
fn telnet_line(rendered: &str) -> Vec<u8> {
    let mut text = String::with_capacity(rendered.len() + 2);
    let mut prev_cr = false;
    for c in rendered.chars() {
        if c == '\n' && !prev_cr {
            text.push('\r');
        }
        prev_cr = c == '\r';
        text.push(c);
    }
    text.push_str("\r\n");
    telnet::escape_iac(text.as_bytes())
}

/// Waits for the next frame, or `None` if the idle timeout hits first.
async fn recv_or_idle<C: Connection>(
    conn: &C,
    idle: Option<Duration>,
) -> Option<Result<Option<C::Frame>, C::Error>> {
    match idle {
        Some(limit) => tokio::time::timeout(limit, conn.recv()).await.ok(),
        None => Some(conn.recv().await),
    }
}

// ---------------------------------------------------------------------------
// Telnet
// ---------------------------------------------------------------------------

/// Handles a single telnet connection from accept to close.
pub(crate) async fn handle_telnet<H: CommandHandler>(
    conn: TelnetConnection,
    state: Arc<ServerState<H>>,
) -> Result<(), MudwireError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let config = &state.config;
    tracing::info!(
        %conn_id,
        addr = %conn.peer_addr(),
        "telnet client connected"
    );

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            while let Some(bytes) = out_rx.recv().await {
                if let Err(e) = conn.send(&bytes).await {
                    tracing::debug!(%conn_id, error = %e, "send failed");
                    break;
                }
            }
        })
    };

    let session = Session::new(
        conn_id,
        &config.negotiation,
        config.markup,
        out_tx.clone(),
    );
    offer_extensions(&session, &config.offer, &out_tx);

    let mut ctx = ConnectionContext {
        id: conn_id,
        peer_addr: conn.peer_addr(),
        transport: TransportKind::Telnet,
        mxp: false,
        peers: state.peers.clone(),
    };
    for line in state.handler.greeting(&ctx) {
        let _ = out_tx.send(telnet_line(&session.render(&line)));
    }

    let mut input = BytesMut::new();
    let mut lines = LineCodec::new();
    let mut refused = HashSet::new();

    'read: loop {
        let idle = config.idle_timeout();
        let event = match recv_or_idle(conn.as_ref(), idle).await {
            Some(Ok(Some(event))) => event,
            Some(Ok(None)) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Some(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            None => {
                tracing::info!(%conn_id, "connection idle, closing");
                break;
            }
        };

        match event {
            TelnetEvent::Data(bytes) => input.extend_from_slice(&bytes),
            TelnetEvent::Command(cmd) => {
                if !session.negotiator().handle_command(cmd) {
                    refuse_once(cmd, &mut refused, &out_tx);
                }
                continue;
            }
            TelnetEvent::Subnegotiation { option, data } => {
                tracing::debug!(
                    %conn_id,
                    option,
                    len = data.len(),
                    "ignoring subnegotiation"
                );
                continue;
            }
        }

        while let Some(line) = lines.decode(&mut input)? {
            ctx.mxp = session.negotiator().is_capable(MXP);
            let response = state.handler.handle_line(&ctx, line.trim()).await;
            for line in &response.lines {
                let _ = out_tx.send(telnet_line(&session.render(line)));
            }
            if response.disconnect {
                tracing::info!(%conn_id, "handler closed connection");
                break 'read;
            }
        }
    }

    // Settle anything still pending, then let the writer drain.
    session.close();
    drop(session);
    drop(out_tx);
    if tokio::time::timeout(FLUSH_TIMEOUT, writer).await.is_err() {
        tracing::debug!(%conn_id, "output flush timed out");
    }
    conn.close().await?;
    Ok(())
}

/// Offers each configured extension. Granting MXP switches the client
/// into MXP mode with an empty subnegotiation.
fn offer_extensions(
    session: &Session,
    offer: &[String],
    out_tx: &mpsc::UnboundedSender<Vec<u8>>,
) {
    let negotiator = session.negotiator();
    for name in offer {
        let tx = out_tx.clone();
        let option = negotiator.option(name);
        let is_mxp = name == MXP;
        let result = negotiator.negotiate(name, move |granted| {
            if let (true, true, Some(option)) = (granted, is_mxp, option) {
                let _ = tx.send(telnet::subnegotiation(option, &[]));
            }
        });
        if let Err(e) = result {
            tracing::debug!(
                conn = %session.conn(),
                error = %e,
                "offer skipped"
            );
        }
    }
}

/// Refuses a client request for an option this server doesn't handle,
/// once per option and direction.
fn refuse_once(
    cmd: TelnetCommand,
    refused: &mut HashSet<(TelnetVerb, u8)>,
    out_tx: &mpsc::UnboundedSender<Vec<u8>>,
) {
    let answer = match cmd.verb {
        TelnetVerb::Do => TelnetVerb::Wont,
        TelnetVerb::Will => TelnetVerb::Dont,
        // Already off on both sides.
        TelnetVerb::Wont | TelnetVerb::Dont => return,
    };
    if refused.insert((cmd.verb, cmd.option)) {
        tracing::debug!(
            option = cmd.option,
            verb = ?cmd.verb,
            "refusing option"
        );
        let reply = TelnetCommand::new(answer, cmd.option).to_bytes();
        let _ = out_tx.send(reply.to_vec());
    }
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Upgrades a pending WebSocket, then serves it until close.
pub(crate) async fn handle_websocket<H: CommandHandler>(
    pending: PendingWebSocket,
    state: Arc<ServerState<H>>,
) -> Result<(), MudwireError> {
    let conn = pending.upgrade(HANDSHAKE_TIMEOUT).await?;
    serve_websocket(conn, state).await
}

async fn serve_websocket<H: CommandHandler>(
    conn: WebSocketConnection,
    state: Arc<ServerState<H>>,
) -> Result<(), MudwireError> {
    let conn_id = conn.id();
    let config = &state.config;
    let markup = MarkupConfig {
        escape_entities: true,
        ..config.markup
    };
    tracing::info!(
        %conn_id,
        addr = %conn.peer_addr(),
        "websocket client connected"
    );

    let ctx = ConnectionContext {
        id: conn_id,
        peer_addr: conn.peer_addr(),
        transport: TransportKind::WebSocket,
        mxp: false,
        peers: state.peers.clone(),
    };
    for line in state.handler.greeting(&ctx) {
        conn.send(render(&line, false, &markup).as_bytes()).await?;
    }

    'read: loop {
        let data = match recv_or_idle(&conn, config.idle_timeout()).await {
            Some(Ok(Some(data))) => data,
            Some(Ok(None)) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Some(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            None => {
                tracing::info!(%conn_id, "connection idle, closing");
                break;
            }
        };

        // One message may carry several lines; the last needs no ending.
        let mut input = BytesMut::from(&data[..]);
        let mut lines = LineCodec::new();
        while let Some(line) = lines.decode_eof(&mut input)? {
            let response = state.handler.handle_line(&ctx, line.trim()).await;
            for line in &response.lines {
                conn.send(render(line, false, &markup).as_bytes()).await?;
            }
            if response.disconnect {
                tracing::info!(%conn_id, "handler closed connection");
                break 'read;
            }
        }
    }

    conn.close().await?;
    Ok(())
}
