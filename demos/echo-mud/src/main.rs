//! A tiny MUD that echoes input and shows off clickable links.
//!
//! ```text
//! cargo run -p echo-mud -- [config.json]
//! telnet localhost 4000
//! ```
//!
//! Log level comes from `RUST_LOG` (default `info`).

use std::time::Duration;

use mudwire::prelude::*;

const ROOM: &str = "You stand in a small, echoing cave.\n\
                    Exits: {lcnorth{ltNorth{le, {lcsouth{ltSouth{le.\n\
                    Type {lchelp{lthelp{le for commands.";

const HELP: &str = "Commands: {lclook{ltlook{le, say <text>, \
                    {lcpeers{ltpeers{le, {lcmode{ltmode{le, \
                    {lcquit{ltquit{le.";

/// How recently a peer must have announced itself to be listed.
const PEER_WINDOW: Duration = Duration::from_secs(600);

struct EchoMud;

impl CommandHandler for EchoMud {
    fn greeting(&self, _ctx: &ConnectionContext) -> Vec<String> {
        vec!["Welcome to Echo MUD.".to_string(), ROOM.to_string()]
    }

    async fn handle_line(
        &self,
        ctx: &ConnectionContext,
        line: &str,
    ) -> Response {
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb.to_ascii_lowercase().as_str() {
            "" => Response::default(),
            "look" | "l" => Response::from(ROOM),
            "north" | "south" => Response::lines([
                format!("You walk {verb}, and the echo walks you back."),
                ROOM.to_string(),
            ]),
            "help" => Response::from(HELP),
            "say" => Response::from(format!("Your voice echoes: {rest}")),
            "mode" => {
                let mode = match (ctx.transport, ctx.mxp) {
                    (TransportKind::WebSocket, _) => "web client",
                    (TransportKind::Telnet, true) => "telnet with MXP links",
                    (TransportKind::Telnet, false) => "plain telnet",
                };
                Response::from(format!("You're connected over {mode}."))
            }
            "peers" => peer_listing(ctx).await,
            "quit" | "qq" => {
                Response::disconnect(["The echoes fade. Goodbye."])
            }
            _ => Response::from(format!("The cave repeats: {line}")),
        }
    }
}

async fn peer_listing(ctx: &ConnectionContext) -> Response {
    let peers = match ctx.peers.list_active(PEER_WINDOW).await {
        Ok(peers) => peers,
        Err(e) => {
            tracing::warn!(error = %e, "peer registry unavailable");
            return Response::from("The peer list is unavailable.");
        }
    };
    if peers.is_empty() {
        return Response::from("No other games have been heard from.");
    }

    let mut lines = vec![format!("{} game(s) nearby:", peers.len())];
    lines.extend(peers.into_iter().map(|peer| {
        match (peer.host, peer.port) {
            (Some(host), Some(port)) => {
                format!("  {} ({host}:{port})", peer.name)
            }
            _ => format!("  {}", peer.name),
        }
    }));
    Response::lines(lines)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn load_config() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let data = tokio::fs::read(&path).await?;
            Ok(ServerConfig::from_json(&data)?)
        }
        None => Ok(ServerConfig {
            telnet_addr: "0.0.0.0:4000".to_string(),
            websocket_addr: Some("0.0.0.0:4001".to_string()),
            peer_listen_addr: Some("0.0.0.0:4002".to_string()),
            ..ServerConfig::default()
        }),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = load_config().await?;
    let server = MudwireServerBuilder::new()
        .config(config)
        .build(EchoMud)
        .await?;
    tracing::info!(
        telnet = %server.telnet_addr()?,
        websocket = ?server.websocket_addr()?,
        peers = ?server.peer_listen_addr()?,
        "echo-mud listening"
    );

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use mudwire::transport::ConnectionId;

    use super::*;

    fn ctx(peers: PeerRegistry) -> ConnectionContext {
        ConnectionContext {
            id: ConnectionId::new(1),
            peer_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000),
            transport: TransportKind::Telnet,
            mxp: true,
            peers,
        }
    }

    #[tokio::test]
    async fn test_look_contains_links() {
        let context = ctx(PeerRegistry::spawn());
        let response = EchoMud.handle_line(&context, "look").await;
        assert_eq!(response.lines, vec![ROOM.to_string()]);
        assert!(ROOM.contains("{lcnorth{ltNorth{le"));
    }

    #[tokio::test]
    async fn test_quit_disconnects() {
        let context = ctx(PeerRegistry::spawn());
        let response = EchoMud.handle_line(&context, "QUIT").await;
        assert!(response.disconnect);
    }

    #[tokio::test]
    async fn test_mode_reports_mxp() {
        let context = ctx(PeerRegistry::spawn());
        let response = EchoMud.handle_line(&context, "mode").await;
        assert_eq!(
            response.lines,
            vec!["You're connected over telnet with MXP links.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_peers_lists_registered_games() {
        let peers = PeerRegistry::spawn();
        let context = ctx(peers.clone());

        let empty = EchoMud.handle_line(&context, "peers").await;
        assert_eq!(
            empty.lines,
            vec!["No other games have been heard from.".to_string()]
        );

        peers
            .upsert(
                PeerPacket::new()
                    .with("name", "Faraway")
                    .with("host", "far.example")
                    .with("port", "23"),
            )
            .await
            .unwrap();
        let listed = EchoMud.handle_line(&context, "peers").await;
        assert_eq!(
            listed.lines,
            vec![
                "1 game(s) nearby:".to_string(),
                "  Faraway (far.example:23)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_peers_reports_unavailable_registry() {
        let peers = PeerRegistry::spawn();
        peers.shutdown().await.unwrap();
        // Give the actor a moment to exit.
        tokio::task::yield_now().await;

        let response = EchoMud.handle_line(&ctx(peers), "peers").await;
        assert_eq!(
            response.lines,
            vec!["The peer list is unavailable.".to_string()]
        );
    }
}
