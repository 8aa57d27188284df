//! Peer announcement intake: turns datagrams into registry updates.
//!
//! A datagram is one packet, either a JSON object or a `key=value` line.
//! Its `type` field says what happened:
//!
//! | `type` | effect |
//! |---|---|
//! | `is-alive`, `announce`, or absent | upsert |
//! | `close-notify`, `depart` | remove |

use std::time::Duration;

use mudwire_peers::PeerRegistry;
use mudwire_protocol::{Codec, JsonCodec, PeerPacket, ProtocolError};
use tokio::net::UdpSocket;

use crate::MudwireError;

/// Largest datagram read.
const MAX_DATAGRAM: usize = 8 * 1024;

/// Pause after a failed receive before trying again.
const RECV_BACKOFF: Duration = Duration::from_millis(100);

/// What a packet asks the registry to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Announce,
    Depart,
}

/// Decodes one datagram.
///
/// # Errors
/// Returns [`ProtocolError`] for malformed JSON, a malformed line, non
/// UTF-8 line input, or an unrecognized `type`.
pub fn decode_datagram(
    data: &[u8],
) -> Result<(PacketKind, PeerPacket), ProtocolError> {
    let packet = if data.trim_ascii_start().starts_with(b"{") {
        JsonCodec.decode::<PeerPacket>(data)?
    } else {
        let line = std::str::from_utf8(data).map_err(|_| {
            ProtocolError::InvalidPacket("packet is not UTF-8".into())
        })?;
        PeerPacket::parse_kv(line.trim())?
    };

    let kind = match packet.get_trimmed("type") {
        None | Some("is-alive") | Some("announce") => PacketKind::Announce,
        Some("close-notify") | Some("depart") => PacketKind::Depart,
        Some(other) => {
            return Err(ProtocolError::InvalidPacket(format!(
                "unknown packet type {other:?}"
            )));
        }
    };
    Ok((kind, packet))
}

/// Decodes a datagram and applies it to the registry. Garbled packets are
/// logged and dropped.
///
/// # Errors
/// Returns [`MudwireError::Peer`] only if the registry has shut down.
pub async fn apply_datagram(
    registry: &PeerRegistry,
    data: &[u8],
) -> Result<(), MudwireError> {
    match decode_datagram(data) {
        Ok((PacketKind::Announce, packet)) => {
            registry.upsert(packet).await?;
        }
        Ok((PacketKind::Depart, packet)) => {
            registry.remove(packet).await?;
        }
        Err(e) => {
            tracing::debug!(
                error = %e,
                len = data.len(),
                "peer packet dropped"
            );
        }
    }
    Ok(())
}

/// Receives announcement datagrams until the registry shuts down.
pub(crate) async fn run_listener(socket: UdpSocket, registry: PeerRegistry) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::debug!(error = %e, "peer socket recv failed");
                tokio::time::sleep(RECV_BACKOFF).await;
                continue;
            }
        };
        tracing::trace!(%from, len = n, "peer datagram");
        if apply_datagram(&registry, &buf[..n]).await.is_err() {
            tracing::info!("peer registry gone, stopping peer listener");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_announcement() {
        let (kind, packet) =
            decode_datagram(br#" {"name": "Foo", "port": 4000}"#).unwrap();
        assert_eq!(kind, PacketKind::Announce);
        assert_eq!(packet.get("port"), Some("4000"));
    }

    #[test]
    fn test_decode_kv_departure() {
        let (kind, packet) =
            decode_datagram(b"type=close-notify origin=Foo\n").unwrap();
        assert_eq!(kind, PacketKind::Depart);
        assert_eq!(packet.identity(), Some("Foo"));
    }

    #[test]
    fn test_decode_rejects_unknown_type_and_garbage() {
        assert!(decode_datagram(b"type=who name=Foo").is_err());
        assert!(decode_datagram(b"{not json").is_err());
        assert!(decode_datagram(&[0xFF, 0xFE]).is_err());
    }

    #[tokio::test]
    async fn test_apply_datagram_announce_then_depart() {
        let registry = PeerRegistry::spawn();
        let hour = Duration::from_secs(3600);

        apply_datagram(&registry, br#"{"name":"Foo","host":"h"}"#)
            .await
            .unwrap();
        assert_eq!(registry.list_active(hour).await.unwrap().len(), 1);

        apply_datagram(&registry, b"type=depart name=Foo").await.unwrap();
        assert!(registry.list_active(hour).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_datagram_drops_garbage_without_error() {
        let registry = PeerRegistry::spawn();
        apply_datagram(&registry, b"nonsense").await.unwrap();
        assert!(registry.get("nonsense").await.unwrap().is_none());
    }
}
