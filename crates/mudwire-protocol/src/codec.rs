//! Codec trait and implementations for serializing/deserializing packets.
//!
//! Peer announcements arrive as bytes from whatever carries them (a UDP
//! broadcast, a relay connection, a test harness). The registry doesn't
//! care how they were serialized; it needs something that implements
//! [`Codec`] to turn those bytes into a [`PeerPacket`](crate::PeerPacket).
//!
//! [`JsonCodec`] is the only implementation today. The `key=value` line
//! format is handled by [`PeerPacket::parse_kv`](crate::PeerPacket::parse_kv)
//! because it only ever produces one type.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a single codec instance is shared by
/// every connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use mudwire_protocol::{Codec, JsonCodec, PeerPacket};
///
/// let codec = JsonCodec;
/// let packet: PeerPacket = codec
///     .decode(br#"{"name": "Foo", "host": "mud.example.org", "port": 4000}"#)
///     .unwrap();
///
/// assert_eq!(packet.identity(), Some("Foo"));
/// assert_eq!(packet.get("port"), Some("4000"));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::PeerPacket;

    #[test]
    fn test_json_codec_decodes_packet_with_numeric_port() {
        let packet: PeerPacket = JsonCodec
            .decode(br#"{"name":"Foo","port":4000,"url":null}"#)
            .expect("should decode");

        assert_eq!(packet.get("port"), Some("4000"));
        // Null fields are treated as absent.
        assert_eq!(packet.get("url"), None);
    }

    #[test]
    fn test_json_codec_rejects_non_object_packet() {
        let result: Result<PeerPacket, _> = JsonCodec.decode(b"[1, 2, 3]");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_encodes_packet_as_string_map() {
        let packet = PeerPacket::new().with("name", "Foo").with("port", "4000");
        let bytes = JsonCodec.encode(&packet).expect("should encode");
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).expect("valid json");

        assert_eq!(value["name"], "Foo");
        assert_eq!(value["port"], "4000");
    }
}
