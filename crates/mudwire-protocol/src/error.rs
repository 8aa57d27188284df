//! Error types for the protocol layer.
//!
//! Most protocol failure modes never reach this type: malformed markup
//! falls back to literal text and injected escape bytes are stripped by
//! the encoder. What remains are packet decode failures, which callers
//! usually log and drop, and I/O errors surfaced through the stream
//! codecs.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, a packet that isn't a JSON object,
    /// or a field holding a nested array/object.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A `key=value` packet line could not be parsed.
    ///
    /// Raised for tokens without `=`, empty keys, and unterminated quotes.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// The stream under a [`Decoder`](tokio_util::codec::Decoder) failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
