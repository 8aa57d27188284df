//! Unified error type for the Mudwire framework.

use mudwire_peers::PeerError;
use mudwire_protocol::ProtocolError;
use mudwire_session::SessionError;
use mudwire_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates a `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum MudwireError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (packet decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (unknown extension).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The peer registry has shut down.
    #[error(transparent)]
    Peer(#[from] PeerError),

    /// A config file couldn't be parsed.
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    /// Socket setup outside the transports (the peer UDP listener).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::SendFailed(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "gone",
        ));
        let mudwire_err: MudwireError = err.into();
        assert!(matches!(mudwire_err, MudwireError::Transport(_)));
        assert!(mudwire_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidPacket("bad".into());
        let mudwire_err: MudwireError = err.into();
        assert!(matches!(mudwire_err, MudwireError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::UnknownExtension("GMCP".into());
        let mudwire_err: MudwireError = err.into();
        assert!(matches!(mudwire_err, MudwireError::Session(_)));
        assert!(mudwire_err.to_string().contains("GMCP"));
    }

    #[test]
    fn test_from_peer_error() {
        let mudwire_err: MudwireError = PeerError::Unavailable.into();
        assert!(matches!(mudwire_err, MudwireError::Peer(_)));
    }
}
