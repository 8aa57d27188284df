//! Error types for the peer registry.

/// Errors returned by [`PeerRegistry`](crate::PeerRegistry) handles.
///
/// Bad packets are not errors; the registry drops them.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// The registry actor has shut down, or stopped before replying.
    #[error("peer registry is unavailable")]
    Unavailable,
}
