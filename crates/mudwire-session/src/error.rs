//! Error types for the session layer.

/// Errors that can occur while driving a connection's negotiation.
///
/// Negotiation outcomes themselves (timeouts, refusals, the connection
/// closing early) are never errors; they resolve the extension as denied.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The extension isn't in the negotiation table, so there is no
    /// option code to offer.
    #[error("unknown extension: {0}")]
    UnknownExtension(String),
}
