//! Server configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! {
//!     "telnet_addr": "0.0.0.0:4000",
//!     "websocket_addr": "0.0.0.0:4001",
//!     "negotiation": { "timeout_secs": 3 },
//!     "markup": { "syntax": "wiki" }
//! }
//! ```

use std::collections::HashSet;
use std::time::Duration;

use mudwire_protocol::MarkupConfig;
use mudwire_session::{MXP, NegotiationConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::MudwireError;

/// Configuration for a [`MudwireServer`](crate::MudwireServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Where telnet clients connect.
    pub telnet_addr: String,

    /// Where the browser client connects. `None` disables WebSocket.
    pub websocket_addr: Option<String>,

    /// UDP address for peer announcement datagrams. `None` disables the
    /// listener; announcements can still be fed in through
    /// [`MudwireServer::peers`](crate::MudwireServer::peers).
    pub peer_listen_addr: Option<String>,

    /// Extension table and reply timeout.
    pub negotiation: NegotiationConfig,

    /// Link grammar and plain-path escaping for telnet output.
    pub markup: MarkupConfig,

    /// Extensions offered to every telnet client on connect.
    pub offer: Vec<String>,

    /// Peers silent for longer than this are considered gone.
    pub peer_staleness_secs: u64,

    /// How often stale peers are swept out. 0 disables sweeping.
    pub peer_sweep_secs: u64,

    /// Close a connection after this many seconds without input.
    /// 0 disables the idle timeout.
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            telnet_addr: "127.0.0.1:4000".to_string(),
            websocket_addr: None,
            peer_listen_addr: None,
            negotiation: NegotiationConfig::default(),
            markup: MarkupConfig::default(),
            offer: vec![MXP.to_string()],
            peer_staleness_secs: 600,
            peer_sweep_secs: 60,
            idle_timeout_secs: 0,
        }
    }
}

impl ServerConfig {
    /// Parses a JSON config file. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns [`MudwireError::Config`] if the JSON is malformed or a
    /// field has the wrong type.
    pub fn from_json(data: &[u8]) -> Result<Self, MudwireError> {
        let config: Self = serde_json::from_slice(data)?;
        Ok(config.validated())
    }

    /// Fixes any out-of-range values so the config is safe to use.
    ///
    /// - The negotiation table is validated (see
    ///   [`NegotiationConfig::validated`]).
    /// - Offered extensions missing from the table, and repeats, are
    ///   dropped.
    /// - `peer_staleness_secs` is raised to at least 1.
    pub fn validated(mut self) -> Self {
        self.negotiation = self.negotiation.validated();

        let negotiation = &self.negotiation;
        let mut seen = HashSet::new();
        self.offer.retain(|name| {
            if negotiation.extension(name).is_none() {
                warn!(
                    extension = %name,
                    "offered extension not in table, ignoring"
                );
                return false;
            }
            if !seen.insert(name.clone()) {
                warn!(
                    extension = %name,
                    "extension offered twice, ignoring repeat"
                );
                return false;
            }
            true
        });

        if self.peer_staleness_secs == 0 {
            warn!("peer_staleness_secs is 0, clamping to 1");
            self.peer_staleness_secs = 1;
        }
        self
    }

    pub fn peer_staleness(&self) -> Duration {
        Duration::from_secs(self.peer_staleness_secs)
    }

    /// `None` when sweeping is disabled.
    pub fn peer_sweep_interval(&self) -> Option<Duration> {
        (self.peer_sweep_secs > 0)
            .then(|| Duration::from_secs(self.peer_sweep_secs))
    }

    /// `None` when the idle timeout is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use mudwire_protocol::LinkSyntax;
    use mudwire_session::Extension;

    use super::*;

    #[test]
    fn test_default_config_offers_mxp() {
        let config = ServerConfig::default();
        assert_eq!(config.offer, vec!["MXP".to_string()]);
        assert_eq!(config.websocket_addr, None);
        assert_eq!(config.idle_timeout(), None);
        assert_eq!(config.peer_sweep_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = ServerConfig::from_json(
            br#"{"telnet_addr": "0.0.0.0:5000", "markup": {"syntax": "wiki"}}"#,
        )
        .unwrap();

        assert_eq!(config.telnet_addr, "0.0.0.0:5000");
        assert_eq!(config.markup.syntax, LinkSyntax::Wiki);
        assert!(!config.markup.escape_entities);
        assert_eq!(config.negotiation, NegotiationConfig::default());
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        let result =
            ServerConfig::from_json(br#"{"peer_sweep_secs": "often"}"#);
        assert!(matches!(result, Err(MudwireError::Config(_))));
    }

    #[test]
    fn test_validated_drops_unknown_offers() {
        let config = ServerConfig {
            offer: vec!["MXP".into(), "GMCP".into()],
            ..Default::default()
        }
        .validated();
        assert_eq!(config.offer, vec!["MXP".to_string()]);
    }

    #[test]
    fn test_validated_drops_repeated_offers_anywhere_in_list() {
        let config = ServerConfig {
            negotiation: NegotiationConfig {
                extensions: vec![Extension::mxp(), Extension::new("GMCP", 201)],
                ..Default::default()
            },
            offer: vec!["MXP".into(), "GMCP".into(), "MXP".into()],
            ..Default::default()
        }
        .validated();
        assert_eq!(config.offer, vec!["MXP".to_string(), "GMCP".to_string()]);
    }

    #[test]
    fn test_validated_keeps_offers_for_custom_extensions() {
        let config = ServerConfig {
            negotiation: NegotiationConfig {
                timeout_secs: 0,
                extensions: vec![Extension::mxp(), Extension::new("GMCP", 201)],
            },
            offer: vec!["GMCP".into(), "MXP".into()],
            peer_staleness_secs: 0,
            ..Default::default()
        }
        .validated();

        assert_eq!(config.offer.len(), 2);
        assert_eq!(config.negotiation.timeout_secs, 1);
        assert_eq!(config.peer_staleness(), Duration::from_secs(1));
    }
}
