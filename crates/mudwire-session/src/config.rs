//! Negotiation settings: which extensions exist, what option code each
//! uses on the wire, and how long to wait for a client to answer.

use std::collections::HashSet;
use std::time::Duration;

use mudwire_protocol::telnet::OPT_MXP;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Name of the MUD eXtension Protocol in the extension table.
pub const MXP: &str = "MXP";

/// A negotiable telnet extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    /// Name used by callers (`negotiate("MXP", ..)`).
    pub name: String,
    /// Telnet option code offered with `IAC WILL <option>`.
    pub option: u8,
}

impl Extension {
    pub fn new(name: impl Into<String>, option: u8) -> Self {
        Self {
            name: name.into(),
            option,
        }
    }

    /// MXP on its standard option code, 91.
    pub fn mxp() -> Self {
        Self::new(MXP, OPT_MXP)
    }
}

/// Configuration for capability negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Seconds to wait for a reply to an offer before treating the
    /// extension as denied.
    ///
    /// Default: 5 seconds. Minimum: 1 second.
    pub timeout_secs: u64,

    /// Extensions that can be negotiated, with their option codes.
    ///
    /// Default: just MXP on option 91.
    pub extensions: Vec<Extension>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            extensions: vec![Extension::mxp()],
        }
    }
}

impl NegotiationConfig {
    /// Shortest allowed reply timeout.
    pub const MIN_TIMEOUT_SECS: u64 = 1;

    /// Fixes any out-of-range values so the config is safe to use.
    ///
    /// - `timeout_secs` raised to [`Self::MIN_TIMEOUT_SECS`].
    /// - Extensions repeating an earlier name or option code are dropped;
    ///   the first entry wins.
    pub fn validated(mut self) -> Self {
        if self.timeout_secs < Self::MIN_TIMEOUT_SECS {
            warn!(
                timeout_secs = self.timeout_secs,
                min = Self::MIN_TIMEOUT_SECS,
                "negotiation timeout below minimum, clamping"
            );
            self.timeout_secs = Self::MIN_TIMEOUT_SECS;
        }

        let mut names = HashSet::new();
        let mut options = HashSet::new();
        self.extensions.retain(|ext| {
            let keep =
                names.insert(ext.name.clone()) && options.insert(ext.option);
            if !keep {
                warn!(
                    extension = %ext.name,
                    option = ext.option,
                    "duplicate extension entry, ignoring"
                );
            }
            keep
        });
        self
    }

    /// The reply timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Looks up an extension by name.
    pub fn extension(&self, name: &str) -> Option<&Extension> {
        self.extensions.iter().find(|ext| ext.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_offers_mxp_on_91() {
        let cfg = NegotiationConfig::default();
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.extension(MXP).map(|e| e.option), Some(91));
    }

    #[test]
    fn test_validated_clamps_zero_timeout() {
        let cfg = NegotiationConfig {
            timeout_secs: 0,
            ..Default::default()
        }
        .validated();
        assert_eq!(cfg.timeout_secs, NegotiationConfig::MIN_TIMEOUT_SECS);
    }

    #[test]
    fn test_validated_drops_duplicate_names_and_options() {
        let cfg = NegotiationConfig {
            timeout_secs: 5,
            extensions: vec![
                Extension::mxp(),
                Extension::new(MXP, 200),
                Extension::new("MSP", 91),
                Extension::new("GMCP", 201),
            ],
        }
        .validated();

        let names: Vec<_> =
            cfg.extensions.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["MXP", "GMCP"]);
    }

    #[test]
    fn test_config_deserializes_with_missing_fields() {
        let cfg: NegotiationConfig =
            serde_json::from_str(r#"{"timeout_secs": 2}"#).unwrap();
        assert_eq!(cfg.timeout_secs, 2);
        assert_eq!(cfg.extensions, vec![Extension::mxp()]);
    }
}
