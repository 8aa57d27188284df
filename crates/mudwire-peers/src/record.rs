//! What the registry remembers about one peer.

use std::time::Duration;

use mudwire_protocol::PeerPacket;
use tokio::time::Instant;

/// A remote game server seen on the network.
///
/// Every attribute is optional because peers run all sorts of software
/// and send whatever subset they feel like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Unique key.
    pub name: String,
    pub version_id: Option<String>,
    pub network_name: Option<String>,
    pub url: Option<String>,
    pub host: Option<String>,
    /// `None` if absent or not a valid port number.
    pub port: Option<u16>,
    pub fingerprint: Option<String>,
    /// When the latest announcement arrived.
    pub last_seen: Instant,
}

impl PeerRecord {
    /// Builds a record from an announcement. Returns `None` if the packet
    /// doesn't say who it's from.
    pub fn from_packet(packet: &PeerPacket, now: Instant) -> Option<Self> {
        let name = packet.identity()?.to_string();
        let owned = |key: &str| packet.get_trimmed(key).map(str::to_string);

        Some(Self {
            name,
            version_id: owned("versionid"),
            network_name: owned("networkname"),
            url: owned("url"),
            host: owned("host"),
            port: packet.get_trimmed("port").and_then(|p| p.parse().ok()),
            fingerprint: owned("fingerprint").or_else(|| owned("sha256")),
            last_seen: now,
        })
    }

    /// Time since the last announcement, as of `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    /// `true` if the peer announced itself within `threshold` of `now`.
    pub fn is_active(&self, threshold: Duration, now: Instant) -> bool {
        self.age(now) <= threshold
    }
}
