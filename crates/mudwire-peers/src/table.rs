//! The peer table: a plain map from peer name to [`PeerRecord`].
//!
//! `PeerTable` is not thread-safe on its own. The
//! [`PeerRegistry`](crate::PeerRegistry) actor owns one and applies every
//! mutation in turn; use the table directly only where a single owner is
//! guaranteed (tests, tools).

use std::collections::HashMap;
use std::time::Duration;

use mudwire_protocol::PeerPacket;
use tokio::time::Instant;

use crate::PeerRecord;

/// All known peers, keyed by name.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<String, PeerRecord>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an announcement: inserts the peer, or replaces every
    /// attribute of an existing one, and stamps `last_seen`.
    ///
    /// Packets without an identity are dropped. Returns `true` if the
    /// packet was applied.
    pub fn upsert(&mut self, packet: &PeerPacket) -> bool {
        self.upsert_at(packet, Instant::now())
    }

    pub(crate) fn upsert_at(
        &mut self,
        packet: &PeerPacket,
        now: Instant,
    ) -> bool {
        let Some(record) = PeerRecord::from_packet(packet, now) else {
            tracing::debug!(
                fields = packet.len(),
                "announcement without identity dropped"
            );
            return false;
        };

        let name = record.name.clone();
        match self.peers.insert(name.clone(), record) {
            None => tracing::info!(peer = %name, "peer joined"),
            Some(_) => tracing::trace!(peer = %name, "peer refreshed"),
        }
        true
    }

    /// Applies a departure: removes the named peer if present.
    ///
    /// Returns `true` if a record was removed. Removing an unknown peer,
    /// or sending a packet with no identity, does nothing.
    pub fn remove(&mut self, packet: &PeerPacket) -> bool {
        let Some(name) = packet.identity() else {
            tracing::debug!(
                fields = packet.len(),
                "departure without identity dropped"
            );
            return false;
        };
        let removed = self.peers.remove(name).is_some();
        if removed {
            tracing::info!(peer = %name, "peer left");
        }
        removed
    }

    /// Peers that announced themselves within `threshold`, in no
    /// particular order.
    pub fn list_active(&self, threshold: Duration) -> Vec<PeerRecord> {
        let now = Instant::now();
        self.peers
            .values()
            .filter(|record| record.is_active(threshold, now))
            .cloned()
            .collect()
    }

    /// Removes every peer older than `threshold` and returns their names.
    pub fn expire(&mut self, threshold: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut expired = Vec::new();

        self.peers.retain(|name, record| {
            if record.is_active(threshold, now) {
                true
            } else {
                expired.push(name.clone());
                false
            }
        });

        for name in &expired {
            tracing::info!(peer = %name, "peer expired");
        }
        expired
    }

    /// Looks up a peer by name, stale or not.
    pub fn get(&self, name: &str) -> Option<&PeerRecord> {
        self.peers.get(name)
    }

    /// Number of peers, stale or not.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn announce(name: &str) -> PeerPacket {
        PeerPacket::new()
            .with("name", name)
            .with("host", "h")
            .with("port", "4000")
    }

    #[test]
    fn test_upsert_then_list_active_returns_record() {
        let mut table = PeerTable::new();
        assert!(table.upsert(&announce("Foo")));

        let active = table.list_active(HOUR);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Foo");
        assert_eq!(active[0].host.as_deref(), Some("h"));
        assert_eq!(active[0].port, Some(4000));
    }

    #[test]
    fn test_upsert_same_name_updates_instead_of_duplicating() {
        let mut table = PeerTable::new();
        table.upsert(&announce("Foo"));
        table.upsert(
            &PeerPacket::new().with("name", "Foo").with("port", "5000"),
        );

        assert_eq!(table.len(), 1);
        let record = table.get("Foo").unwrap();
        assert_eq!(record.port, Some(5000));
        // Overwrite, not merge: the host from the first packet is gone.
        assert_eq!(record.host, None);
    }

    #[test]
    fn test_upsert_without_identity_is_dropped() {
        let mut table = PeerTable::new();
        assert!(!table.upsert(&PeerPacket::new().with("host", "h")));
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_deletes_record() {
        let mut table = PeerTable::new();
        table.upsert(&announce("Foo"));

        assert!(table.remove(&PeerPacket::new().with("name", "Foo")));
        assert!(table.list_active(HOUR).is_empty());
    }

    #[test]
    fn test_remove_unknown_or_anonymous_is_noop() {
        let mut table = PeerTable::new();
        table.upsert(&announce("Foo"));

        assert!(!table.remove(&PeerPacket::new().with("name", "Bar")));
        assert!(!table.remove(&PeerPacket::new()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_matches_origin_identity() {
        let mut table = PeerTable::new();
        table.upsert(&announce("Foo"));
        assert!(table.remove(&PeerPacket::new().with("origin", "Foo")));
    }

    #[test]
    fn test_list_active_and_expire_respect_threshold() {
        let mut table = PeerTable::new();
        let now = Instant::now();
        table.upsert_at(&announce("Old"), now - Duration::from_secs(120));
        table.upsert_at(&announce("New"), now);

        let active: Vec<_> = table
            .list_active(Duration::from_secs(60))
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(active, vec!["New".to_string()]);
        // Stale records are still there until expired.
        assert_eq!(table.len(), 2);

        let expired = table.expire(Duration::from_secs(60));
        assert_eq!(expired, vec!["Old".to_string()]);
        assert_eq!(table.len(), 1);
        assert!(table.get("Old").is_none());
    }
}
