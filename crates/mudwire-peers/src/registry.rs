//! Registry actor: one Tokio task owns the [`PeerTable`] and applies
//! requests from every connection in the order they arrive.
//!
//! Announcements from many peers can land at once; routing them through
//! a single task means no reader ever sees half of an update.

use std::time::Duration;

use mudwire_protocol::PeerPacket;
use tokio::sync::{mpsc, oneshot};

use crate::{PeerError, PeerRecord, PeerTable};

/// Default command channel capacity for [`PeerRegistry::spawn`].
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Commands sent to the registry actor.
///
/// Each variant carries a `oneshot::Sender` reply channel so the caller
/// can await the result.
enum RegistryCommand {
    Upsert {
        packet: PeerPacket,
        reply: oneshot::Sender<bool>,
    },
    Remove {
        packet: PeerPacket,
        reply: oneshot::Sender<bool>,
    },
    ListActive {
        threshold: Duration,
        reply: oneshot::Sender<Vec<PeerRecord>>,
    },
    Expire {
        threshold: Duration,
        reply: oneshot::Sender<Vec<String>>,
    },
    Get {
        name: String,
        reply: oneshot::Sender<Option<PeerRecord>>,
    },
    Shutdown,
}

/// Handle to the running peer registry.
///
/// Cheap to clone; every connection that needs the registry gets its own
/// copy. The actor stops after [`shutdown`](Self::shutdown) or once every
/// handle is dropped.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    sender: mpsc::Sender<RegistryCommand>,
}

impl PeerRegistry {
    /// Starts an empty registry. Must be called from within a Tokio
    /// runtime.
    pub fn spawn() -> Self {
        Self::spawn_with_capacity(DEFAULT_CHANNEL_SIZE)
    }

    /// Starts an empty registry with a custom command channel size.
    /// Senders wait when the channel is full.
    pub fn spawn_with_capacity(channel_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(channel_size.max(1));
        let actor = RegistryActor {
            table: PeerTable::new(),
            receiver: rx,
        };
        tokio::spawn(actor.run());
        Self { sender: tx }
    }

    /// Applies an announcement packet. Returns `false` if the packet was
    /// dropped for lacking an identity.
    pub async fn upsert(&self, packet: PeerPacket) -> Result<bool, PeerError> {
        self.request(|reply| RegistryCommand::Upsert { packet, reply })
            .await
    }

    /// Applies a departure packet. Returns `true` if a peer was removed.
    pub async fn remove(&self, packet: PeerPacket) -> Result<bool, PeerError> {
        self.request(|reply| RegistryCommand::Remove { packet, reply })
            .await
    }

    /// Peers seen within `threshold`.
    pub async fn list_active(
        &self,
        threshold: Duration,
    ) -> Result<Vec<PeerRecord>, PeerError> {
        self.request(|reply| RegistryCommand::ListActive { threshold, reply })
            .await
    }

    /// Drops peers not seen within `threshold` and returns their names.
    pub async fn expire(
        &self,
        threshold: Duration,
    ) -> Result<Vec<String>, PeerError> {
        self.request(|reply| RegistryCommand::Expire { threshold, reply })
            .await
    }

    /// Looks up one peer by name.
    pub async fn get(
        &self,
        name: &str,
    ) -> Result<Option<PeerRecord>, PeerError> {
        let name = name.to_string();
        self.request(|reply| RegistryCommand::Get { name, reply })
            .await
    }

    /// Tells the actor to stop. Later requests on any handle fail with
    /// [`PeerError::Unavailable`].
    pub async fn shutdown(&self) -> Result<(), PeerError> {
        self.sender
            .send(RegistryCommand::Shutdown)
            .await
            .map_err(|_| PeerError::Unavailable)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, PeerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| PeerError::Unavailable)?;
        reply_rx.await.map_err(|_| PeerError::Unavailable)
    }
}

/// The actor state. Runs inside a Tokio task.
struct RegistryActor {
    table: PeerTable,
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl RegistryActor {
    async fn run(mut self) {
        tracing::info!("peer registry started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RegistryCommand::Upsert { packet, reply } => {
                    let _ = reply.send(self.table.upsert(&packet));
                }
                RegistryCommand::Remove { packet, reply } => {
                    let _ = reply.send(self.table.remove(&packet));
                }
                RegistryCommand::ListActive { threshold, reply } => {
                    let _ = reply.send(self.table.list_active(threshold));
                }
                RegistryCommand::Expire { threshold, reply } => {
                    let _ = reply.send(self.table.expire(threshold));
                }
                RegistryCommand::Get { name, reply } => {
                    let _ = reply.send(self.table.get(&name).cloned());
                }
                RegistryCommand::Shutdown => {
                    tracing::info!(
                        peers = self.table.len(),
                        "peer registry shutting down"
                    );
                    break;
                }
            }
        }

        tracing::info!("peer registry stopped");
    }
}
