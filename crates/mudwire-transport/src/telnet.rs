//! Raw TCP transport for telnet clients.
//!
//! Inbound bytes are framed into [`TelnetEvent`]s by a [`TelnetCodec`];
//! outbound bytes are written as given. IAC escaping of outgoing text
//! happens above this layer.

use std::net::SocketAddr;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use mudwire_protocol::ProtocolError;
use mudwire_protocol::telnet::{TelnetCodec, TelnetEvent};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{BytesCodec, FramedRead, FramedWrite};

use crate::{Connection, ConnectionId, Transport, TransportError};

/// A TCP [`Transport`] for telnet clients.
pub struct TelnetTransport {
    listener: TcpListener,
}

impl TelnetTransport {
    /// Binds a new telnet transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        tracing::info!(addr, "telnet transport listening");
        Ok(Self { listener })
    }
}

impl Transport for TelnetTransport {
    type Connection = TelnetConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        // Negotiation replies are tiny; don't let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "failed to set TCP_NODELAY");
        }

        let id = ConnectionId::next();
        tracing::debug!(%id, %addr, "accepted telnet connection");

        let (reader, writer) = stream.into_split();
        Ok(TelnetConnection {
            id,
            addr,
            reader: Mutex::new(FramedRead::new(reader, TelnetCodec::new())),
            writer: Mutex::new(FramedWrite::new(writer, BytesCodec::new())),
        })
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

/// A single telnet connection.
///
/// The read and write halves are locked separately so one task can sit
/// in `recv` while another sends.
pub struct TelnetConnection {
    id: ConnectionId,
    addr: SocketAddr,
    reader: Mutex<FramedRead<OwnedReadHalf, TelnetCodec>>,
    writer: Mutex<FramedWrite<OwnedWriteHalf, BytesCodec>>,
}

fn receive_error(e: ProtocolError) -> TransportError {
    match e {
        ProtocolError::Io(e) => TransportError::ReceiveFailed(e),
        other => TransportError::ReceiveFailed(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            other,
        )),
    }
}

impl Connection for TelnetConnection {
    type Frame = TelnetEvent;
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .send(Bytes::copy_from_slice(data))
            .await
            .map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<TelnetEvent>, Self::Error> {
        self.reader
            .lock()
            .await
            .next()
            .await
            .transpose()
            .map_err(receive_error)
    }

    /// Flushes pending output and shuts down the write half.
    async fn close(&self) -> Result<(), Self::Error> {
        SinkExt::<Bytes>::close(&mut *self.writer.lock().await)
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}
