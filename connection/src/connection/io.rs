//! I/O layer for connection handling.
//!
//! [`AsyncConnection`] drives the chia session over any websocket stream. It
//! owns the [`Transport`] and walks the [`SessionState`] machine, so the same
//! type serves TLS connections to real nodes and in-memory streams in tests.

use super::configuration::ConnectionConfiguration;
use super::error::{ConnectionError, ProtocolError};
use super::handshake::{accept_handshake, local_handshake};
use super::state::SessionState;
use crate::peer::{NodeId, NodeInfo, Peer};
use crate::protocol::{
    Handshake, Message, ProtocolMessageType, RequestPeers, RespondPeers, TimestampedPeerInfo,
};
use crate::transport::{Transport, TransportError};
use log::debug;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::WebSocketStream;

/// Largest outbound request id, ids wrap back to 1 after it.
pub const MAX_REQUEST_ID: u16 = (1 << 15) - 1;

/// Represents a connection to a chia peer.
///
/// # Trait Bounds
///
/// * [`AsyncRead`]/[`AsyncWrite`] - Required for async I/O operations.
/// * [`Unpin`] - Required because uses `&mut self` with `.await`.
/// * [`Send`] - Allows the connection to be sent between threads/tasks.
///
/// Note that [`Sync`] is not required because this struct uses `&mut self`
/// methods which enforce exclusive access.
///
/// [`AsyncRead`]: tokio::io::AsyncRead
/// [`AsyncWrite`]: tokio::io::AsyncWrite
/// [`Unpin`]: core::marker::Unpin
/// [`Send`]: core::marker::Send
/// [`Sync`]: core::marker::Sync
#[derive(Debug)]
pub struct AsyncConnection<S> {
    /// Configuration to build the connection.
    configuration: ConnectionConfiguration,
    /// The peer this connection is established with.
    peer: Peer,
    node_id: NodeId,
    transport: Transport<S>,
    state: SessionState,
    /// The remote's handshake, once accepted.
    remote: Option<Handshake>,
    next_request_id: u16,
}

impl<S> std::fmt::Display for AsyncConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WSS connection to {} ({})", self.peer, self.state)
    }
}

impl<S> AsyncConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an upgraded websocket stream.
    ///
    /// The connection starts in [`SessionState::Connecting`], call
    /// [`AsyncConnection::handshake`] before anything else.
    pub fn new(
        peer: Peer,
        node_id: NodeId,
        configuration: ConnectionConfiguration,
        stream: WebSocketStream<S>,
    ) -> Self {
        Self {
            configuration,
            peer,
            node_id,
            transport: Transport::new(stream),
            state: SessionState::default().on_connect(),
            remote: None,
            next_request_id: 1,
        }
    }

    /// The peer this connection is established with.
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Everything known about the remote node, available once the handshake completes.
    pub fn node(&self) -> Option<NodeInfo> {
        self.remote.as_ref().map(|handshake| NodeInfo {
            node_id: self.node_id,
            peer: self.peer.clone(),
            handshake: handshake.clone(),
        })
    }

    /// Exchange handshakes with the remote.
    ///
    /// Our handshake goes out first. The first message back must be the
    /// remote's handshake for the same network, anything else closes the
    /// connection.
    pub async fn handshake(&mut self) -> Result<&Handshake, ConnectionError> {
        let ours = Message::new(
            ProtocolMessageType::Handshake,
            None,
            &local_handshake(&self.configuration),
        );
        self.send(&ours).await?;
        self.state = self.state.on_handshake_sent();

        let message = match timeout(self.configuration.handshake_timeout, self.receive()).await {
            Ok(received) => received?,
            Err(_) => {
                self.state = self.state.on_failure();
                return Err(ConnectionError::TimedOut);
            }
        };

        match accept_handshake(&self.configuration, &message) {
            Ok(handshake) => {
                self.state = self.state.on_handshake_received();
                Ok(&*self.remote.insert(handshake))
            }
            Err(e) => {
                self.state = self.state.on_failure();
                Err(e)
            }
        }
    }

    /// Send a message to the peer.
    pub async fn send(&mut self, message: &Message) -> Result<(), ConnectionError> {
        if self.state.is_closed() {
            return Err(TransportError::Closed.into());
        }
        debug!("Sending {message} to {}", self.peer);
        self.transport.write(message).await.map_err(|e| {
            self.state = self.state.on_failure();
            ConnectionError::TransportFailed(e)
        })
    }

    /// Receive a message from the peer.
    pub async fn receive(&mut self) -> Result<Message, ConnectionError> {
        if self.state.is_closed() {
            return Err(TransportError::Closed.into());
        }
        self.transport.read().await.map_err(|e| {
            self.state = self.state.on_failure();
            ConnectionError::TransportFailed(e)
        })
    }

    /// Ask the peer for the addresses it knows.
    ///
    /// Waits up to `wait` for a `respond_peers` carrying our request id, or no
    /// id. Other messages are skipped. A peer which does not answer in time
    /// yields an empty list and the connection stays usable.
    pub async fn request_peers(
        &mut self,
        wait: Duration,
    ) -> Result<Vec<TimestampedPeerInfo>, ConnectionError> {
        if !self.state.is_ready() {
            return Err(ProtocolError::NotReady(self.state).into());
        }

        let id = self.take_request_id();
        let request = Message::new(ProtocolMessageType::RequestPeers, Some(id), &RequestPeers {});
        self.send(&request).await?;
        self.state = self.state.on_peers_requested();

        let deadline = Instant::now() + wait;
        loop {
            let message = match timeout_at(deadline, self.receive()).await {
                Ok(received) => received?,
                Err(_) => {
                    debug!("No peers from {} within {wait:?}", self.peer);
                    self.state = self.state.on_peers_received();
                    return Ok(Vec::new());
                }
            };

            let answers_request = message.message_type() == Some(ProtocolMessageType::RespondPeers)
                && message.id.map_or(true, |received| received == id);
            if !answers_request {
                debug!("Ignoring {message} from {} while awaiting peers", self.peer);
                continue;
            }

            return match message.decode_data::<RespondPeers>() {
                Ok(response) => {
                    self.state = self.state.on_peers_received();
                    Ok(response.peer_list)
                }
                Err(e) => {
                    self.state = self.state.on_failure();
                    Err(ConnectionError::MalformedPayload(e))
                }
            };
        }
    }

    /// Close the websocket, best effort.
    pub async fn close(&mut self) {
        if !self.state.is_closed() {
            if let Err(e) = self.transport.close().await {
                debug!("Error closing connection to {}: {e}", self.peer);
            }
        }
        self.state = self.state.on_failure();
    }

    fn take_request_id(&mut self) -> u16 {
        let id = self.next_request_id;
        self.next_request_id = if id >= MAX_REQUEST_ID { 1 } else { id + 1 };
        id
    }
}
