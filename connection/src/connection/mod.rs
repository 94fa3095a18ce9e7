//! Chia p2p protocol connection.
//!
//! This module provides connection handling for the chia peer-to-peer network.
//! It covers TLS with the node's client certificate, the websocket upgrade,
//! the handshake and peer exchange.
//!
//! The [`Connection`] type is the recommended high-level API for most applications.
//!
//! # Examples
//!
//! Asking a chia node for the peers it knows.
//!
//! ```no_run
//! use chia_peers_connection::{Connection, ConnectionConfiguration, Peer, TlsIdentity};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = TlsIdentity::from_pem_files("public_full_node.crt", "public_full_node.key")?;
//! let config = ConnectionConfiguration::full_node("mainnet", Some(identity));
//!
//! // Establish the connection with automatic handshake.
//! let mut connection = Connection::tls(Peer::new("127.0.0.1", 8444), config).await?;
//! if let Some(node) = connection.node() {
//!     println!("Connected to {node}");
//! }
//!
//! let peers = connection.request_peers(Duration::from_secs(5)).await?;
//! println!("Received {} peers", peers.len());
//! connection.close().await;
//! # Ok(())
//! # }
//! ```

mod configuration;
mod error;
mod handshake;
mod io;
mod state;
mod tls;

pub use configuration::{
    default_capabilities, ConnectionConfiguration, DEFAULT_CONNECTION_TIMEOUT,
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_NETWORK_ID, DEFAULT_PROTOCOL_VERSION,
    DEFAULT_SERVER_PORT, DEFAULT_SOFTWARE_VERSION,
};
pub use error::{ConnectionError, ProtocolError, TlsError};
pub use handshake::{accept_handshake, local_handshake};
pub use io::{AsyncConnection, MAX_REQUEST_ID};
pub use state::SessionState;
pub use tls::{TlsConnection, TlsIdentity};

use crate::peer::{NodeInfo, Peer};
use crate::protocol::{Message, TimestampedPeerInfo};
use std::time::Duration;

/// Provides a unified interface to chia peer connections.
///
/// Note that `Connection` does *not* implement `Copy` or `Clone` as it owns I/O
/// resources that cannot be duplicated.
#[derive(Debug)]
pub enum Connection {
    Tls(TlsConnection),
}

impl Connection {
    /// Establish a TLS websocket connection to a chia peer and perform the handshake.
    ///
    /// # Arguments
    ///
    /// * `peer` - The chia peer to connect to.
    /// * `configuration` - Configuration for the connection, it must carry a
    ///   [`TlsIdentity`].
    ///
    /// # Returns
    ///
    /// * `Ok(`[`Self`]`)` - A successfully established and handshaked connection
    /// * `Err(`[`ConnectionError`]`)` - If the connection attempt or handshake failed
    pub async fn tls(
        peer: Peer,
        configuration: ConnectionConfiguration,
    ) -> Result<Self, ConnectionError> {
        Ok(Connection::Tls(tls::connect(peer, configuration).await?))
    }

    /// The peer this connection is established with.
    pub fn peer(&self) -> &Peer {
        match self {
            Connection::Tls(conn) => conn.peer(),
        }
    }

    pub fn state(&self) -> SessionState {
        match self {
            Connection::Tls(conn) => conn.state(),
        }
    }

    /// Everything known about the remote node after the handshake.
    pub fn node(&self) -> Option<NodeInfo> {
        match self {
            Connection::Tls(conn) => conn.node(),
        }
    }

    /// Send a message to the peer.
    pub async fn send(&mut self, message: &Message) -> Result<(), ConnectionError> {
        match self {
            Connection::Tls(conn) => conn.send(message).await,
        }
    }

    /// Receive a message from the peer.
    pub async fn receive(&mut self) -> Result<Message, ConnectionError> {
        match self {
            Connection::Tls(conn) => conn.receive().await,
        }
    }

    /// Ask the peer for the addresses it knows, see [`AsyncConnection::request_peers`].
    pub async fn request_peers(
        &mut self,
        wait: Duration,
    ) -> Result<Vec<TimestampedPeerInfo>, ConnectionError> {
        match self {
            Connection::Tls(conn) => conn.request_peers(wait).await,
        }
    }

    /// Close the connection, best effort.
    pub async fn close(&mut self) {
        match self {
            Connection::Tls(conn) => conn.close().await,
        }
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connection::Tls(conn) => std::fmt::Display::fmt(conn, f),
        }
    }
}
