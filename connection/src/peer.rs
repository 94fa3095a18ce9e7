//! Chia peer information structures and utilities.

use crate::protocol::{Handshake, TimestampedPeerInfo};
use sha2::{Digest, Sha256};
use std::fmt;

/// Represents a chia peer on the network.
///
/// The host is kept as given, it may be an IPv4 or IPv6 literal or a hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    /// The peer's host.
    pub host: String,
    /// The port number the peer is listening on.
    pub port: u16,
}

impl Peer {
    /// Creates a new peer.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Peer {
            host: host.into(),
            port,
        }
    }

    /// Whether the host is an IPv6 literal.
    pub fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }

    /// Websocket endpoint of the peer's full node service.
    pub fn websocket_url(&self) -> String {
        format!("wss://{self}/ws")
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<&TimestampedPeerInfo> for Peer {
    fn from(info: &TimestampedPeerInfo) -> Self {
        Peer::new(info.host.clone(), info.port)
    }
}

/// Identity of a node, the SHA-256 of its TLS certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Derive the node id from a DER encoded certificate.
    pub fn from_certificate(der: &[u8]) -> Self {
        NodeId(Sha256::digest(der).into())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// What is known about a remote node once the handshake completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub node_id: NodeId,
    /// The address the connection was made to.
    pub peer: Peer,
    /// The handshake the node sent.
    pub handshake: Handshake,
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.node_id, self.peer, self.handshake)
    }
}
