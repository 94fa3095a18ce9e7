//! Payload types used by the crawler.

use crate::wire::{wire_struct, Decode, Encode, Reader, WireError};
use std::fmt;

/// Base capability, support for the chia protocol on mainnet.
pub const CAPABILITY_BASE: u16 = 1;

/// A capability advertised in the handshake, `(id, value)`.
pub type Capability = (u16, String);

/// Role of a node on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    FullNode,
    Harvester,
    Farmer,
    Timelord,
    Introducer,
    Wallet,
    /// A node type this crate does not know about.
    Unknown(u8),
}

impl NodeType {
    /// Name used when reporting a node, e.g. `FULL_NODE`.
    pub fn name(&self) -> String {
        match self {
            NodeType::FullNode => "FULL_NODE".to_string(),
            NodeType::Harvester => "HARVESTER".to_string(),
            NodeType::Farmer => "FARMER".to_string(),
            NodeType::Timelord => "TIMELORD".to_string(),
            NodeType::Introducer => "INTRODUCER".to_string(),
            NodeType::Wallet => "WALLET".to_string(),
            NodeType::Unknown(value) => format!("UNKNOWN_{value}"),
        }
    }
}

impl From<u8> for NodeType {
    fn from(value: u8) -> Self {
        match value {
            1 => NodeType::FullNode,
            2 => NodeType::Harvester,
            3 => NodeType::Farmer,
            4 => NodeType::Timelord,
            5 => NodeType::Introducer,
            6 => NodeType::Wallet,
            other => NodeType::Unknown(other),
        }
    }
}

impl From<NodeType> for u8 {
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::FullNode => 1,
            NodeType::Harvester => 2,
            NodeType::Farmer => 3,
            NodeType::Timelord => 4,
            NodeType::Introducer => 5,
            NodeType::Wallet => 6,
            NodeType::Unknown(value) => value,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Encode for NodeType {
    fn encode(&self, buf: &mut Vec<u8>) {
        u8::from(*self).encode(buf);
    }

    fn is_zero_value(&self) -> bool {
        u8::from(*self) == 0
    }
}

impl Decode for NodeType {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(NodeType::from(u8::decode(reader)?))
    }
}

/// First message sent by both sides of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub network_id: String,
    pub protocol_version: String,
    pub software_version: String,
    pub server_port: u16,
    pub node_type: NodeType,
    pub capabilities: Vec<Capability>,
}

wire_struct!(Handshake {
    network_id,
    protocol_version,
    software_version,
    server_port,
    node_type,
    capabilities,
});

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} node on {} (protocol {}, software {}, port {})",
            self.node_type,
            self.network_id,
            self.protocol_version,
            self.software_version,
            self.server_port
        )
    }
}

/// Ask a full node for the peers it knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPeers {}

wire_struct!(RequestPeers {});

/// A peer known to a node, with the last time it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimestampedPeerInfo {
    pub host: String,
    pub port: u16,
    pub timestamp: u64,
}

wire_struct!(TimestampedPeerInfo {
    host,
    port,
    timestamp
});

/// Response to [`RequestPeers`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RespondPeers {
    pub peer_list: Vec<TimestampedPeerInfo>,
}

wire_struct!(RespondPeers { peer_list });
