//! Connection configuration types and constants.

use super::tls::TlsIdentity;
use crate::protocol::{Capability, NodeType, CAPABILITY_BASE};
use std::fmt;
use std::time::Duration;

/// Network the crawler speaks to by default.
pub const DEFAULT_NETWORK_ID: &str = "mainnet";
/// Protocol version advertised in the handshake.
pub const DEFAULT_PROTOCOL_VERSION: &str = "0.0.32";
/// Software version advertised in the handshake.
pub const DEFAULT_SOFTWARE_VERSION: &str = "1.1.6";
/// Full node port advertised in the handshake.
pub const DEFAULT_SERVER_PORT: u16 = 8444;

/// Default timeout for connection establishment.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout waiting for the remote handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Capabilities advertised by default, just base protocol support.
pub fn default_capabilities() -> Vec<Capability> {
    vec![(CAPABILITY_BASE, "1".to_string())]
}

/// Configuration used to build a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfiguration {
    /// Network id sent in the handshake. Peers on other networks are rejected.
    pub network_id: String,
    /// Protocol version sent in the handshake.
    pub protocol_version: String,
    /// Software version sent in the handshake.
    pub software_version: String,
    /// Port advertised as our own server port.
    pub server_port: u16,
    /// Node type advertised in the handshake.
    pub node_type: NodeType,
    /// Capabilities advertised in the handshake.
    pub capabilities: Vec<Capability>,
    /// Timeout for TCP connect, TLS and the websocket upgrade, each.
    pub connection_timeout: Duration,
    /// Timeout waiting for the remote handshake.
    pub handshake_timeout: Duration,
    /// Client certificate presented to peers. Required for TLS connections.
    pub identity: Option<TlsIdentity>,
}

impl ConnectionConfiguration {
    /// Creates a configuration which presents itself as a full node.
    ///
    /// # Arguments
    ///
    /// * `network_id` - The network to crawl, e.g. `mainnet`.
    /// * `identity` - Client certificate for TLS connections. Only needed by
    ///   [`crate::Connection::tls`].
    pub fn full_node(network_id: impl Into<String>, identity: Option<TlsIdentity>) -> Self {
        Self {
            network_id: network_id.into(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            software_version: DEFAULT_SOFTWARE_VERSION.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            node_type: NodeType::FullNode,
            capabilities: default_capabilities(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            identity,
        }
    }

    /// Set the timeout for connection establishment.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use chia_peers_connection::ConnectionConfiguration;
    ///
    /// let config = ConnectionConfiguration::full_node("mainnet", None)
    ///     .with_connection_timeout(Duration::from_secs(2));
    /// assert_eq!(config.connection_timeout, Duration::from_secs(2));
    /// ```
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the timeout waiting for the remote handshake.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the software version advertised in the handshake.
    pub fn with_software_version(mut self, version: impl Into<String>) -> Self {
        self.software_version = version.into();
        self
    }

    /// Set the server port advertised in the handshake.
    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }
}

impl Default for ConnectionConfiguration {
    fn default() -> Self {
        Self::full_node(DEFAULT_NETWORK_ID, None)
    }
}

impl fmt::Display for ConnectionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionConfiguration {{ network: {}, protocol: {}, software: {}, node_type: {}, identity: {} }}",
            self.network_id,
            self.protocol_version,
            self.software_version,
            self.node_type,
            if self.identity.is_some() { "yes" } else { "none" },
        )
    }
}
