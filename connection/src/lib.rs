pub mod protocol;
pub mod wire;

mod connection;
mod peer;
mod transport;

pub use connection::{
    accept_handshake, default_capabilities, local_handshake, AsyncConnection, Connection,
    ConnectionConfiguration, ConnectionError, ProtocolError, SessionState, TlsConnection,
    TlsError, TlsIdentity, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_NETWORK_ID, DEFAULT_PROTOCOL_VERSION, DEFAULT_SERVER_PORT,
    DEFAULT_SOFTWARE_VERSION, MAX_REQUEST_ID,
};
pub use peer::{NodeId, NodeInfo, Peer};
pub use transport::{Transport, TransportError};
