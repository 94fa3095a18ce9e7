//! Internal peer connection abstractions for testing and mocking.
//!
//! This module provides the [`PeerConnection`] trait that abstracts chia peer
//! connections, enabling dependency injection for testing without modifying
//! the core crawler logic.

use chia_peers_connection::protocol::TimestampedPeerInfo;
use chia_peers_connection::{
    AsyncConnection, Connection, ConnectionConfiguration, ConnectionError, NodeInfo, Peer,
};
use log::debug;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout, Instant};

/// Trait for handshaked chia peer connections.
///
/// This trait abstracts the core operations needed for crawling, allowing
/// for easy testing with mock implementations.
pub trait PeerConnection: Send {
    /// The remote node, None unless the handshake completed.
    fn node(&self) -> Option<NodeInfo>;

    /// Request peers once, waiting up to `wait` for the answer.
    fn request_peers(
        &mut self,
        wait: Duration,
    ) -> impl std::future::Future<Output = Result<Vec<TimestampedPeerInfo>, ConnectionError>> + Send;

    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send;

    /// Ask for peers up to `rounds` times, finishing by `deadline`.
    ///
    /// Stops after the first round which returns nothing, times out or fails,
    /// or once the deadline passes. Peers gathered before that are kept.
    ///
    /// # Arguments
    ///
    /// * `rounds` - Maximum number of requests.
    /// * `peer_timeout` - Maximum duration to wait for each response.
    /// * `deadline` - End of the whole attempt, rounds are cut short to meet it.
    fn discover_peers(
        &mut self,
        rounds: usize,
        peer_timeout: Duration,
        deadline: Instant,
    ) -> impl std::future::Future<Output = Vec<TimestampedPeerInfo>> + Send {
        async move {
            let mut all_peers = Vec::new();

            for round in 1..=rounds {
                let wait = peer_timeout.min(deadline.saturating_duration_since(Instant::now()));
                if wait.is_zero() {
                    debug!("Attempt deadline reached before round {round}");
                    break;
                }

                match timeout(wait, self.request_peers(wait)).await {
                    Ok(Ok(peers)) if peers.is_empty() => {
                        debug!("Round {round} returned no peers");
                        break;
                    }
                    Ok(Ok(peers)) => {
                        debug!("Round {round} returned {} peers", peers.len());
                        all_peers.extend(peers);
                    }
                    Ok(Err(e)) => {
                        debug!("Round {round} failed: {e}");
                        break;
                    }
                    Err(_) => {
                        debug!("Round {round} timed out");
                        break;
                    }
                }
            }

            all_peers
        }
    }
}

/// Implementation of PeerConnection for the Connection type from chia-peers-connection.
impl PeerConnection for Connection {
    fn node(&self) -> Option<NodeInfo> {
        Connection::node(self)
    }

    fn request_peers(
        &mut self,
        wait: Duration,
    ) -> impl std::future::Future<Output = Result<Vec<TimestampedPeerInfo>, ConnectionError>> + Send
    {
        Connection::request_peers(self, wait)
    }

    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send {
        Connection::close(self)
    }
}

/// Any websocket stream works, which is how in-memory nodes are crawled.
impl<S> PeerConnection for AsyncConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn node(&self) -> Option<NodeInfo> {
        AsyncConnection::node(self)
    }

    fn request_peers(
        &mut self,
        wait: Duration,
    ) -> impl std::future::Future<Output = Result<Vec<TimestampedPeerInfo>, ConnectionError>> + Send
    {
        AsyncConnection::request_peers(self, wait)
    }

    fn close(&mut self) -> impl std::future::Future<Output = ()> + Send {
        AsyncConnection::close(self)
    }
}

/// Factory trait for creating peer connections.
///
/// This trait enables dependency injection for connection creation,
/// allowing different implementations for production and testing.
pub trait Connector: Clone + Send + Sync + 'static {
    type Connection: PeerConnection + Send;

    /// Connect to the peer and complete the handshake.
    fn connect(
        &self,
        peer: &Peer,
    ) -> impl std::future::Future<Output = Result<Self::Connection, ConnectionError>> + Send;
}

/// Standard connector that creates real TLS connections.
#[derive(Debug, Clone)]
pub struct PeerConnector {
    config: ConnectionConfiguration,
}

impl PeerConnector {
    /// Create a new connector with the given configuration.
    ///
    /// The configuration must carry a TLS identity.
    pub fn new(config: ConnectionConfiguration) -> Self {
        Self { config }
    }
}

impl Connector for PeerConnector {
    type Connection = Connection;

    fn connect(
        &self,
        peer: &Peer,
    ) -> impl std::future::Future<Output = Result<Self::Connection, ConnectionError>> + Send {
        let peer = peer.clone();
        let config = self.config.clone();
        async move { Connection::tls(peer, config).await }
    }
}

/// One worker's session with one target.
///
/// Only built from a handshaked connection. Dropping the session drops the
/// connection and with it the transport.
#[derive(Debug)]
pub struct ConnectionSession<C> {
    connection: C,
    node: NodeInfo,
    peers: Vec<TimestampedPeerInfo>,
}

impl<C: PeerConnection> ConnectionSession<C> {
    /// Start a session, None if the connection has not completed its handshake.
    pub fn new(connection: C) -> Option<Self> {
        let node = connection.node()?;
        Some(Self {
            connection,
            node,
            peers: Vec::new(),
        })
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    /// Peer records gathered so far.
    pub fn peers(&self) -> &[TimestampedPeerInfo] {
        &self.peers
    }

    /// Run peer discovery, see [`PeerConnection::discover_peers`].
    pub async fn discover(
        &mut self,
        rounds: usize,
        peer_timeout: Duration,
        deadline: Instant,
    ) -> usize {
        let peers = self
            .connection
            .discover_peers(rounds, peer_timeout, deadline)
            .await;
        let count = peers.len();
        self.peers.extend(peers);
        count
    }

    /// Close the connection and hand back what was gathered.
    pub async fn close(mut self) -> Vec<TimestampedPeerInfo> {
        self.connection.close().await;
        self.peers
    }
}

#[cfg(test)]
pub mod test_utils {
    //! Test utilities for testing PeerConnection implementations.

    use super::*;
    use chia_peers_connection::protocol::{Handshake, NodeType};
    use chia_peers_connection::NodeId;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::{Arc, Mutex};

    /// Handshake info as a node at `peer` would send it.
    pub fn node_info(peer: &Peer) -> NodeInfo {
        NodeInfo {
            node_id: NodeId([0x11; 32]),
            peer: peer.clone(),
            handshake: Handshake {
                network_id: "mainnet".to_string(),
                protocol_version: "0.0.36".to_string(),
                software_version: "2.4.1".to_string(),
                server_port: peer.port,
                node_type: NodeType::FullNode,
                capabilities: vec![(1, "1".to_string())],
            },
        }
    }

    pub fn peer_record(host: &str, port: u16) -> TimestampedPeerInfo {
        TimestampedPeerInfo {
            host: host.to_string(),
            port,
            timestamp: 1_700_000_000,
        }
    }

    /// Mock implementation of PeerConnection for testing.
    #[derive(Debug)]
    pub struct MockPeerConnection {
        /// Node info to return, None simulates a missing handshake.
        pub node: Option<NodeInfo>,
        /// Queue of results returned by request_peers().
        pub responses: VecDeque<Result<Vec<TimestampedPeerInfo>, ConnectionError>>,
        /// Number of request_peers() calls.
        pub requests: usize,
        pub closed: bool,
    }

    impl MockPeerConnection {
        /// Create a new handshaked mock connection to `peer`.
        pub fn new(peer: &Peer) -> Self {
            MockPeerConnection {
                node: Some(node_info(peer)),
                responses: VecDeque::new(),
                requests: 0,
                closed: false,
            }
        }

        /// Add peers returned by the next request_peers() call.
        pub fn add_response(&mut self, peers: Vec<TimestampedPeerInfo>) {
            self.responses.push_back(Ok(peers));
        }

        /// Add an error returned by the next request_peers() call.
        pub fn add_error(&mut self, error: ConnectionError) {
            self.responses.push_back(Err(error));
        }
    }

    impl PeerConnection for MockPeerConnection {
        fn node(&self) -> Option<NodeInfo> {
            self.node.clone()
        }

        async fn request_peers(
            &mut self,
            _wait: Duration,
        ) -> Result<Vec<TimestampedPeerInfo>, ConnectionError> {
            self.requests += 1;
            if self.closed {
                return Err(ConnectionError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "Connection closed",
                )));
            }

            // If we have a response queued, return it immediately
            if let Some(result) = self.responses.pop_front() {
                return result;
            }

            // Otherwise, wait indefinitely (let the caller's timeout handle it)
            std::future::pending().await
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    /// Mock connector for testing.
    #[derive(Debug, Clone, Default)]
    pub struct MockConnector {
        connections: Arc<Mutex<HashMap<Peer, MockPeerConnection>>>,
        hanging: Arc<Mutex<HashSet<Peer>>>,
    }

    impl MockConnector {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add the connection returned when connecting to `peer`.
        pub fn add_connection(&self, peer: Peer, conn: MockPeerConnection) {
            self.connections.lock().unwrap().insert(peer, conn);
        }

        /// Connecting to `peer` never completes.
        pub fn add_hanging(&self, peer: Peer) {
            self.hanging.lock().unwrap().insert(peer);
        }
    }

    impl Connector for MockConnector {
        type Connection = MockPeerConnection;

        fn connect(
            &self,
            peer: &Peer,
        ) -> impl std::future::Future<Output = Result<Self::Connection, ConnectionError>> + Send
        {
            let hangs = self.hanging.lock().unwrap().contains(peer);
            let connection = self.connections.lock().unwrap().remove(peer);
            async move {
                if hangs {
                    std::future::pending::<()>().await;
                }
                connection.ok_or_else(|| {
                    ConnectionError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "No mock connection available",
                    ))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::{peer_record, MockPeerConnection};
    use super::*;

    fn peer() -> Peer {
        Peer::new("10.0.0.1", 8444)
    }

    /// A deadline no test reaches.
    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_discover_peers_all_rounds() {
        let mut mock_conn = MockPeerConnection::new(&peer());
        mock_conn.add_response(vec![peer_record("10.0.0.2", 8444)]);
        mock_conn.add_response(vec![peer_record("10.0.0.3", 8444)]);
        mock_conn.add_response(vec![peer_record("10.0.0.4", 8444)]);
        mock_conn.add_response(vec![peer_record("10.0.0.5", 8444)]);

        let peers = mock_conn
            .discover_peers(3, Duration::from_millis(100), later())
            .await;

        assert_eq!(peers.len(), 3);
        assert_eq!(mock_conn.requests, 3);
        assert_eq!(peers[2].host, "10.0.0.4");
    }

    #[tokio::test]
    async fn test_discover_peers_stops_at_empty_round() {
        let mut mock_conn = MockPeerConnection::new(&peer());
        mock_conn.add_response(vec![peer_record("10.0.0.2", 8444)]);
        mock_conn.add_response(vec![]);
        mock_conn.add_response(vec![peer_record("10.0.0.3", 8444)]);

        let peers = mock_conn
            .discover_peers(3, Duration::from_millis(100), later())
            .await;

        assert_eq!(peers.len(), 1);
        assert_eq!(mock_conn.requests, 2);
    }

    #[tokio::test]
    async fn test_discover_peers_timeout() {
        let mut mock_conn = MockPeerConnection::new(&peer());
        // Don't add any responses - should timeout

        let peers = mock_conn
            .discover_peers(3, Duration::from_millis(50), later())
            .await;

        assert!(peers.is_empty());
        assert_eq!(mock_conn.requests, 1);
    }

    #[tokio::test]
    async fn test_discover_peers_keeps_peers_before_error() {
        let mut mock_conn = MockPeerConnection::new(&peer());
        mock_conn.add_response(vec![peer_record("10.0.0.2", 8444)]);
        mock_conn.add_error(ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "Connection lost",
        )));

        let peers = mock_conn
            .discover_peers(3, Duration::from_millis(100), later())
            .await;

        assert_eq!(peers.len(), 1);
        assert_eq!(mock_conn.requests, 2);
    }

    #[tokio::test]
    async fn test_discover_peers_stops_at_deadline() {
        let mut mock_conn = MockPeerConnection::new(&peer());
        mock_conn.add_response(vec![peer_record("10.0.0.2", 8444)]);
        // The second round never answers, only the deadline ends it.

        let start = Instant::now();
        let peers = mock_conn
            .discover_peers(3, Duration::from_millis(1500), start + Duration::from_millis(100))
            .await;

        assert!(start.elapsed() < Duration::from_millis(1000));
        assert_eq!(peers, vec![peer_record("10.0.0.2", 8444)]);
        assert_eq!(mock_conn.requests, 2);
    }

    #[tokio::test]
    async fn test_discover_peers_past_deadline_sends_nothing() {
        let mut mock_conn = MockPeerConnection::new(&peer());
        mock_conn.add_response(vec![peer_record("10.0.0.2", 8444)]);

        let peers = mock_conn
            .discover_peers(3, Duration::from_millis(100), Instant::now())
            .await;

        assert!(peers.is_empty());
        assert_eq!(mock_conn.requests, 0);
    }

    #[tokio::test]
    async fn test_session_requires_handshake() {
        let mut mock_conn = MockPeerConnection::new(&peer());
        mock_conn.node = None;
        assert!(ConnectionSession::new(mock_conn).is_none());
    }

    #[tokio::test]
    async fn test_session_accumulates_and_closes() {
        let mut mock_conn = MockPeerConnection::new(&peer());
        mock_conn.add_response(vec![peer_record("10.0.0.2", 8444)]);
        mock_conn.add_response(vec![]);

        let mut session = ConnectionSession::new(mock_conn).unwrap();
        assert_eq!(session.node().peer, peer());
        assert_eq!(session.discover(3, Duration::from_millis(100), later()).await, 1);
        assert_eq!(session.peers().len(), 1);

        let peers = session.close().await;
        assert_eq!(peers, vec![peer_record("10.0.0.2", 8444)]);
    }
}
