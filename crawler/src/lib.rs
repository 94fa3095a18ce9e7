mod builder;
mod connection;
mod crawler;
mod dedup;
pub mod ipc;
mod metrics;
mod session;

pub use builder::{
    CrawlerBuilder, CrawlerBuilderError, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_HEALTH_LOG_INTERVAL,
    DEFAULT_PEER_REQUEST_ROUNDS, DEFAULT_PEER_TIMEOUT, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS,
};
pub use connection::{ConnectionSession, Connector, PeerConnection, PeerConnector};
pub use crawler::{CrawlHandle, Crawler};
pub use dedup::{DedupCache, DEFAULT_DEDUP_TTL};
pub use ipc::{Command, Report, DEFAULT_ADDRESS_BOOK};
pub use metrics::{CrawlMetrics, MetricsSnapshot};

// Re-exports.
pub use chia_peers_connection::{
    ConnectionConfiguration, ConnectionError, NodeId, NodeInfo, Peer, TlsIdentity,
};
