//! Builder pattern for configuring and creating crawler instances.

use crate::connection::Connector;
use crate::crawler::{Crawler, CrawlerConfig};
use crate::dedup::DEFAULT_DEDUP_TTL;
use crate::ipc::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_DELAY};
use crate::session::SessionConfig;
use std::fmt;
use std::time::Duration;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 128;
/// Default capacity of the inbound (targets) and outbound (reports) queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;
/// Default bound on a whole attempt: connect, handshake and discovery.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default bound on each peer request round.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);
/// Default number of peer request rounds per target.
pub const DEFAULT_PEER_REQUEST_ROUNDS: usize = 3;
/// Default interval between health log lines.
pub const DEFAULT_HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Errors that can occur during crawler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlerBuilderError {
    /// Queues need room for at least one item.
    ZeroQueueCapacity,
    /// At least one peer request round is required.
    ZeroPeerRequestRounds,
}

impl fmt::Display for CrawlerBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerBuilderError::ZeroQueueCapacity => {
                write!(f, "Queue capacity must be at least 1")
            }
            CrawlerBuilderError::ZeroPeerRequestRounds => {
                write!(f, "Peer request rounds must be at least 1")
            }
        }
    }
}

impl std::error::Error for CrawlerBuilderError {}

/// Builder for creating a customized [`Crawler`] instance.
///
/// # Example
///
/// ```
/// # fn main() -> Result<(), chia_peers_crawler::CrawlerBuilderError> {
/// use chia_peers_crawler::{ConnectionConfiguration, CrawlerBuilder, PeerConnector};
/// use std::time::Duration;
///
/// let connector = PeerConnector::new(ConnectionConfiguration::default());
///
/// // Create a crawler with custom settings
/// let crawler = CrawlerBuilder::new()
///     .with_workers(32)
///     .with_inbound_capacity(64)?
///     .with_peer_request_rounds(1)?
///     .with_attempt_timeout(Duration::from_secs(3))
///     .build(connector);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CrawlerBuilder {
    /// Number of concurrent workers.
    workers: usize,
    inbound_capacity: usize,
    outbound_capacity: usize,
    attempt_timeout: Duration,
    peer_timeout: Duration,
    peer_request_rounds: usize,
    dedup_ttl: Duration,
    health_log_interval: Duration,
    reconnect_delay: Duration,
    address_book_timeout: Duration,
}

impl CrawlerBuilder {
    /// Create a new crawler builder with default settings.
    pub fn new() -> Self {
        CrawlerBuilder {
            workers: DEFAULT_WORKERS,
            inbound_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_capacity: DEFAULT_QUEUE_CAPACITY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            peer_request_rounds: DEFAULT_PEER_REQUEST_ROUNDS,
            dedup_ttl: DEFAULT_DEDUP_TTL,
            health_log_interval: DEFAULT_HEALTH_LOG_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            address_book_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the number of concurrent workers.
    ///
    /// Each worker crawls one target at a time. Zero workers is allowed, targets
    /// then queue up until the inbound queue is full.
    ///
    /// # Recommendations
    ///
    /// * **Conservative (8-32)** - For slow networks or resource-constrained environments.
    /// * **Default (128)** - Good balance for most use cases.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the capacity of the inbound queue of crawl targets.
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining.
    /// * `Err(CrawlerBuilderError)` - If the capacity is zero.
    pub fn with_inbound_capacity(mut self, capacity: usize) -> Result<Self, CrawlerBuilderError> {
        if capacity == 0 {
            return Err(CrawlerBuilderError::ZeroQueueCapacity);
        }
        self.inbound_capacity = capacity;
        Ok(self)
    }

    /// Set the capacity of the outbound queue of reports.
    pub fn with_outbound_capacity(
        mut self,
        capacity: usize,
    ) -> Result<Self, CrawlerBuilderError> {
        if capacity == 0 {
            return Err(CrawlerBuilderError::ZeroQueueCapacity);
        }
        self.outbound_capacity = capacity;
        Ok(self)
    }

    /// Set the overall bound on one attempt.
    ///
    /// Covers TCP connect, TLS, websocket upgrade, handshake and peer discovery.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the timeout for each peer request round.
    ///
    /// A round which times out ends discovery for that target. Rounds never
    /// run past the attempt timeout.
    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    /// Set how many times each target is asked for peers.
    pub fn with_peer_request_rounds(mut self, rounds: usize) -> Result<Self, CrawlerBuilderError> {
        if rounds == 0 {
            return Err(CrawlerBuilderError::ZeroPeerRequestRounds);
        }
        self.peer_request_rounds = rounds;
        Ok(self)
    }

    /// Set how long a reported peer is suppressed.
    pub fn with_dedup_ttl(mut self, ttl: Duration) -> Self {
        self.dedup_ttl = ttl;
        self
    }

    pub fn with_health_log_interval(mut self, interval: Duration) -> Self {
        self.health_log_interval = interval;
        self
    }

    /// Set the pause between reconnect attempts to the address book.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the bound on each TCP connect to the address book.
    pub fn with_address_book_timeout(mut self, timeout: Duration) -> Self {
        self.address_book_timeout = timeout;
        self
    }

    /// Build the crawler with the configured options.
    ///
    /// # Arguments
    ///
    /// * `connector` - Opens connections to targets, usually a [`crate::PeerConnector`].
    pub fn build<C: Connector>(self, connector: C) -> Crawler<C> {
        Crawler::new(
            CrawlerConfig {
                workers: self.workers,
                inbound_capacity: self.inbound_capacity,
                outbound_capacity: self.outbound_capacity,
                session: SessionConfig {
                    attempt_timeout: self.attempt_timeout,
                    peer_timeout: self.peer_timeout,
                    peer_request_rounds: self.peer_request_rounds,
                },
                dedup_ttl: self.dedup_ttl,
                health_log_interval: self.health_log_interval,
                reconnect_delay: self.reconnect_delay,
                address_book_timeout: self.address_book_timeout,
            },
            connector,
        )
    }
}

impl Default for CrawlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
