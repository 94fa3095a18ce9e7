use crate::connection::Connector;
use crate::dedup::DedupCache;
use crate::ipc::{AddressBookLink, Report};
use crate::metrics::CrawlMetrics;
use crate::session::{spawn_health_logger, CrawlSession, SessionConfig, SharedInbound};
use chia_peers_connection::Peer;
use log::{info, warn};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Settings of a [`Crawler`], see [`crate::CrawlerBuilder`].
#[derive(Debug, Clone)]
pub(crate) struct CrawlerConfig {
    pub workers: usize,
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
    pub session: SessionConfig,
    pub dedup_ttl: Duration,
    pub health_log_interval: Duration,
    pub reconnect_delay: Duration,
    pub address_book_timeout: Duration,
}

/// A crawler for the chia peer-to-peer network.
///
/// Targets come in, handshake and peer reports come out. [`Crawler::run`] wires
/// both ends to the address book, [`Crawler::start`] hands them to the caller.
#[derive(Debug, Clone)]
pub struct Crawler<C> {
    config: CrawlerConfig,
    connector: C,
}

/// A running crawl engine.
///
/// Dropping `targets` stops the workers once the queue drains.
#[derive(Debug)]
pub struct CrawlHandle {
    /// Queue of targets to crawl.
    pub targets: mpsc::Sender<Peer>,
    /// Reports in the order workers produced them.
    pub reports: mpsc::Receiver<Report>,
    pub metrics: Arc<CrawlMetrics>,
    dedup: Arc<DedupCache>,
    /// Kept so the queue stays open even without workers.
    inbound: SharedInbound,
    workers: Vec<JoinHandle<()>>,
    health: JoinHandle<()>,
}

impl CrawlHandle {
    /// Number of peers the dedup cache has seen.
    pub async fn dedup_len(&self) -> usize {
        self.dedup.len().await
    }

    /// Number of running workers.
    pub fn active_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Stop all workers and the health logger.
    pub fn abort(&self) {
        for worker in &self.workers {
            worker.abort();
        }
        self.health.abort();
    }
}

impl<C: Connector> Crawler<C> {
    pub(crate) fn new(config: CrawlerConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// Start the workers.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self) -> CrawlHandle {
        let (targets_tx, targets_rx) = mpsc::channel(self.config.inbound_capacity);
        let (reports_tx, reports_rx) = mpsc::channel(self.config.outbound_capacity);
        let inbound: SharedInbound = Arc::new(Mutex::new(targets_rx));
        let dedup = Arc::new(DedupCache::new(self.config.dedup_ttl));
        let metrics = Arc::new(CrawlMetrics::new());

        let health = spawn_health_logger(
            self.config.health_log_interval,
            targets_tx.downgrade(),
            reports_tx.downgrade(),
            metrics.clone(),
            dedup.clone(),
        );

        let session = CrawlSession::new(
            self.config.session.clone(),
            self.connector.clone(),
            dedup.clone(),
            metrics.clone(),
            reports_tx,
        );
        let workers = session.spawn_workers(self.config.workers, inbound.clone());
        info!("Started {} crawl workers", self.config.workers);

        CrawlHandle {
            targets: targets_tx,
            reports: reports_rx,
            metrics,
            dedup,
            inbound,
            workers,
            health,
        }
    }

    /// Crawl targets handed out by the address book at `address` and send the
    /// results back, until the workers stop.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Once every worker has stopped.
    /// * `Err(io::Error)` - If the address book could not be reached at startup.
    pub async fn run(&self, address: impl Into<String>) -> Result<(), io::Error> {
        let CrawlHandle {
            targets,
            mut reports,
            metrics,
            ..
        } = self.start();

        let address = address.into();
        let link = AddressBookLink::connect(
            address.as_str(),
            self.config.reconnect_delay,
            self.config.address_book_timeout,
            targets,
            metrics.clone(),
        )
        .await?;
        info!("Crawling targets from address book at {address}");

        // Single consumer, reports go out in the order they were queued.
        while let Some(report) = reports.recv().await {
            if let Err(e) = link.report(&report).await {
                warn!("Dropping report for address book: {e}");
                metrics.record_report_dropped();
            }
        }

        info!("All crawl workers stopped");
        Ok(())
    }
}
