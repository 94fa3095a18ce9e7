//! Internal session coordination for crawling operations.
//!
//! This module contains the [`CrawlSession`] which runs the worker pool. Each
//! worker pulls a target from the shared inbound queue, crawls it and pushes
//! reports onto the outbound queue. Full queues block, nothing is shed.

use crate::connection::{ConnectionSession, Connector};
use crate::dedup::DedupCache;
use crate::ipc::Report;
use crate::metrics::CrawlMetrics;
use chia_peers_connection::Peer;
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout_at;

/// Inbound queue shared by all workers.
pub type SharedInbound = Arc<Mutex<mpsc::Receiver<Peer>>>;

/// Configuration for a crawl session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on the whole attempt: connect, handshake and discovery.
    pub attempt_timeout: Duration,
    /// Bound on each peer request round.
    pub peer_timeout: Duration,
    pub peer_request_rounds: usize,
}

/// Result of processing a single peer in the crawler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskResult {
    /// Successfully connected and found peers.
    FoundPeers,
    /// Successfully connected but no new peers.
    NoPeersFound,
    /// Failed to connect to the peer.
    ConnectionFailed,
    /// Task exited early due to channel closure.
    ChannelClosed,
}

/// Internal coordinator for a crawling session.
///
/// # Architecture
///
/// The session is cloned into every worker.
///
/// * **Workers** (`work()`) - Pull targets until the inbound queue closes.
/// * **Processors** (`process()`) - Handle one target, connect and discover.
#[derive(Debug, Clone)]
pub struct CrawlSession<C> {
    config: SessionConfig,
    connector: C,
    dedup: Arc<DedupCache>,
    metrics: Arc<CrawlMetrics>,
    /// Channel for sending reports to the address book.
    reports: mpsc::Sender<Report>,
}

impl<C: Connector> CrawlSession<C> {
    pub fn new(
        config: SessionConfig,
        connector: C,
        dedup: Arc<DedupCache>,
        metrics: Arc<CrawlMetrics>,
        reports: mpsc::Sender<Report>,
    ) -> Self {
        Self {
            config,
            connector,
            dedup,
            metrics,
            reports,
        }
    }

    /// Spawn `count` workers on the shared inbound queue.
    pub fn spawn_workers(&self, count: usize, inbound: SharedInbound) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|_| tokio::spawn(self.clone().work(inbound.clone())))
            .collect()
    }

    /// Process targets until the inbound queue closes or reports can't be delivered.
    pub async fn work(self, inbound: SharedInbound) {
        loop {
            let peer = {
                let mut inbound = inbound.lock().await;
                inbound.recv().await
            };
            let Some(peer) = peer else {
                debug!("Inbound queue closed, worker stopping");
                return;
            };

            let result = self.process(peer).await;
            debug!("Task completed with result: {result:?}");
            if result == TaskResult::ChannelClosed {
                debug!("Report queue closed, worker stopping");
                return;
            }
        }
    }

    /// Processes a single peer: handshake, then peer discovery.
    ///
    /// # Returns
    ///
    /// A `TaskResult` indicating what happened during processing.
    pub(crate) async fn process(&self, peer: Peer) -> TaskResult {
        debug!("Processing peer {peer}");
        self.metrics.record_attempt();

        // Connecting, handshake and discovery share one deadline.
        let deadline = tokio::time::Instant::now() + self.config.attempt_timeout;
        let connection = match timeout_at(deadline, self.connector.connect(&peer)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                debug!("Failed to connect to {peer}: {e}");
                self.metrics.record_failure();
                return TaskResult::ConnectionFailed;
            }
            Err(_) => {
                debug!("Timed out connecting to {peer}");
                self.metrics.record_failure();
                return TaskResult::ConnectionFailed;
            }
        };

        let Some(mut session) = ConnectionSession::new(connection) else {
            debug!("Connection to {peer} has no handshake");
            self.metrics.record_failure();
            return TaskResult::ConnectionFailed;
        };
        self.metrics.record_success();

        if self
            .reports
            .send(Report::Handshake(session.node().clone()))
            .await
            .is_err()
        {
            // Receiver dropped, stop processing.
            return TaskResult::ChannelClosed;
        }

        session
            .discover(
                self.config.peer_request_rounds,
                self.config.peer_timeout,
                deadline,
            )
            .await;
        let records = session.close().await;
        let discovered: Vec<Peer> = records.iter().map(Peer::from).collect();

        let fresh = self.dedup.filter(discovered, Instant::now()).await;
        if fresh.is_empty() {
            return TaskResult::NoPeersFound;
        }

        debug!("Reporting {} new peers from {peer}", fresh.len());
        self.metrics.record_peers_reported(fresh.len());
        if self.reports.send(Report::Peers(fresh)).await.is_err() {
            return TaskResult::ChannelClosed;
        }
        TaskResult::FoundPeers
    }
}

/// Periodically log crawl progress.
///
/// The task holds only weak handles on the queues and stops once both are gone.
pub fn spawn_health_logger(
    interval: Duration,
    inbound: mpsc::WeakSender<Peer>,
    outbound: mpsc::WeakSender<Report>,
    metrics: Arc<CrawlMetrics>,
    dedup: Arc<DedupCache>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let inbound = inbound.upgrade();
            let outbound = outbound.upgrade();
            if inbound.is_none() && outbound.is_none() {
                debug!("Crawl queues closed, health logger stopping");
                return;
            }

            let cached = dedup.len().await;
            info!(
                "{}, inbound queue {}, outbound queue {}, {cached} peers in dedup cache",
                metrics.snapshot(),
                queue_depth(inbound.as_ref()),
                queue_depth(outbound.as_ref()),
            );
        }
    })
}

fn queue_depth<T>(sender: Option<&mpsc::Sender<T>>) -> String {
    match sender {
        Some(sender) => format!(
            "{}/{}",
            sender.max_capacity() - sender.capacity(),
            sender.max_capacity()
        ),
        None => "closed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_utils::{peer_record, MockConnector, MockPeerConnection};

    fn config() -> SessionConfig {
        SessionConfig {
            attempt_timeout: Duration::from_millis(100),
            peer_timeout: Duration::from_millis(100),
            peer_request_rounds: 3,
        }
    }

    fn session(
        connector: MockConnector,
    ) -> (
        CrawlSession<MockConnector>,
        mpsc::Receiver<Report>,
        Arc<CrawlMetrics>,
    ) {
        session_with(config(), connector)
    }

    fn session_with(
        config: SessionConfig,
        connector: MockConnector,
    ) -> (
        CrawlSession<MockConnector>,
        mpsc::Receiver<Report>,
        Arc<CrawlMetrics>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let metrics = Arc::new(CrawlMetrics::new());
        let session = CrawlSession::new(
            config,
            connector,
            Arc::new(DedupCache::default()),
            metrics.clone(),
            tx,
        );
        (session, rx, metrics)
    }

    #[tokio::test]
    async fn test_process_reports_handshake_then_peers() {
        let target = Peer::new("10.0.0.1", 8444);
        let connector = MockConnector::new();
        let mut conn = MockPeerConnection::new(&target);
        conn.add_response(vec![peer_record("10.0.0.2", 8444), peer_record("10.0.0.3", 8444)]);
        conn.add_response(vec![peer_record("10.0.0.2", 8444)]);
        conn.add_response(vec![]);
        connector.add_connection(target.clone(), conn);

        let (session, mut reports, metrics) = session(connector);
        assert_eq!(session.process(target.clone()).await, TaskResult::FoundPeers);

        match reports.recv().await.unwrap() {
            Report::Handshake(node) => assert_eq!(node.peer, target),
            other => panic!("Expected handshake report, got {other:?}"),
        }
        assert_eq!(
            reports.recv().await.unwrap(),
            Report::Peers(vec![Peer::new("10.0.0.2", 8444), Peer::new("10.0.0.3", 8444)])
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 0);
        assert_eq!(snapshot.peers_reported, 2);
    }

    #[tokio::test]
    async fn test_process_connection_failure() {
        let (session, mut reports, metrics) = session(MockConnector::new());

        assert_eq!(
            session.process(Peer::new("10.0.0.1", 8444)).await,
            TaskResult::ConnectionFailed
        );
        assert!(reports.try_recv().is_err());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(snapshot.failures, 1);
    }

    #[tokio::test]
    async fn test_process_attempt_timeout() {
        let target = Peer::new("10.0.0.1", 8444);
        let connector = MockConnector::new();
        connector.add_hanging(target.clone());
        let (session, _reports, metrics) = session(connector);

        assert_eq!(session.process(target).await, TaskResult::ConnectionFailed);
        assert_eq!(metrics.snapshot().failures, 1);
    }

    #[tokio::test]
    async fn test_process_attempt_timeout_bounds_discovery() {
        let target = Peer::new("10.0.0.1", 8444);
        let connector = MockConnector::new();
        let mut conn = MockPeerConnection::new(&target);
        // One answer, then the node goes quiet.
        conn.add_response(vec![peer_record("10.0.0.2", 8444)]);
        connector.add_connection(target.clone(), conn);
        let config = SessionConfig {
            attempt_timeout: Duration::from_millis(100),
            peer_timeout: Duration::from_millis(1500),
            peer_request_rounds: 3,
        };
        let (session, mut reports, _metrics) = session_with(config, connector);

        let start = Instant::now();
        assert_eq!(session.process(target).await, TaskResult::FoundPeers);
        assert!(start.elapsed() < Duration::from_millis(1000));

        assert!(matches!(reports.recv().await, Some(Report::Handshake(_))));
        assert_eq!(
            reports.recv().await.unwrap(),
            Report::Peers(vec![Peer::new("10.0.0.2", 8444)])
        );
    }

    #[tokio::test]
    async fn test_process_missing_handshake_is_failure() {
        let target = Peer::new("10.0.0.1", 8444);
        let connector = MockConnector::new();
        let mut conn = MockPeerConnection::new(&target);
        conn.node = None;
        connector.add_connection(target.clone(), conn);
        let (session, mut reports, metrics) = session(connector);

        assert_eq!(session.process(target).await, TaskResult::ConnectionFailed);
        assert!(reports.try_recv().is_err());
        assert_eq!(metrics.snapshot().successes, 0);
    }

    #[tokio::test]
    async fn test_process_without_new_peers_reports_only_handshake() {
        let target = Peer::new("10.0.0.1", 8444);
        let connector = MockConnector::new();
        connector.add_connection(target.clone(), MockPeerConnection::new(&target));
        let (session, mut reports, _metrics) = session(connector);

        assert_eq!(session.process(target).await, TaskResult::NoPeersFound);
        assert!(matches!(reports.recv().await, Some(Report::Handshake(_))));
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_process_dedups_across_sessions() {
        let first = Peer::new("10.0.0.1", 8444);
        let second = Peer::new("10.0.0.9", 8444);
        let connector = MockConnector::new();
        for target in [&first, &second] {
            let mut conn = MockPeerConnection::new(target);
            conn.add_response(vec![peer_record("10.0.0.2", 8444)]);
            conn.add_response(vec![]);
            connector.add_connection(target.clone(), conn);
        }
        let (session, mut reports, _metrics) = session(connector);

        assert_eq!(session.process(first).await, TaskResult::FoundPeers);
        assert_eq!(session.process(second).await, TaskResult::NoPeersFound);

        let mut peer_reports = 0;
        while let Ok(report) = reports.try_recv() {
            if matches!(report, Report::Peers(_)) {
                peer_reports += 1;
            }
        }
        assert_eq!(peer_reports, 1);
    }

    #[tokio::test]
    async fn test_process_closed_report_queue() {
        let target = Peer::new("10.0.0.1", 8444);
        let connector = MockConnector::new();
        connector.add_connection(target.clone(), MockPeerConnection::new(&target));
        let (session, reports, _metrics) = session(connector);
        drop(reports);

        assert_eq!(session.process(target).await, TaskResult::ChannelClosed);
    }

    #[tokio::test]
    async fn test_workers_drain_inbound_queue() {
        let connector = MockConnector::new();
        let targets: Vec<Peer> = (1..=4)
            .map(|i| Peer::new(format!("10.0.1.{i}"), 8444))
            .collect();
        for target in &targets {
            connector.add_connection(target.clone(), MockPeerConnection::new(target));
        }
        let (session, mut reports, metrics) = session(connector);

        let (tx, rx) = mpsc::channel(4);
        let workers = session.spawn_workers(2, Arc::new(Mutex::new(rx)));
        drop(session);
        for target in targets {
            tx.send(target).await.unwrap();
        }
        drop(tx);

        for worker in workers {
            worker.await.unwrap();
        }
        let mut handshakes = 0;
        while let Some(report) = reports.recv().await {
            assert!(matches!(report, Report::Handshake(_)));
            handshakes += 1;
        }
        assert_eq!(handshakes, 4);
        assert_eq!(metrics.snapshot().successes, 4);
    }
}
