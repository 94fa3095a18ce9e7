//! Crawl counters.
//!
//! Plain atomics shared by the workers, the address book link and the health
//! logger. Increments are relaxed, the counters are only ever read for logging.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CrawlMetrics {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    peers_reported: AtomicU64,
    reports_dropped: AtomicU64,
    malformed_commands: AtomicU64,
}

impl CrawlMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection attempt started.
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// An attempt completed its handshake.
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// An attempt failed to connect or handshake.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peers_reported(&self, count: usize) {
        self.peers_reported.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// A report could not be delivered to the address book.
    pub fn record_report_dropped(&self) {
        self.reports_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_command(&self) {
        self.malformed_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            peers_reported: self.peers_reported.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            malformed_commands: self.malformed_commands.load(Ordering::Relaxed),
        }
    }
}

/// Point in time copy of [`CrawlMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub peers_reported: u64,
    pub reports_dropped: u64,
    pub malformed_commands: u64,
}

impl MetricsSnapshot {
    /// Attempts which have not finished yet.
    pub fn in_flight(&self) -> u64 {
        self.attempts
            .saturating_sub(self.successes)
            .saturating_sub(self.failures)
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempts ({} ok, {} failed, {} in flight), {} peers reported, {} reports dropped, {} malformed commands",
            self.attempts,
            self.successes,
            self.failures,
            self.in_flight(),
            self.peers_reported,
            self.reports_dropped,
            self.malformed_commands,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = CrawlMetrics::new();
        metrics.record_attempt();
        metrics.record_attempt();
        metrics.record_attempt();
        metrics.record_success();
        metrics.record_failure();
        metrics.record_peers_reported(12);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 3);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.in_flight(), 1);
        assert_eq!(snapshot.peers_reported, 12);
        assert!(snapshot.to_string().starts_with("3 attempts (1 ok, 1 failed, 1 in flight)"));
    }
}
