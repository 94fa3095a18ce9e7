//! Suppresses peers reported recently.
//!
//! Nodes hand out largely the same addresses over and over, the cache keeps
//! those from flooding the address book. Entries are overwritten on emit and
//! never evicted.

use chia_peers_connection::Peer;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default time a peer stays suppressed after being reported.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(5 * 60);

/// Last time each `(host, port)` was reported.
#[derive(Debug)]
pub struct DedupCache {
    ttl: Duration,
    seen: Mutex<HashMap<(String, u16), Instant>>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the peer should be reported at `now`.
    ///
    /// Returns true, and records `now`, if the peer was never reported or was
    /// last reported more than the ttl before `now`.
    pub async fn should_emit(&self, host: &str, port: u16, now: Instant) -> bool {
        let mut seen = self.seen.lock().await;
        Self::check_and_set(&mut seen, self.ttl, host, port, now)
    }

    /// Keep the peers of a batch which should be reported, in order.
    ///
    /// Duplicates within the batch are suppressed as well.
    pub async fn filter(&self, peers: Vec<Peer>, now: Instant) -> Vec<Peer> {
        let mut seen = self.seen.lock().await;
        peers
            .into_iter()
            .filter(|peer| Self::check_and_set(&mut seen, self.ttl, &peer.host, peer.port, now))
            .collect()
    }

    /// Number of peers ever recorded.
    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.seen.lock().await.is_empty()
    }

    fn check_and_set(
        seen: &mut HashMap<(String, u16), Instant>,
        ttl: Duration,
        host: &str,
        port: u16,
        now: Instant,
    ) -> bool {
        let key = (host.to_string(), port);
        let expired = match seen.get(&key) {
            Some(last) => now.saturating_duration_since(*last) > ttl,
            None => true,
        };
        if expired {
            seen.insert(key, now);
        }
        expired
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}
