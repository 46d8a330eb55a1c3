//! Latency tracking for join reconciliation
//!
//! Measures the round-trip time of join requests and estimates the one-way
//! latency, which is added to a PLAY position received on join.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Number of RTT samples to keep for averaging
const RTT_SAMPLE_COUNT: usize = 5;

/// Default latency estimate when no measurements exist
const DEFAULT_LATENCY_MS: u64 = 10;

/// Pending requests older than this are dropped
const PENDING_TTL: Duration = Duration::from_secs(30);

/// Tracks the round trip of request/response pairs with the coordinator
#[derive(Debug)]
pub struct LatencyTracker {
    /// Requests awaiting a response, keyed by request ID
    pending: HashMap<u64, Instant>,
    /// Recent RTT samples in milliseconds
    samples: Vec<u64>,
    /// Cached average RTT
    avg_rtt_ms: u64,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            samples: Vec::with_capacity(RTT_SAMPLE_COUNT),
            avg_rtt_ms: DEFAULT_LATENCY_MS * 2, // RTT = 2 * one-way
        }
    }
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget pending requests (samples are kept across sessions)
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Note that a request with this ID was just sent
    pub fn request_sent(&mut self, request_id: u64) {
        self.pending.retain(|_, sent_at| sent_at.elapsed() < PENDING_TTL);
        self.pending.insert(request_id, Instant::now());
    }

    /// Handle the response to a request. Returns the measured RTT if the
    /// request was pending.
    pub fn response_received(&mut self, request_id: u64) -> Option<Duration> {
        let sent_at = self.pending.remove(&request_id)?;
        let rtt = sent_at.elapsed();
        self.add_sample(rtt.as_millis() as u64);

        tracing::debug!(
            "Request {}: RTT={}ms, avg={}ms, one-way={}ms",
            request_id,
            rtt.as_millis(),
            self.avg_rtt_ms,
            self.one_way_latency_ms()
        );

        Some(rtt)
    }

    /// Estimated one-way latency in milliseconds (RTT / 2)
    pub fn one_way_latency_ms(&self) -> u64 {
        self.avg_rtt_ms / 2
    }

    pub fn one_way_latency(&self) -> Duration {
        Duration::from_millis(self.one_way_latency_ms())
    }

    fn add_sample(&mut self, rtt_ms: u64) {
        if self.samples.len() >= RTT_SAMPLE_COUNT {
            self.samples.remove(0);
        }
        self.samples.push(rtt_ms);

        let sum: u64 = self.samples.iter().sum();
        self.avg_rtt_ms = sum / self.samples.len() as u64;
    }
}

/// Thread-safe wrapper for LatencyTracker
pub type SharedLatencyTracker = Arc<RwLock<LatencyTracker>>;

/// Create a new shared latency tracker
pub fn new_shared_tracker() -> SharedLatencyTracker {
    Arc::new(RwLock::new(LatencyTracker::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_before_measurements() {
        let tracker = LatencyTracker::new();
        assert_eq!(tracker.one_way_latency_ms(), DEFAULT_LATENCY_MS);
    }

    #[test]
    fn test_round_trip_measurement() {
        let mut tracker = LatencyTracker::new();
        tracker.request_sent(1);
        std::thread::sleep(Duration::from_millis(40));

        let rtt = tracker.response_received(1).unwrap();

        assert!(rtt >= Duration::from_millis(40));
        assert!(tracker.one_way_latency_ms() >= 20);
    }

    #[test]
    fn test_unknown_response_ignored() {
        let mut tracker = LatencyTracker::new();
        assert!(tracker.response_received(42).is_none());
        tracker.request_sent(1);
        tracker.clear_pending();
        assert!(tracker.response_received(1).is_none());
    }

    #[test]
    fn test_averaging() {
        let mut tracker = LatencyTracker::new();
        tracker.add_sample(100);
        tracker.add_sample(200);
        tracker.add_sample(150);

        // (100+200+150)/3 = 150, one-way = 75
        assert_eq!(tracker.avg_rtt_ms, 150);
        assert_eq!(tracker.one_way_latency_ms(), 75);
    }

    #[test]
    fn test_samples_window() {
        let mut tracker = LatencyTracker::new();
        for _ in 0..RTT_SAMPLE_COUNT {
            tracker.add_sample(1_000);
        }
        for _ in 0..RTT_SAMPLE_COUNT {
            tracker.add_sample(10);
        }
        assert_eq!(tracker.avg_rtt_ms, 10);
    }
}
