//! Running totals surfaced on the periodic statistics summary (§6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Lock-free counters updated from worker tasks; read back by the
/// maintenance loop to print and log a summary every
/// `STATS_INTERVAL`.
#[derive(Default)]
pub struct Stats {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    bytes_served: AtomicU64,
    total_response_time_ms: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, bytes_served: u64, response_time_ms: u64, was_hit: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if was_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_served.fetch_add(bytes_served, Ordering::Relaxed);
        self.total_response_time_ms
            .fetch_add(response_time_ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Snapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let bytes_served = self.bytes_served.load(Ordering::Relaxed);
        let total_response_time_ms = self.total_response_time_ms.load(Ordering::Relaxed);

        let avg_response_time_ms = if total_requests > 0 {
            total_response_time_ms as f64 / total_requests as f64
        } else {
            0.0
        };
        let hit_rate = if total_requests > 0 {
            cache_hits as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };
        let miss_rate = if total_requests > 0 {
            cache_misses as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };

        Snapshot {
            total_requests,
            cache_hits,
            cache_misses,
            bytes_served,
            avg_response_time_ms,
            hit_rate,
            miss_rate,
        }
    }

    /// Prints the textual summary to stdout and emits the matching
    /// structured `tracing` event, per §6 and SPEC_FULL §10.1. Field
    /// names and units (bytes served in MB, cache size in bytes and
    /// MB, hit/miss percentages) follow the reference's `print_stats`
    /// verbatim.
    pub fn print_summary(&self, cache_size_bytes: usize, pool_connections: usize) {
        let s = self.snapshot();
        let cache_size_mb = cache_size_bytes as f64 / (1024.0 * 1024.0);
        let bytes_served_mb = s.bytes_served / (1024 * 1024);

        println!("=== Performance Statistics ===");
        println!("Total Requests: {}", s.total_requests);
        println!("Cache Hits: {} ({:.2}%)", s.cache_hits, s.hit_rate);
        println!("Cache Misses: {} ({:.2}%)", s.cache_misses, s.miss_rate);
        println!("Bytes Served: {bytes_served_mb} MB");
        println!("Average Response Time: {:.2} ms", s.avg_response_time_ms);
        println!("Cache Size: {cache_size_bytes} bytes ({cache_size_mb:.2} MB)");
        println!("Pooled upstreams: {pool_connections}");

        info!(
            total_requests = s.total_requests,
            cache_hits = s.cache_hits,
            cache_misses = s.cache_misses,
            hit_rate_pct = s.hit_rate,
            miss_rate_pct = s.miss_rate,
            bytes_served = s.bytes_served,
            avg_response_time_ms = s.avg_response_time_ms,
            cache_size_bytes = cache_size_bytes,
            pooled_upstreams = pool_connections,
            "stats summary"
        );
    }
}

struct Snapshot {
    total_requests: u64,
    cache_hits: u64,
    cache_misses: u64,
    bytes_served: u64,
    avg_response_time_ms: f64,
    hit_rate: f64,
    miss_rate: f64,
}

/// Interval on which `Engine::run_stats_loop` emits a summary.
pub const SUMMARY_INTERVAL: Duration = crate::config::STATS_INTERVAL;
