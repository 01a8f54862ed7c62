//! Shared metrics — atomic counters for observability.
//!
//! Wrapped in `Arc<Metrics>` and passed to the dispatcher, forwarder, and
//! tunnel. No external crate needed — we format Prometheus exposition text
//! manually.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared metrics counters, all lock-free via AtomicU64.
pub struct Metrics {
    // ─── Connections ─────────────────────────────────────────────────────
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,

    // ─── Auth ────────────────────────────────────────────────────────────
    pub auth_allowed: AtomicU64,
    pub auth_denied: AtomicU64,

    // ─── Parsing ─────────────────────────────────────────────────────────
    pub bad_requests: AtomicU64,

    // ─── Routing ─────────────────────────────────────────────────────────
    pub forwards_total: AtomicU64,
    pub tunnels_total: AtomicU64,
    pub origin_unreachable: AtomicU64,

    // ─── Bytes relayed ───────────────────────────────────────────────────
    pub bytes_client_to_origin: AtomicU64,
    pub bytes_origin_to_client: AtomicU64,
}

impl Metrics {
    /// Create a new Metrics instance with zeroed counters.
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            auth_allowed: AtomicU64::new(0),
            auth_denied: AtomicU64::new(0),
            bad_requests: AtomicU64::new(0),
            forwards_total: AtomicU64::new(0),
            tunnels_total: AtomicU64::new(0),
            origin_unreachable: AtomicU64::new(0),
            bytes_client_to_origin: AtomicU64::new(0),
            bytes_origin_to_client: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1 and return the previous value.
    #[inline]
    pub fn inc(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Add `n` to a counter.
    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Decrement a counter by 1 (saturating).
    #[inline]
    pub fn dec(counter: &AtomicU64) {
        counter.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_are_zero() {
        let m = Metrics::new();
        assert_eq!(m.connections_total.load(Ordering::Relaxed), 0);
        assert_eq!(m.tunnels_total.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn inc_returns_previous_value() {
        let m = Metrics::new();
        assert_eq!(Metrics::inc(&m.connections_total), 0);
        assert_eq!(m.connections_total.load(Ordering::Relaxed), 1);
        assert_eq!(Metrics::inc(&m.connections_total), 1);
    }

    #[test]
    fn dec_saturates_down() {
        let m = Metrics::new();
        Metrics::inc(&m.connections_active);
        Metrics::dec(&m.connections_active);
        assert_eq!(m.connections_active.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn add_accumulates() {
        let m = Metrics::new();
        Metrics::add(&m.bytes_client_to_origin, 4096);
        Metrics::add(&m.bytes_client_to_origin, 10);
        assert_eq!(m.bytes_client_to_origin.load(Ordering::Relaxed), 4106);
    }
}
