//! Traffic counters of a buffered transport
//!
//! The pumps add every byte they move between the device and the rings.
//! Readers take a `TrafficSnapshot` and derive throughput from two of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Byte counters fed by the pumps (lock-free)
#[derive(Debug)]
pub struct TrafficStats {
    /// Bytes written to the device by the tx pump
    tx_total: AtomicU64,
    /// Bytes read from the device by the rx pump
    rx_total: AtomicU64,
    started: Instant,
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrafficSnapshot {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    /// Time since the counters were created
    pub elapsed: Duration,
}

impl TrafficStats {
    pub fn new() -> Self {
        Self {
            tx_total: AtomicU64::new(0),
            rx_total: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn add_tx(&self, bytes: usize) {
        self.tx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_rx(&self, bytes: usize) {
        self.rx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Bytes handed to the device so far
    #[inline]
    pub fn tx_bytes(&self) -> u64 {
        self.tx_total.load(Ordering::Relaxed)
    }

    /// Bytes pulled from the device so far
    #[inline]
    pub fn rx_bytes(&self) -> u64 {
        self.rx_total.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            tx_bytes: self.tx_bytes(),
            rx_bytes: self.rx_bytes(),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for TrafficStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficSnapshot {
    /// Throughput between `earlier` and this snapshot as (tx, rx) KiB/s
    ///
    /// Zero when no time passed in between.
    pub fn rates_since(&self, earlier: &TrafficSnapshot) -> (f64, f64) {
        let secs = self.elapsed.saturating_sub(earlier.elapsed).as_secs_f64();
        if secs <= 0.0 {
            return (0.0, 0.0);
        }
        let kib_s = |now: u64, before: u64| now.saturating_sub(before) as f64 / secs / 1024.0;
        (
            kib_s(self.tx_bytes, earlier.tx_bytes),
            kib_s(self.rx_bytes, earlier.rx_bytes),
        )
    }

    /// Average throughput since the counters were created
    pub fn average_rates(&self) -> (f64, f64) {
        self.rates_since(&TrafficSnapshot::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tx_bytes: u64, rx_bytes: u64, millis: u64) -> TrafficSnapshot {
        TrafficSnapshot {
            tx_bytes,
            rx_bytes,
            elapsed: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = TrafficStats::new();
        stats.add_tx(10);
        stats.add_tx(5);
        stats.add_rx(7);
        let snap = stats.snapshot();
        assert_eq!((snap.tx_bytes, snap.rx_bytes), (15, 7));
        assert_eq!(stats.tx_bytes(), 15);
    }

    #[test]
    fn test_rates_between_snapshots() {
        let earlier = snapshot(0, 1024, 1000);
        let later = snapshot(2048, 3072, 3000);
        assert_eq!(later.rates_since(&earlier), (1.0, 1.0));
        assert_eq!(later.average_rates(), (2048.0 / 3.0 / 1024.0, 1.0));
    }

    #[test]
    fn test_rates_without_elapsed_time() {
        let snap = snapshot(4096, 4096, 500);
        assert_eq!(snap.rates_since(&snap), (0.0, 0.0));
        assert_eq!(TrafficSnapshot::default().average_rates(), (0.0, 0.0));
    }
}
