use std::time::{Duration, Instant};

use log::info;

/// Per-connection traffic counters.
#[derive(Debug, Clone)]
pub struct Stats {
    pub rx: u64,
    pub tx: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    window_rx: u64,
    t0: Instant,
    last: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            rx: 0,
            tx: 0,
            rx_bytes: 0,
            tx_bytes: 0,
            window_rx: 0,
            t0: Instant::now(),
            last: Instant::now(),
        }
    }
    pub fn add_rx(&mut self, n: usize) {
        self.rx += 1;
        self.window_rx += 1;
        self.rx_bytes += n as u64;
    }
    pub fn add_tx(&mut self, n: usize) {
        self.tx += 1;
        self.tx_bytes += n as u64;
    }

    pub fn maybe_log(&mut self, interval: Duration) {
        let window = self.last.elapsed();
        if window >= interval {
            let rate = (self.window_rx as f64) / window.as_secs_f64().max(1e-3);
            info!(
                "rx={} ({:.1} msg/s) tx={} rx_bytes={} tx_bytes={}",
                self.rx, rate, self.tx, self.rx_bytes, self.tx_bytes
            );
            self.window_rx = 0;
            self.last = Instant::now();
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "rx={} tx={} rx_bytes={} tx_bytes={} over {:.1}s",
            self.rx,
            self.tx,
            self.rx_bytes,
            self.tx_bytes,
            self.t0.elapsed().as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_messages_and_bytes() {
        let mut s = Stats::new();
        s.add_rx(10);
        s.add_rx(5);
        s.add_tx(3);
        assert_eq!((s.rx, s.rx_bytes), (2, 15));
        assert_eq!((s.tx, s.tx_bytes), (1, 3));
        assert!(s.summary().starts_with("rx=2 tx=1 rx_bytes=15 tx_bytes=3"));
    }

    #[test]
    fn window_resets_after_log() {
        let mut s = Stats::new();
        s.add_rx(1);
        s.maybe_log(Duration::ZERO);
        assert_eq!(s.window_rx, 0);
        assert_eq!(s.rx, 1);
    }
}
