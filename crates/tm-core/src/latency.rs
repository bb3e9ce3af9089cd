//! Histogram-based collector for ingestion latency (event time to local
//! receive time).
//!
//! Samples are milliseconds and may be negative when the exchange clock is
//! ahead of ours. Negative samples count toward min/avg and are tallied
//! separately as `skewed`; for percentiles they land in the first bin.
//!
//! The histogram uses fixed 1ms bins up to 5s (5000 bins). Samples above
//! 5s are clamped to the last bin.

/// Width of each histogram bin in milliseconds.
const BIN_WIDTH_MS: i64 = 1;

/// Number of histogram bins (covers 0-5s).
const NUM_BINS: usize = 5000;

/// Computed latency statistics.
#[derive(Debug, Clone, Copy)]
pub struct LatencyStats {
    pub count: u64,
    pub skewed: u64,
    pub min_ms: i64,
    pub max_ms: i64,
    pub avg_ms: f64,
    pub p50_ms: i64,
    pub p90_ms: i64,
    pub p99_ms: i64,
}

impl std::fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={} min={}ms max={}ms avg={:.1}ms p50={}ms p90={}ms p99={}ms skewed={}",
            self.count,
            self.min_ms,
            self.max_ms,
            self.avg_ms,
            self.p50_ms,
            self.p90_ms,
            self.p99_ms,
            self.skewed,
        )
    }
}

/// A histogram-based latency collector.
///
/// Not thread-safe: wrap in a mutex when shared.
pub struct LatencyCollector {
    bins: Vec<u64>,
    count: u64,
    skewed: u64,
    sum: i128,
    min: i64,
    max: i64,
}

impl LatencyCollector {
    /// Create a new, empty collector.
    pub fn new() -> Self {
        Self { bins: vec![0u64; NUM_BINS], count: 0, skewed: 0, sum: 0, min: i64::MAX, max: i64::MIN }
    }

    /// Record a latency sample in milliseconds.
    #[inline]
    pub fn record(&mut self, latency_ms: i64) {
        self.count += 1;
        self.sum += latency_ms as i128;
        self.min = self.min.min(latency_ms);
        self.max = self.max.max(latency_ms);
        if latency_ms < 0 {
            self.skewed += 1;
        }

        let bin = (latency_ms.max(0) / BIN_WIDTH_MS) as usize;
        let bin = bin.min(NUM_BINS - 1);
        self.bins[bin] += 1;
    }

    /// Returns the number of recorded samples.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Compute summary statistics. Returns `None` if no samples recorded.
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.count == 0 {
            return None;
        }

        Some(LatencyStats {
            count: self.count,
            skewed: self.skewed,
            min_ms: self.min,
            max_ms: self.max,
            avg_ms: self.sum as f64 / self.count as f64,
            p50_ms: self.percentile(0.50),
            p90_ms: self.percentile(0.90),
            p99_ms: self.percentile(0.99),
        })
    }

    /// Return the current statistics and start a new window.
    pub fn take_stats(&mut self) -> Option<LatencyStats> {
        let stats = self.stats();
        self.reset();
        stats
    }

    /// Reset all counters and bins.
    pub fn reset(&mut self) {
        self.bins.fill(0);
        self.count = 0;
        self.skewed = 0;
        self.sum = 0;
        self.min = i64::MAX;
        self.max = i64::MIN;
    }

    /// Compute the value at the given percentile (0.0-1.0).
    fn percentile(&self, pct: f64) -> i64 {
        let target = ((self.count as f64 * pct).ceil() as u64).max(1);
        let mut cumulative = 0u64;
        for (i, &count) in self.bins.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return (i as i64) * BIN_WIDTH_MS;
            }
        }
        self.max
    }
}

impl Default for LatencyCollector {
    fn default() -> Self {
        Self::new()
    }
}
