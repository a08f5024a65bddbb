use hdrhistogram::Histogram;
use std::time::Duration;

use crate::runner::BenchmarkResult;

/// Latency and cost collector for repeated runs of one step
pub struct Stats {
    // Latency histogram (microsecond precision, 1us to 10min)
    latency_hist: Histogram<u64>,

    pub run_count: u64,
    pub error_count: u64,
    total_cost: f64,
    result_counts: Vec<usize>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            latency_hist: Histogram::new_with_bounds(1, 600_000_000, 3)
                .expect("static histogram bounds are valid"),
            run_count: 0,
            error_count: 0,
            total_cost: 0.0,
            result_counts: Vec::new(),
        }
    }

    /// Record a successful run
    pub fn record(&mut self, result: &BenchmarkResult) {
        self.run_count += 1;
        self.total_cost += result.cost_units;
        self.result_counts.push(result.result_count);
        let us = (result.elapsed.as_micros() as u64).max(1);
        let _ = self.latency_hist.saturating_record(us);
    }

    /// Record a failed run
    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let h = &self.latency_hist;
        let empty = h.is_empty();
        let q = |p: f64| Duration::from_micros(if empty { 0 } else { h.value_at_quantile(p) });
        StatsSnapshot {
            run_count: self.run_count,
            error_count: self.error_count,
            latency_p50: q(0.5),
            latency_p95: q(0.95),
            latency_p99: q(0.99),
            latency_min: Duration::from_micros(if empty { 0 } else { h.min() }),
            latency_max: Duration::from_micros(if empty { 0 } else { h.max() }),
            latency_mean: Duration::from_secs_f64(if empty { 0.0 } else { h.mean() / 1e6 }),
            mean_cost: if self.run_count > 0 {
                self.total_cost / self.run_count as f64
            } else {
                0.0
            },
            counts_stable: self.result_counts.windows(2).all(|w| w[0] == w[1]),
        }
    }

    pub fn reset(&mut self) {
        self.run_count = 0;
        self.error_count = 0;
        self.total_cost = 0.0;
        self.result_counts.clear();
        self.latency_hist.reset();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub run_count: u64,
    pub error_count: u64,
    pub latency_p50: Duration,
    pub latency_p95: Duration,
    pub latency_p99: Duration,
    pub latency_min: Duration,
    pub latency_max: Duration,
    pub latency_mean: Duration,
    pub mean_cost: f64,
    /// Every run returned the same number of results.
    pub counts_stable: bool,
}

impl StatsSnapshot {
    /// One-line console summary
    pub fn summary(&self) -> String {
        format!(
            "{} runs ({} errors): p50 {:.2}ms, p95 {:.2}ms, p99 {:.2}ms, max {:.2}ms, mean RU {:.2}, result counts {}",
            self.run_count,
            self.error_count,
            ms(self.latency_p50),
            ms(self.latency_p95),
            ms(self.latency_p99),
            ms(self.latency_max),
            self.mean_cost,
            if self.counts_stable { "stable" } else { "varied" },
        )
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(ms: u64, count: usize, cost: f64) -> BenchmarkResult {
        BenchmarkResult {
            operation: "query",
            result_count: count,
            elapsed: Duration::from_millis(ms),
            cost_units: cost,
            pages: 1,
            page_item_counts: vec![count],
            continuation: None,
            body_excerpt: None,
            item: None,
        }
    }

    #[test]
    fn percentiles_and_cost() {
        let mut s = Stats::new();
        for ms in 1..=100 {
            s.record(&result(ms, 5, 3.0));
        }
        let snap = s.snapshot();
        assert_eq!(snap.run_count, 100);
        assert!(snap.counts_stable);
        assert!((snap.mean_cost - 3.0).abs() < 1e-9);
        let p50 = snap.latency_p50.as_millis();
        assert!((49..=51).contains(&p50), "p50 was {}", p50);
        assert!(snap.latency_p99 >= snap.latency_p95);
        assert!(snap.latency_max >= Duration::from_millis(99));
    }

    #[test]
    fn varying_counts_are_flagged() {
        let mut s = Stats::new();
        s.record(&result(2, 5, 1.0));
        s.record(&result(2, 6, 1.0));
        s.record_error();
        let snap = s.snapshot();
        assert!(!snap.counts_stable);
        assert_eq!(snap.error_count, 1);
        assert!(snap.summary().contains("varied"));
    }

    #[test]
    fn empty_collector_reports_zeroes() {
        let mut s = Stats::new();
        s.record(&result(5, 1, 1.0));
        s.reset();
        let snap = s.snapshot();
        assert_eq!(snap.run_count, 0);
        assert_eq!(snap.latency_p99, Duration::ZERO);
        assert_eq!(snap.mean_cost, 0.0);
    }
}
