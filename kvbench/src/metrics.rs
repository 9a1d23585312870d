//! Latency accumulation and summary statistics.

use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

use crate::dispatcher::{Outcome, RawSample};

/// Error rate (percent) above which a run is flagged as degraded.
pub const DEGRADED_ERROR_RATE: f64 = 5.0;

/// Upper bound of the spill histogram: one hour, in nanoseconds.
const HISTOGRAM_MAX_NS: u64 = 3_600_000_000_000;
const HISTOGRAM_SIGFIG: u8 = 3;

// ────────────────────────────────────────────────────────────────────────────────
// Accumulator
// ────────────────────────────────────────────────────────────────────────────────

/// Collects raw samples for one worker (later: one merged pairing).
///
/// Successful latencies are kept exactly up to `ceiling` samples; beyond
/// that they move into an HDR histogram. Min, max, mean and variance are
/// tracked incrementally either way, so only percentiles become approximate.
pub struct OperationAccumulator {
    ceiling: usize,
    exact: Vec<f64>,
    histogram: Option<Histogram<u64>>,
    successes: u64,
    failures: u64,
    min_us: f64,
    max_us: f64,
    mean_us: f64,
    m2: f64,
    first_error: Option<String>,
}

impl OperationAccumulator {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
            exact: Vec::new(),
            histogram: None,
            successes: 0,
            failures: 0,
            min_us: f64::INFINITY,
            max_us: f64::NEG_INFINITY,
            mean_us: 0.0,
            m2: 0.0,
            first_error: None,
        }
    }

    pub fn record(&mut self, sample: &RawSample) {
        match &sample.outcome {
            Outcome::Success => self.record_success(sample.latency_us),
            Outcome::Failure(err) => {
                self.failures += 1;
                if self.first_error.is_none() {
                    self.first_error = Some(err.to_string());
                }
            }
        }
    }

    pub fn record_success(&mut self, latency_us: f64) {
        let latency_us = latency_us.max(0.0);
        self.successes += 1;
        self.min_us = self.min_us.min(latency_us);
        self.max_us = self.max_us.max(latency_us);
        let delta = latency_us - self.mean_us;
        self.mean_us += delta / self.successes as f64;
        self.m2 += delta * (latency_us - self.mean_us);

        match &mut self.histogram {
            Some(hist) => hist.saturating_record(to_ns(latency_us)),
            None => {
                self.exact.push(latency_us);
                if self.exact.len() > self.ceiling {
                    self.spill();
                }
            }
        }
    }

    /// Move exact samples into the histogram.
    fn spill(&mut self) {
        if self.histogram.is_some() {
            return;
        }
        // Bounds are constant and valid.
        let Ok(mut hist) = Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_NS, HISTOGRAM_SIGFIG)
        else {
            return;
        };
        for latency_us in self.exact.drain(..) {
            hist.saturating_record(to_ns(latency_us));
        }
        self.exact.shrink_to_fit();
        self.histogram = Some(hist);
    }

    /// Fold another worker's accumulator into this one.
    pub fn merge(&mut self, other: OperationAccumulator) {
        if other.successes > 0 {
            let n_a = self.successes as f64;
            let n_b = other.successes as f64;
            let n = n_a + n_b;
            let delta = other.mean_us - self.mean_us;
            self.mean_us += delta * n_b / n;
            self.m2 += other.m2 + delta * delta * n_a * n_b / n;
            self.min_us = self.min_us.min(other.min_us);
            self.max_us = self.max_us.max(other.max_us);
        }
        self.successes += other.successes;
        self.failures += other.failures;
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }

        let needs_histogram = self.histogram.is_some()
            || other.histogram.is_some()
            || self.exact.len() + other.exact.len() > self.ceiling;
        if !needs_histogram {
            self.exact.extend(other.exact);
            return;
        }
        self.spill();
        if let Some(hist) = &mut self.histogram {
            for latency_us in other.exact {
                hist.saturating_record(to_ns(latency_us));
            }
            if let Some(theirs) = other.histogram {
                let _ = hist.add(&theirs);
            }
        }
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn is_approximate(&self) -> bool {
        self.histogram.is_some()
    }
}

fn to_ns(latency_us: f64) -> u64 {
    ((latency_us * 1_000.0).round() as u64).max(1)
}

// ────────────────────────────────────────────────────────────────────────────────
// Summary statistics
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendMetrics {
    pub throughput_ops_sec: f64,
    pub min_us: f64,
    pub max_us: f64,
    pub avg_us: f64,
    pub stddev_us: f64,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    /// Percent of operations that failed.
    pub error_rate: f64,
    pub duration_sec: f64,
    pub successes: u64,
    pub failures: u64,
    /// Percentiles come from the HDR histogram rather than exact samples.
    pub approximate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
}

impl BackendMetrics {
    pub fn is_degraded(&self) -> bool {
        self.error_rate > DEGRADED_ERROR_RATE
    }

    pub fn total_ops(&self) -> u64 {
        self.successes + self.failures
    }
}

/// Percentile of an ascending slice by linear interpolation between the
/// two nearest ranks, `k = p/100 * (n - 1)`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let k = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = k.floor() as usize;
            let hi = k.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (k - lo as f64)
        }
    }
}

/// Reduce a finalized accumulator and the measured wall-clock duration.
///
/// Returns `None` when no operation succeeded.
pub fn aggregate(acc: OperationAccumulator, duration: Duration) -> Option<BackendMetrics> {
    if acc.successes == 0 {
        return None;
    }

    let duration_sec = duration.as_secs_f64();
    let throughput_ops_sec = if duration_sec > 0.0 {
        acc.successes as f64 / duration_sec
    } else {
        0.0
    };
    let stddev_us = if acc.successes > 1 {
        (acc.m2 / (acc.successes - 1) as f64).max(0.0).sqrt()
    } else {
        0.0
    };
    let error_rate = acc.failures as f64 / acc.total() as f64 * 100.0;

    let (min_us, max_us) = (acc.min_us, acc.max_us);
    let approximate = acc.histogram.is_some();
    let [p50_us, p95_us, p99_us] = match &acc.histogram {
        Some(hist) => [50.0, 95.0, 99.0].map(|p| {
            (hist.value_at_quantile(p / 100.0) as f64 / 1_000.0).clamp(min_us, max_us)
        }),
        None => {
            let mut sorted = acc.exact;
            sorted.sort_by(f64::total_cmp);
            [50.0, 95.0, 99.0].map(|p| percentile(&sorted, p))
        }
    };

    Some(BackendMetrics {
        throughput_ops_sec,
        min_us,
        max_us,
        avg_us: acc.mean_us,
        stddev_us,
        p50_us,
        p95_us,
        p99_us,
        error_rate,
        duration_sec,
        successes: acc.successes,
        failures: acc.failures,
        approximate,
        first_error: acc.first_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    fn success(latency_us: f64) -> RawSample {
        RawSample {
            latency_us,
            outcome: Outcome::Success,
        }
    }

    fn failure() -> RawSample {
        RawSample {
            latency_us: 1.0,
            outcome: Outcome::Failure(ClientError::WrongType),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_single_sample_collapses_all_statistics() {
        let mut acc = OperationAccumulator::new(100);
        acc.record(&success(42.0));
        let m = aggregate(acc, Duration::from_secs(1)).unwrap();
        for v in [m.min_us, m.max_us, m.avg_us, m.p50_us, m.p95_us, m.p99_us] {
            assert_eq!(v, 42.0);
        }
        assert_eq!(m.stddev_us, 0.0);
    }

    #[test]
    fn test_no_successes_is_no_samples() {
        let mut acc = OperationAccumulator::new(100);
        acc.record(&failure());
        assert!(aggregate(acc, Duration::from_secs(1)).is_none());
        assert!(aggregate(OperationAccumulator::new(100), Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_linear_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 50.0), 2.5);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 4.0);
        assert!(approx(percentile(&sorted, 99.0), 3.97));
    }

    #[test]
    fn test_statistics_over_successes_only() {
        let mut acc = OperationAccumulator::new(1_000);
        for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
            acc.record(&success(v));
        }
        acc.record(&failure());
        let m = aggregate(acc, Duration::from_millis(500)).unwrap();

        assert_eq!(m.successes, 5);
        assert_eq!(m.failures, 1);
        assert_eq!(m.min_us, 10.0);
        assert_eq!(m.max_us, 50.0);
        assert!(approx(m.avg_us, 30.0));
        // sample stddev of 10..50 step 10
        assert!(approx(m.stddev_us, 250f64.sqrt()));
        assert_eq!(m.p50_us, 30.0);
        assert!(approx(m.throughput_ops_sec, 10.0));
        assert!(approx(m.error_rate, 100.0 / 6.0));
        assert!(m.is_degraded());
        assert_eq!(m.first_error.as_deref(), Some(ClientError::WrongType.to_string().as_str()));
    }

    #[test]
    fn test_zero_duration_has_zero_throughput() {
        let mut acc = OperationAccumulator::new(10);
        acc.record(&success(1.0));
        let m = aggregate(acc, Duration::ZERO).unwrap();
        assert_eq!(m.throughput_ops_sec, 0.0);
    }

    #[test]
    fn test_percentiles_are_ordered() {
        let mut acc = OperationAccumulator::new(10_000);
        let mut x: u64 = 12345;
        for _ in 0..5_000 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            acc.record(&success((x >> 40) as f64 / 100.0));
        }
        let m = aggregate(acc, Duration::from_secs(1)).unwrap();
        assert!(m.min_us <= m.p50_us);
        assert!(m.p50_us <= m.p95_us);
        assert!(m.p95_us <= m.p99_us);
        assert!(m.p99_us <= m.max_us);
    }

    #[test]
    fn test_spills_past_ceiling() {
        let mut acc = OperationAccumulator::new(100);
        for i in 1..=1_000 {
            acc.record_success(i as f64);
        }
        assert!(acc.is_approximate());
        let m = aggregate(acc, Duration::from_secs(1)).unwrap();
        assert!(m.approximate);
        assert_eq!(m.min_us, 1.0);
        assert_eq!(m.max_us, 1_000.0);
        assert!(approx(m.avg_us, 500.5));
        // three significant figures
        assert!((m.p50_us - 500.0).abs() <= 1.0, "p50 {}", m.p50_us);
        assert!((m.p99_us - 990.0).abs() <= 2.0, "p99 {}", m.p99_us);
        assert!(m.p99_us <= m.max_us);
    }

    #[test]
    fn test_merge_matches_single_accumulator() {
        let values: Vec<f64> = (1..=200).map(|i| (i * 7 % 113) as f64 + 0.5).collect();

        let mut whole = OperationAccumulator::new(1_000);
        values.iter().for_each(|v| whole.record_success(*v));

        let mut left = OperationAccumulator::new(1_000);
        let mut right = OperationAccumulator::new(1_000);
        values[..73].iter().for_each(|v| left.record_success(*v));
        values[73..].iter().for_each(|v| right.record_success(*v));
        right.record(&failure());
        left.merge(right);

        let a = aggregate(whole, Duration::from_secs(2)).unwrap();
        let b = aggregate(left, Duration::from_secs(2)).unwrap();
        assert_eq!(b.successes, 200);
        assert_eq!(b.failures, 1);
        assert_eq!(a.min_us, b.min_us);
        assert_eq!(a.max_us, b.max_us);
        assert!(approx(a.avg_us, b.avg_us));
        assert!(approx(a.stddev_us, b.stddev_us));
        assert_eq!(a.p50_us, b.p50_us);
        assert_eq!(a.p99_us, b.p99_us);
        assert!(!b.approximate);
    }

    #[test]
    fn test_merge_spills_when_combined_exceeds_ceiling() {
        let mut a = OperationAccumulator::new(50);
        let mut b = OperationAccumulator::new(50);
        (0..40).for_each(|i| a.record_success(i as f64 + 1.0));
        (0..40).for_each(|i| b.record_success(i as f64 + 1.0));
        a.merge(b);
        assert!(a.is_approximate());
        assert_eq!(a.successes(), 80);
    }
}
