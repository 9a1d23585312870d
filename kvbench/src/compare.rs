//! Relative performance of backend A against backend B for one scenario.

use std::fmt;

use serde::Serialize;

use crate::error::ScenarioRunError;
use crate::metrics::BackendMetrics;
use crate::scenario::Operation;

/// Throughput difference (percent) a backend needs to be declared winner.
pub const WIN_THRESHOLD_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Winner {
    A,
    B,
    Tie,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::A => f.write_str("A"),
            Winner::B => f.write_str("B"),
            Winner::Tie => f.write_str("Tie"),
        }
    }
}

/// Why a backend produced no metrics for a scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbsentReason {
    Unreachable { message: String },
    SetupFailed { message: String },
    Timeout { operation: Operation, timeout_secs: f64 },
    /// Every measured operation failed.
    NoSamples { failures: u64 },
    Aborted,
    WorkerFailed { message: String },
}

impl From<ScenarioRunError> for AbsentReason {
    fn from(err: ScenarioRunError) -> Self {
        match err {
            ScenarioRunError::Connection(e) => AbsentReason::Unreachable {
                message: e.to_string(),
            },
            ScenarioRunError::Setup(e) => AbsentReason::SetupFailed {
                message: e.to_string(),
            },
            ScenarioRunError::Timeout { operation, timeout } => AbsentReason::Timeout {
                operation,
                timeout_secs: timeout.as_secs_f64(),
            },
            ScenarioRunError::Aborted => AbsentReason::Aborted,
            ScenarioRunError::WorkerFailed(message) => AbsentReason::WorkerFailed { message },
        }
    }
}

impl fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsentReason::Unreachable { message } => write!(f, "unreachable: {message}"),
            AbsentReason::SetupFailed { message } => write!(f, "setup failed: {message}"),
            AbsentReason::Timeout {
                operation,
                timeout_secs,
            } => write!(f, "{operation} timed out after {timeout_secs}s"),
            AbsentReason::NoSamples { failures } => {
                write!(f, "no successful operations ({failures} failed)")
            }
            AbsentReason::Aborted => f.write_str("aborted"),
            AbsentReason::WorkerFailed { message } => write!(f, "worker failed: {message}"),
        }
    }
}

/// One backend's result for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendOutcome {
    Completed {
        backend: String,
        metrics: BackendMetrics,
        degraded: bool,
    },
    Absent {
        backend: String,
        reason: AbsentReason,
    },
}

impl BackendOutcome {
    pub fn completed(backend: impl Into<String>, metrics: BackendMetrics) -> Self {
        let degraded = metrics.is_degraded();
        BackendOutcome::Completed {
            backend: backend.into(),
            metrics,
            degraded,
        }
    }

    pub fn absent(backend: impl Into<String>, reason: AbsentReason) -> Self {
        BackendOutcome::Absent {
            backend: backend.into(),
            reason,
        }
    }

    pub fn backend(&self) -> &str {
        match self {
            BackendOutcome::Completed { backend, .. } | BackendOutcome::Absent { backend, .. } => {
                backend
            }
        }
    }

    pub fn metrics(&self) -> Option<&BackendMetrics> {
        match self {
            BackendOutcome::Completed { metrics, .. } => Some(metrics),
            BackendOutcome::Absent { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, BackendOutcome::Completed { degraded: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    /// `(a - b) / b * 100` on throughput; undefined when either side is
    /// absent or B has no throughput.
    pub pct_diff: Option<f64>,
    pub winner: Option<Winner>,
    /// `(b - a) / b * 100`: positive means A has the lower latency.
    pub p50_latency_pct_diff: Option<f64>,
    pub p99_latency_pct_diff: Option<f64>,
    pub verdict: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioComparison {
    #[serde(rename = "name")]
    pub scenario_name: String,
    pub description: Option<String>,
    pub backend_a: BackendOutcome,
    pub backend_b: BackendOutcome,
    pub comparison: Comparison,
}

impl ScenarioComparison {
    pub fn new(
        scenario_name: impl Into<String>,
        description: Option<String>,
        backend_a: BackendOutcome,
        backend_b: BackendOutcome,
    ) -> Self {
        let comparison = compare(&backend_a, &backend_b);
        Self {
            scenario_name: scenario_name.into(),
            description,
            backend_a,
            backend_b,
            comparison,
        }
    }
}

pub fn throughput_pct_diff(a: f64, b: f64) -> Option<f64> {
    (b > 0.0).then(|| (a - b) / b * 100.0)
}

fn latency_pct_diff(a: f64, b: f64) -> Option<f64> {
    (b > 0.0).then(|| (b - a) / b * 100.0)
}

pub fn decide_winner(pct_diff: f64) -> Winner {
    if pct_diff > WIN_THRESHOLD_PCT {
        Winner::A
    } else if pct_diff < -WIN_THRESHOLD_PCT {
        Winner::B
    } else {
        Winner::Tie
    }
}

pub fn compare(a: &BackendOutcome, b: &BackendOutcome) -> Comparison {
    let (name_a, name_b) = (a.backend(), b.backend());
    match (a, b) {
        (
            BackendOutcome::Completed { metrics: ma, .. },
            BackendOutcome::Completed { metrics: mb, .. },
        ) => {
            let pct_diff = throughput_pct_diff(ma.throughput_ops_sec, mb.throughput_ops_sec);
            let winner = match pct_diff {
                Some(pct) => decide_winner(pct),
                None if ma.throughput_ops_sec > 0.0 => Winner::A,
                None => Winner::Tie,
            };
            let verdict = match (winner, pct_diff) {
                (Winner::A, Some(pct)) => {
                    format!("{name_a} is {pct:.1}% faster than {name_b}")
                }
                (Winner::A, None) => format!("{name_a} wins; {name_b} has no throughput"),
                (Winner::B, Some(pct)) => {
                    format!("{name_b} is faster; {name_a} throughput is {:.1}% lower", -pct)
                }
                (Winner::Tie, Some(pct)) => {
                    format!("tie: throughput within ±{WIN_THRESHOLD_PCT}% ({pct:+.1}%)")
                }
                _ => "tie: neither backend has throughput".to_string(),
            };
            Comparison {
                pct_diff,
                winner: Some(winner),
                p50_latency_pct_diff: latency_pct_diff(ma.p50_us, mb.p50_us),
                p99_latency_pct_diff: latency_pct_diff(ma.p99_us, mb.p99_us),
                verdict,
            }
        }
        (BackendOutcome::Completed { .. }, BackendOutcome::Absent { reason, .. }) => {
            by_default(Winner::A, format!("{name_a} wins by default; {name_b} {reason}"))
        }
        (BackendOutcome::Absent { reason, .. }, BackendOutcome::Completed { .. }) => {
            by_default(Winner::B, format!("{name_b} wins by default; {name_a} {reason}"))
        }
        (BackendOutcome::Absent { .. }, BackendOutcome::Absent { .. }) => Comparison {
            pct_diff: None,
            winner: None,
            p50_latency_pct_diff: None,
            p99_latency_pct_diff: None,
            verdict: "no result from either backend".to_string(),
        },
    }
}

fn by_default(winner: Winner, verdict: String) -> Comparison {
    Comparison {
        pct_diff: None,
        winner: Some(winner),
        p50_latency_pct_diff: None,
        p99_latency_pct_diff: None,
        verdict,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    pub(crate) fn metrics(throughput: f64, p50: f64, p99: f64) -> BackendMetrics {
        BackendMetrics {
            throughput_ops_sec: throughput,
            min_us: p50 / 2.0,
            max_us: p99 * 2.0,
            avg_us: p50,
            stddev_us: 1.0,
            p50_us: p50,
            p95_us: (p50 + p99) / 2.0,
            p99_us: p99,
            error_rate: 0.0,
            duration_sec: 1.0,
            successes: throughput as u64,
            failures: 0,
            approximate: false,
            first_error: None,
        }
    }

    fn done(name: &str, throughput: f64) -> BackendOutcome {
        BackendOutcome::completed(name, metrics(throughput, 100.0, 400.0))
    }

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(decide_winner(5.0), Winner::Tie);
        assert_eq!(decide_winner(-5.0), Winner::Tie);
        assert_eq!(decide_winner(5.01), Winner::A);
        assert_eq!(decide_winner(-5.01), Winner::B);
        assert_eq!(decide_winner(0.0), Winner::Tie);
    }

    #[test]
    fn test_pct_diff_and_winner() {
        let c = compare(&done("a", 1_200.0), &done("b", 1_000.0));
        assert!((c.pct_diff.unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(c.winner, Some(Winner::A));
        assert_eq!(c.p50_latency_pct_diff, Some(0.0));
        assert!(c.verdict.contains("20.0% faster"));

        let c = compare(&done("a", 1_030.0), &done("b", 1_000.0));
        assert_eq!(c.winner, Some(Winner::Tie));
    }

    #[test]
    fn test_swapping_sides_flips_sign_and_winner() {
        for (x, y) in [(1_500.0, 1_000.0), (900.0, 1_000.0), (1_000.0, 1_020.0)] {
            let ab = compare(&done("a", x), &done("b", y));
            let ba = compare(&done("b", y), &done("a", x));
            let (d1, d2) = (ab.pct_diff.unwrap(), ba.pct_diff.unwrap());
            assert!(d1.signum() == -d2.signum(), "{d1} vs {d2}");
            match ab.winner.unwrap() {
                Winner::A => assert_eq!(ba.winner, Some(Winner::B)),
                Winner::B => assert_eq!(ba.winner, Some(Winner::A)),
                Winner::Tie => assert_eq!(ba.winner, Some(Winner::Tie)),
            }
        }
    }

    #[test]
    fn test_latency_diff_positive_when_a_is_lower() {
        let a = BackendOutcome::completed("a", metrics(1_000.0, 50.0, 200.0));
        let b = BackendOutcome::completed("b", metrics(1_000.0, 100.0, 400.0));
        let c = compare(&a, &b);
        assert_eq!(c.p50_latency_pct_diff, Some(50.0));
        assert_eq!(c.p99_latency_pct_diff, Some(50.0));
    }

    #[test]
    fn test_absent_side_loses() {
        let absent = BackendOutcome::absent(
            "b",
            AbsentReason::Unreachable {
                message: "refused".into(),
            },
        );
        let c = compare(&done("a", 10.0), &absent);
        assert_eq!(c.winner, Some(Winner::A));
        assert_eq!(c.pct_diff, None);

        let c = compare(&absent, &done("a", 10.0));
        assert_eq!(c.winner, Some(Winner::B));

        let c = compare(&absent, &absent);
        assert_eq!(c.winner, None);
    }

    #[test]
    fn test_zero_throughput_on_b() {
        let c = compare(&done("a", 10.0), &done("b", 0.0));
        assert_eq!(c.pct_diff, None);
        assert_eq!(c.winner, Some(Winner::A));
        let c = compare(&done("a", 0.0), &done("b", 0.0));
        assert_eq!(c.winner, Some(Winner::Tie));
    }

    #[test]
    fn test_run_errors_map_to_reasons() {
        let reason: AbsentReason = ScenarioRunError::Timeout {
            operation: Operation::Get,
            timeout: Duration::from_secs(30),
        }
        .into();
        assert_eq!(reason.to_string(), "GET timed out after 30s");

        let json = serde_json::to_value(BackendOutcome::absent("b", reason)).unwrap();
        assert_eq!(json["status"], "absent");
        assert_eq!(json["reason"]["kind"], "timeout");
    }

    #[test]
    fn test_degraded_flag() {
        let mut m = metrics(100.0, 1.0, 2.0);
        m.error_rate = 6.0;
        assert!(BackendOutcome::completed("a", m).is_degraded());
        assert!(!done("a", 1.0).is_degraded());
    }
}
