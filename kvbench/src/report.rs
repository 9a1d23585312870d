//! Benchmark report: JSON, Markdown, terminal table and CSV export.
//!
//! Rendering is a pure function of the report; apart from the timestamp
//! in the metadata, identical runs produce identical bytes.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;

use crate::client::{Client, Durability};
use crate::compare::{BackendOutcome, ScenarioComparison, Winner, WIN_THRESHOLD_PCT};
use crate::config::RunConfig;
use crate::error::BenchResult;
use crate::metrics::BackendMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    Json,
    #[default]
    Markdown,
    Table,
}

// ────────────────────────────────────────────────────────────────────────────────
// Report model
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub version: String,
    pub durability: Durability,
}

impl BackendInfo {
    pub fn of(client: &dyn Client) -> Self {
        Self {
            name: client.name().to_string(),
            version: client.version(),
            durability: client.durability(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub versions: BTreeMap<String, String>,
    pub backend_a: BackendInfo,
    pub backend_b: BackendInfo,
    pub system: SystemInfo,
    pub settings: RunConfig,
}

impl ReportMetadata {
    pub fn new(settings: &RunConfig, backend_a: BackendInfo, backend_b: BackendInfo) -> Self {
        let versions = BTreeMap::from([
            ("kvbench".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            ("backend_a".to_string(), backend_a.version.clone()),
            ("backend_b".to_string(), backend_b.version.clone()),
        ]);
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            versions,
            backend_a,
            backend_b,
            system: SystemInfo::collect(),
            settings: settings.clone(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_scenarios: usize,
    pub completed_a: usize,
    pub completed_b: usize,
    pub wins_a: usize,
    pub wins_b: usize,
    pub ties: usize,
    /// Backend results with an error rate above the degraded threshold.
    pub degraded: usize,
    /// Mean of every defined throughput difference; 0 when none is defined.
    pub avg_pct_improvement: f64,
}

pub fn summarize(scenarios: &[ScenarioComparison]) -> ReportSummary {
    let completed_a = scenarios
        .iter()
        .filter(|s| s.backend_a.metrics().is_some())
        .count();
    let completed_b = scenarios
        .iter()
        .filter(|s| s.backend_b.metrics().is_some())
        .count();
    let wins = |w: Winner| {
        scenarios
            .iter()
            .filter(|s| s.comparison.winner == Some(w))
            .count()
    };
    let degraded = scenarios
        .iter()
        .map(|s| usize::from(s.backend_a.is_degraded()) + usize::from(s.backend_b.is_degraded()))
        .sum();
    let diffs: Vec<f64> = scenarios
        .iter()
        .filter_map(|s| s.comparison.pct_diff)
        .collect();
    let avg_pct_improvement = if diffs.is_empty() {
        0.0
    } else {
        diffs.iter().sum::<f64>() / diffs.len() as f64
    };

    ReportSummary {
        total_scenarios: scenarios.len(),
        completed_a,
        completed_b,
        wins_a: wins(Winner::A),
        wins_b: wins(Winner::B),
        ties: wins(Winner::Tie),
        degraded,
        avg_pct_improvement,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    pub scenarios: Vec<ScenarioComparison>,
}

/// Build the report. Never fails; absent results are carried as-is.
pub fn generate(metadata: ReportMetadata, scenarios: Vec<ScenarioComparison>) -> BenchmarkReport {
    BenchmarkReport {
        summary: summarize(&scenarios),
        metadata,
        scenarios,
    }
}

impl BenchmarkReport {
    fn name_a(&self) -> &str {
        &self.metadata.backend_a.name
    }

    fn name_b(&self) -> &str {
        &self.metadata.backend_b.name
    }

    pub fn render(&self, format: ReportFormat) -> BenchResult<String> {
        Ok(match format {
            ReportFormat::Json => self.to_json()?,
            ReportFormat::Markdown => self.to_markdown(),
            ReportFormat::Table => self.to_table(),
        })
    }

    // ────────────────────────────────────────────────────────────────────────
    // JSON
    // ────────────────────────────────────────────────────────────────────────

    pub fn to_json(&self) -> BenchResult<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Markdown
    // ────────────────────────────────────────────────────────────────────────

    /// Observations derived from the scenario results, in scenario order.
    pub fn key_findings(&self) -> Vec<String> {
        let (a, b) = (self.name_a(), self.name_b());
        let s = &self.summary;
        let mut findings = vec![format!(
            "{a} won {} and {b} won {} of {} scenarios ({} ties).",
            s.wins_a, s.wins_b, s.total_scenarios, s.ties
        )];

        let defined = self
            .scenarios
            .iter()
            .filter_map(|sc| sc.comparison.pct_diff.map(|d| (sc, d)));
        let best_a = defined
            .clone()
            .filter(|(_, d)| *d > WIN_THRESHOLD_PCT)
            .max_by(|x, y| x.1.total_cmp(&y.1));
        let best_b = defined
            .filter(|(_, d)| *d < -WIN_THRESHOLD_PCT)
            .min_by(|x, y| x.1.total_cmp(&y.1));
        if let Some((sc, d)) = best_a {
            findings.push(format!(
                "Largest {a} advantage: `{}` ({d:+.1}% throughput).",
                sc.scenario_name
            ));
        }
        if let Some((sc, d)) = best_b {
            findings.push(format!(
                "Largest {b} advantage: `{}` ({d:+.1}% throughput for {a}).",
                sc.scenario_name
            ));
        }

        for sc in &self.scenarios {
            for outcome in [&sc.backend_a, &sc.backend_b] {
                match outcome {
                    BackendOutcome::Absent { backend, reason } => findings.push(format!(
                        "{backend} produced no result for `{}`: {reason}.",
                        sc.scenario_name
                    )),
                    BackendOutcome::Completed {
                        backend,
                        metrics,
                        degraded: true,
                    } => findings.push(format!(
                        "{backend} was degraded in `{}` ({:.1}% errors).",
                        sc.scenario_name, metrics.error_rate
                    )),
                    BackendOutcome::Completed { .. } => {}
                }
            }
        }

        if self
            .scenarios
            .iter()
            .flat_map(|sc| [&sc.backend_a, &sc.backend_b])
            .any(|o| o.metrics().is_some_and(|m| m.approximate))
        {
            findings.push(
                "Some percentiles are HDR histogram approximations (sample ceiling exceeded)."
                    .to_string(),
            );
        }
        findings
    }

    pub fn to_markdown(&self) -> String {
        let (a, b) = (self.name_a(), self.name_b());
        let s = &self.summary;
        let mut md = String::new();

        let _ = writeln!(md, "# Benchmark Report: {a} vs {b}\n");
        let _ = writeln!(md, "Generated: {}  ", self.metadata.timestamp);
        let _ = writeln!(
            md,
            "Settings: {} iterations, dataset {}, concurrency {} ({}), warmup {}, seed {}\n",
            self.metadata.settings.iterations,
            self.metadata.settings.dataset_size,
            self.metadata.settings.concurrency,
            self.metadata.settings.mode,
            self.metadata.settings.warmup_iterations,
            self.metadata.settings.seed,
        );

        let _ = writeln!(md, "## Summary\n");
        let _ = writeln!(md, "| Metric | Value |");
        let _ = writeln!(md, "|---|---|");
        let _ = writeln!(md, "| Scenarios | {} |", s.total_scenarios);
        let _ = writeln!(md, "| Completed ({a}) | {} |", s.completed_a);
        let _ = writeln!(md, "| Completed ({b}) | {} |", s.completed_b);
        let _ = writeln!(md, "| Wins ({a}) | {} |", s.wins_a);
        let _ = writeln!(md, "| Wins ({b}) | {} |", s.wins_b);
        let _ = writeln!(md, "| Ties | {} |", s.ties);
        let _ = writeln!(md, "| Degraded runs | {} |", s.degraded);
        let _ = writeln!(
            md,
            "| Avg throughput difference ({a} vs {b}) | {:+.1}% |\n",
            s.avg_pct_improvement
        );

        let _ = writeln!(md, "## Key Findings\n");
        for finding in self.key_findings() {
            let _ = writeln!(md, "- {finding}");
        }

        let _ = writeln!(md, "\n## Scenarios");
        for sc in &self.scenarios {
            let _ = writeln!(md, "\n### {}\n", sc.scenario_name);
            if let Some(desc) = &sc.description {
                let _ = writeln!(md, "_{desc}_\n");
            }
            let _ = writeln!(md, "| Metric | {a} | {b} |");
            let _ = writeln!(md, "|---|---|---|");
            let _ = writeln!(
                md,
                "| Status | {} | {} |",
                status(&sc.backend_a),
                status(&sc.backend_b)
            );
            let rows: [(&str, fn(&BackendMetrics) -> String); 11] = [
                ("Throughput (ops/s)", |m| format!("{:.1}", m.throughput_ops_sec)),
                ("p50 (µs)", |m| format!("{:.1}", m.p50_us)),
                ("p95 (µs)", |m| format!("{:.1}", m.p95_us)),
                ("p99 (µs)", |m| format!("{:.1}", m.p99_us)),
                ("Avg (µs)", |m| format!("{:.1}", m.avg_us)),
                ("Stddev (µs)", |m| format!("{:.1}", m.stddev_us)),
                ("Min (µs)", |m| format!("{:.1}", m.min_us)),
                ("Max (µs)", |m| format!("{:.1}", m.max_us)),
                ("Error rate", |m| format!("{:.2}%", m.error_rate)),
                ("Operations", |m| format!("{} ok / {} failed", m.successes, m.failures)),
                ("Duration (s)", |m| format!("{:.3}", m.duration_sec)),
            ];
            for (label, cell) in rows {
                let _ = writeln!(
                    md,
                    "| {label} | {} | {} |",
                    sc.backend_a.metrics().map_or("-".to_string(), cell),
                    sc.backend_b.metrics().map_or("-".to_string(), cell),
                );
            }
            let c = &sc.comparison;
            let _ = writeln!(md);
            if let Some(d) = c.pct_diff {
                let _ = writeln!(md, "Throughput difference: {d:+.1}%  ");
            }
            if let (Some(p50), Some(p99)) = (c.p50_latency_pct_diff, c.p99_latency_pct_diff) {
                let _ = writeln!(md, "Latency advantage for {a}: p50 {p50:+.1}%, p99 {p99:+.1}%  ");
            }
            let _ = writeln!(md, "**Verdict:** {}", c.verdict);
        }
        md
    }

    // ────────────────────────────────────────────────────────────────────────
    // Terminal table
    // ────────────────────────────────────────────────────────────────────────

    pub fn to_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS);
        table.set_header(vec![
            "Scenario",
            "Backend",
            "Throughput",
            "p50 (μs)",
            "p95 (μs)",
            "p99 (μs)",
            "Errors",
            "Δ Throughput",
            "Winner",
        ]);

        for sc in &self.scenarios {
            let c = &sc.comparison;
            let sides = [(Winner::A, &sc.backend_a), (Winner::B, &sc.backend_b)];
            for (i, (side, outcome)) in sides.into_iter().enumerate() {
                let is_winner = c.winner == Some(side);
                let name = if is_winner {
                    format!("★ {}", outcome.backend())
                } else {
                    outcome.backend().to_string()
                };
                let highlight = |cell: Cell| if is_winner { cell.fg(Color::Green) } else { cell };

                let mut row = vec![
                    Cell::new(if i == 0 { sc.scenario_name.as_str() } else { "" }),
                    highlight(Cell::new(name)),
                ];
                match outcome {
                    BackendOutcome::Completed {
                        metrics, degraded, ..
                    } => {
                        let errors = Cell::new(format!("{:.2}%", metrics.error_rate));
                        row.extend([
                            highlight(Cell::new(format_throughput(metrics.throughput_ops_sec))),
                            Cell::new(format!("{:.1}", metrics.p50_us)),
                            Cell::new(format!("{:.1}", metrics.p95_us)),
                            Cell::new(format!("{:.1}", metrics.p99_us)),
                            if *degraded { errors.fg(Color::Yellow) } else { errors },
                        ]);
                    }
                    BackendOutcome::Absent { reason, .. } => {
                        row.push(Cell::new(format!("absent: {reason}")).fg(Color::Red));
                        row.extend((0..4).map(|_| Cell::new("-")));
                    }
                }
                if i == 0 {
                    row.push(Cell::new(
                        c.pct_diff.map_or("-".to_string(), |d| format!("{d:+.1}%")),
                    ));
                    row.push(Cell::new(c.winner.map_or("-".to_string(), |w| match w {
                        Winner::A => self.name_a().to_string(),
                        Winner::B => self.name_b().to_string(),
                        Winner::Tie => "tie".to_string(),
                    })));
                } else {
                    row.extend([Cell::new(""), Cell::new("")]);
                }
                table.add_row(row);
            }
        }

        let s = &self.summary;
        format!(
            "{table}\n  {} ops total │ {} wins: {} │ {} wins: {} │ ties: {} │ \
             degraded: {} │ avg Δ {:+.1}%\n",
            format_count(self.total_ops()),
            self.name_a(),
            s.wins_a,
            self.name_b(),
            s.wins_b,
            s.ties,
            s.degraded,
            s.avg_pct_improvement
        )
    }

    fn total_ops(&self) -> u64 {
        self.scenarios
            .iter()
            .flat_map(|sc| [&sc.backend_a, &sc.backend_b])
            .filter_map(BackendOutcome::metrics)
            .map(BackendMetrics::total_ops)
            .sum()
    }

    // ────────────────────────────────────────────────────────────────────────
    // CSV export
    // ────────────────────────────────────────────────────────────────────────

    /// One row per scenario and backend.
    pub fn write_csv<W: Write>(&self, writer: W) -> BenchResult<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record([
            "scenario",
            "side",
            "backend",
            "status",
            "throughput_ops_sec",
            "p50_us",
            "p95_us",
            "p99_us",
            "avg_us",
            "stddev_us",
            "min_us",
            "max_us",
            "error_rate",
            "successes",
            "failures",
            "approximate",
            "pct_diff",
            "winner",
            "reason",
        ])?;

        for sc in &self.scenarios {
            let pct = sc
                .comparison
                .pct_diff
                .map_or_else(String::new, |d| format!("{d:.2}"));
            let winner = sc
                .comparison
                .winner
                .map_or_else(String::new, |w| w.to_string());
            for (side, outcome) in [("A", &sc.backend_a), ("B", &sc.backend_b)] {
                let mut record = vec![
                    sc.scenario_name.clone(),
                    side.to_string(),
                    outcome.backend().to_string(),
                ];
                match outcome {
                    BackendOutcome::Completed { metrics: m, .. } => {
                        record.push("completed".to_string());
                        record.extend(
                            [
                                m.throughput_ops_sec,
                                m.p50_us,
                                m.p95_us,
                                m.p99_us,
                                m.avg_us,
                                m.stddev_us,
                                m.min_us,
                                m.max_us,
                                m.error_rate,
                            ]
                            .map(|v| format!("{v:.2}")),
                        );
                        record.extend([
                            m.successes.to_string(),
                            m.failures.to_string(),
                            m.approximate.to_string(),
                        ]);
                        record.extend([pct.clone(), winner.clone(), String::new()]);
                    }
                    BackendOutcome::Absent { reason, .. } => {
                        record.push("absent".to_string());
                        record.extend((0..12).map(|_| String::new()));
                        record.extend([pct.clone(), winner.clone(), reason.to_string()]);
                    }
                }
                wtr.write_record(&record)?;
            }
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn export_csv(&self, path: &Path) -> BenchResult<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}

fn status(outcome: &BackendOutcome) -> String {
    match outcome {
        BackendOutcome::Completed { degraded: true, .. } => "completed (degraded)".to_string(),
        BackendOutcome::Completed { .. } => "completed".to_string(),
        BackendOutcome::Absent { reason, .. } => format!("absent: {reason}"),
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Formatting helpers
// ────────────────────────────────────────────────────────────────────────────────

fn format_throughput(t: f64) -> String {
    if t >= 1_000_000.0 {
        format!("{:.2}M/s", t / 1_000_000.0)
    } else if t >= 1_000.0 {
        format!("{:.1}K/s", t / 1_000.0)
    } else {
        format!("{t:.0}/s")
    }
}

fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}
