//! kvbench command-line runner
//!
//! Usage:
//!   kvbench run-benchmarks                                   # default scenarios, memory vs sqlite
//!   kvbench run-benchmarks --scenarios cache_pattern -i 5000 # one scenario, 5K ops
//!   kvbench run-benchmarks --report-format json --output report.json --csv results.csv
//!   kvbench run-benchmarks --backend-b memory --rtt-us-b 200 # simulated network store
//!   kvbench list-scenarios

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tempfile::TempDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kvbench::adapters::{open_backend, BackendKind};
use kvbench::compare::{BackendOutcome, ScenarioComparison, Winner};
use kvbench::error::ConfigError;
use kvbench::report::ReportFormat;
use kvbench::scenario::{load_scenarios, select_scenarios};
use kvbench::{BenchResult, ConcurrencyMode, RunConfig};

#[derive(Parser, Debug)]
#[command(
    name = "kvbench",
    version,
    about = "Comparative benchmark engine for key-value backends"
)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the selected scenarios against both backends and report.
    RunBenchmarks(RunArgs),
    /// List the scenarios defined in a scenario file.
    ListScenarios {
        #[arg(long, default_value = "scenarios/default.yaml")]
        scenario_file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// YAML file with the workload scenarios.
    #[arg(long, default_value = "scenarios/default.yaml")]
    scenario_file: PathBuf,

    /// Comma-separated scenario names (default: all, in file order).
    #[arg(long)]
    scenarios: Option<String>,

    /// Measured operations per scenario and backend.
    #[arg(long, short, default_value = "50000")]
    iterations: u64,

    /// Keys populated per data type.
    #[arg(long, default_value = "10000")]
    dataset_size: u64,

    /// Number of concurrent workers.
    #[arg(long, short, default_value = "1")]
    concurrency: usize,

    #[arg(long, value_enum, default_value_t = ConcurrencyMode::Cooperative)]
    mode: ConcurrencyMode,

    /// Unmeasured operations before each measurement.
    #[arg(long, default_value = "1000")]
    warmup: u64,

    /// Per-operation timeout in seconds.
    #[arg(long, default_value = "30")]
    timeout_secs: f64,

    #[arg(long, default_value = "42")]
    seed: u64,

    /// Value size in bytes for string values.
    #[arg(long, default_value = "100")]
    value_size: usize,

    #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
    report_format: ReportFormat,

    /// Write the report here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Also export per-backend results as CSV.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// memory | sqlite | sqlite:<path>
    #[arg(long, default_value = "memory")]
    backend_a: BackendKind,

    /// memory | sqlite | sqlite:<path>
    #[arg(long, default_value = "sqlite")]
    backend_b: BackendKind,

    /// Simulated round trip per call for backend A, in microseconds.
    #[arg(long, default_value = "0")]
    rtt_us_a: u64,

    /// Simulated round trip per call for backend B, in microseconds.
    #[arg(long, default_value = "0")]
    rtt_us_b: u64,
}

impl RunArgs {
    fn run_config(&self) -> BenchResult<RunConfig> {
        let invalid_timeout = || {
            ConfigError::InvalidSetting(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout_secs
            ))
        };
        if self.timeout_secs <= 0.0 {
            return Err(invalid_timeout().into());
        }
        let op_timeout =
            Duration::try_from_secs_f64(self.timeout_secs).map_err(|_| invalid_timeout())?;
        Ok(RunConfig {
            iterations: self.iterations,
            dataset_size: self.dataset_size,
            concurrency: self.concurrency,
            mode: self.mode,
            warmup_iterations: self.warmup,
            op_timeout,
            seed: self.seed,
            value_size: self.value_size,
            ..RunConfig::default()
        })
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> BenchResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::ListScenarios { scenario_file } => list_scenarios(&scenario_file),
        Command::RunBenchmarks(args) => run_benchmarks(&args),
    }
}

fn list_scenarios(path: &std::path::Path) -> BenchResult<()> {
    for scenario in load_scenarios(path)? {
        println!("{}", scenario.name.bold());
        if let Some(desc) = &scenario.description {
            println!("  {desc}");
        }
        let ops: Vec<String> = scenario
            .operations
            .iter()
            .map(|w| format!("{} {}%", w.operation, w.weight))
            .collect();
        println!("  {}", ops.join(", ").dimmed());
    }
    Ok(())
}

fn run_benchmarks(args: &RunArgs) -> BenchResult<()> {
    // Configuration errors surface before any backend is touched.
    let cfg = args.run_config()?;
    cfg.validate()?;
    let scenarios = select_scenarios(
        load_scenarios(&args.scenario_file)?,
        args.scenarios.as_deref(),
    )?;

    let (name_a, name_b) = backend_names(&args.backend_a, &args.backend_b);
    let tmp = TempDir::new()?;
    let backend_a = open_backend(
        &args.backend_a,
        &name_a,
        tmp.path(),
        Duration::from_micros(args.rtt_us_a),
    )?;
    let backend_b = open_backend(
        &args.backend_b,
        &name_b,
        tmp.path(),
        Duration::from_micros(args.rtt_us_b),
    )?;

    eprintln!(
        "\n{}",
        "╔══════════════════════════════════════════════════════╗"
            .bold()
            .blue()
    );
    eprintln!(
        "{}",
        "║     kvbench: comparative key-value benchmark         ║"
            .bold()
            .blue()
    );
    eprintln!(
        "{}",
        "╚══════════════════════════════════════════════════════╝"
            .bold()
            .blue()
    );
    eprintln!(
        "  {} vs {}  Iterations: {}  Dataset: {}  Concurrency: {} ({})",
        name_a.bold(),
        name_b.bold(),
        cfg.iterations,
        cfg.dataset_size,
        cfg.concurrency,
        cfg.mode
    );

    let report = kvbench::run_benchmarks(cfg, &scenarios, backend_a, backend_b, print_progress)?;
    let rendered = report.render(args.report_format)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            eprintln!("  Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    if let Some(path) = &args.csv {
        report.export_csv(path)?;
        eprintln!("  CSV written to {}", path.display());
    }
    Ok(())
}

/// Distinct report names even when both sides use the same backend kind.
fn backend_names(a: &BackendKind, b: &BackendKind) -> (String, String) {
    if a.label() == b.label() {
        (format!("{}-a", a.label()), format!("{}-b", b.label()))
    } else {
        (a.label().to_string(), b.label().to_string())
    }
}

fn print_progress(result: &ScenarioComparison) {
    let side = |outcome: &BackendOutcome| match outcome {
        BackendOutcome::Completed {
            backend,
            metrics,
            degraded,
        } => {
            let line = format!("{}:{:.0} ops/s", backend, metrics.throughput_ops_sec);
            if *degraded {
                line.yellow().to_string()
            } else {
                line
            }
        }
        BackendOutcome::Absent { backend, .. } => format!("{backend}: ABSENT").red().to_string(),
    };
    let winner = match result.comparison.winner {
        Some(Winner::A) => result.backend_a.backend().green().to_string(),
        Some(Winner::B) => result.backend_b.backend().green().to_string(),
        Some(Winner::Tie) => "tie".to_string(),
        None => "-".to_string(),
    };
    eprintln!(
        "  {}  {}  {}  → {}",
        result.scenario_name.bold().green(),
        side(&result.backend_a),
        side(&result.backend_b),
        winner
    );
}
