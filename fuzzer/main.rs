//! Metamorphic fuzzer for SQL engines.
//!
//! This binary builds a random SQLite database and runs NoREC, TLP, PQS and
//! crash oracle checks against it.

use std::io::{IsTerminal, stdin};
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use metamorphic_fuzzer::{Fuzzer, OracleKind, SetupConfig, SimConfig, SimStats, run_jobs};
use query_gen::Policy;
use rand::RngCore;
use serde::Serialize;

/// Metamorphic testing fuzzer for SQL engines.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Random seed for deterministic execution (ignored by `loop`).
    #[arg(short, long, default_value_t = rand::rng().next_u64())]
    seed: u64,

    /// Number of oracle checks to run.
    #[arg(short = 'n', long, default_value_t = 1000)]
    checks: usize,

    /// Oracle to run; repeat to run several. Defaults to all oracles.
    #[arg(short, long, value_enum)]
    oracle: Vec<OracleKind>,

    /// Maximum expression depth.
    #[arg(long, default_value_t = 3)]
    max_depth: usize,

    /// Maximum number of tables in a query, and of base tables created.
    #[arg(short = 't', long, default_value_t = 3)]
    max_tables: usize,

    /// Maximum number of columns per table.
    #[arg(short = 'c', long, default_value_t = 3)]
    max_columns: usize,

    /// Maximum number of INSERT statements per table.
    #[arg(long, default_value_t = 5)]
    max_inserts: usize,

    /// Additional expected-error pattern; prefix with `re:` for a regex.
    #[arg(short = 'e', long)]
    expected_error: Vec<String>,

    /// Number of independent fuzzers to run in parallel.
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Directory for run artifacts.
    #[arg(long, default_value = "simulator-output")]
    out_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the fuzzer once with the given seed.
    Run,
    /// Run the fuzzer in a loop with random seeds.
    Loop {
        /// Number of iterations to run (0 for infinite).
        #[arg(default_value_t = 0)]
        iterations: u64,

        /// Collect failures and write a JSON report to this path instead of stopping on first failure.
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

/// A single failure recorded during a loop run.
#[derive(Debug, Serialize)]
struct FailureRecord {
    iteration: u64,
    seed: u64,
    error: String,
    checks_run: usize,
    violations: usize,
    skipped: usize,
    config: ConfigRecord,
}

/// Serializable snapshot of the run configuration.
#[derive(Debug, Serialize)]
struct ConfigRecord {
    checks: usize,
    oracles: Vec<String>,
    max_depth: usize,
    max_tables: usize,
    max_columns: usize,
    max_inserts: usize,
    jobs: usize,
}

/// Summary written to the JSON report file.
#[derive(Debug, Serialize)]
struct LoopReport {
    total_iterations: u64,
    total_failures: u64,
    failures: Vec<FailureRecord>,
}

impl ConfigRecord {
    fn from_args(args: &Args) -> Self {
        Self {
            checks: args.checks,
            oracles: args.oracle.iter().map(|o| format!("{o:?}")).collect(),
            max_depth: args.max_depth,
            max_tables: args.max_tables,
            max_columns: args.max_columns,
            max_inserts: args.max_inserts,
            jobs: args.jobs,
        }
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    let mut subscriber = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()),
    );

    if !stdin().is_terminal() {
        subscriber = subscriber.with_ansi(false)
    }
    subscriber.init();

    let mut args = Args::parse();

    match args.command {
        Some(Commands::Loop {
            iterations,
            ref report,
        }) => {
            let report = report.clone();
            let mut iteration = 0u64;
            let mut failures: Vec<FailureRecord> = Vec::new();
            let collecting = report.is_some();

            loop {
                args.seed = rand::rng().next_u64();
                tracing::info!("Iteration {}: seed {}", iteration + 1, args.seed);

                match run_single_inner(&args) {
                    Ok(stats) if !stats.is_success() => {
                        let record = FailureRecord {
                            iteration: iteration + 1,
                            seed: args.seed,
                            error: format!("{} oracle violation(s) detected", stats.violations),
                            checks_run: stats.checks_run,
                            violations: stats.violations,
                            skipped: stats.skipped,
                            config: ConfigRecord::from_args(&args),
                        };
                        tracing::error!(
                            "Iteration {} failed (seed {}): {}",
                            iteration + 1,
                            args.seed,
                            record.error
                        );
                        failures.push(record);
                        if !collecting {
                            break;
                        }
                    }
                    Err(e) => {
                        let record = FailureRecord {
                            iteration: iteration + 1,
                            seed: args.seed,
                            error: format!("{e:#}"),
                            checks_run: 0,
                            violations: 0,
                            skipped: 0,
                            config: ConfigRecord::from_args(&args),
                        };
                        tracing::error!(
                            "Iteration {} errored (seed {}): {e:#}",
                            iteration + 1,
                            args.seed
                        );
                        failures.push(record);
                        if !collecting {
                            break;
                        }
                    }
                    Ok(_) => {}
                }

                iteration += 1;
                if iterations > 0 && iteration >= iterations {
                    tracing::info!("Completed {} iterations", iterations);
                    break;
                }
            }

            if let Some(path) = report {
                let report = LoopReport {
                    total_iterations: iteration,
                    total_failures: failures.len() as u64,
                    failures,
                };
                let json = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, &json)?;
                tracing::info!(
                    "Wrote report ({} failures / {} iterations) to {}",
                    report.total_failures,
                    report.total_iterations,
                    path.display()
                );
                if report.total_failures > 0 {
                    std::process::exit(1);
                }
            } else if !failures.is_empty() {
                std::process::exit(1);
            }

            Ok(())
        }
        Some(Commands::Run) | None => run_single(&args),
    }
}

fn sim_config(args: &Args) -> SimConfig {
    SimConfig {
        seed: args.seed,
        checks: args.checks,
        oracles: args.oracle.clone(),
        policy: Policy::default()
            .with_max_expr_depth(args.max_depth)
            .with_max_tables(args.max_tables),
        setup: SetupConfig {
            max_tables: args.max_tables,
            max_columns: args.max_columns,
            max_inserts: args.max_inserts,
        },
        expected_errors: args.expected_error.clone(),
        verbose: args.verbose,
        out_dir: args.out_dir.clone(),
    }
}

/// Run a single fuzzer iteration, returning stats on success.
/// Does NOT call `process::exit`; the caller decides what to do with failures.
fn run_single_inner(args: &Args) -> Result<SimStats> {
    let config = sim_config(args);
    tracing::info!("Starting metamorphic fuzzer with config: {:?}", config);

    if args.jobs > 1 {
        let mut total = SimStats::default();
        for (i, result) in run_jobs(&config, args.jobs).into_iter().enumerate() {
            match result {
                Ok(stats) => total.absorb(&stats),
                Err(e) => bail!("worker {i} (seed {}): {e:#}", config.seed.wrapping_add(i as u64)),
            }
        }
        return Ok(total);
    }

    let fuzzer = Fuzzer::new(config)?;
    let stats = fuzzer.run()?;

    // Write schema to JSON file
    match fuzzer.get_schema() {
        Ok(schema) => {
            let json = serde_json::to_string_pretty(&schema)?;
            let full_path = fuzzer.out_dir.join("schema.json");
            std::fs::write(full_path.clone(), &json)?;
            tracing::info!("Wrote schema to {}", full_path.display());
        }
        Err(e) => {
            tracing::warn!("Failed to get schema for JSON dump: {e}");
        }
    }

    Ok(stats)
}

fn run_single(args: &Args) -> Result<()> {
    let stats = run_single_inner(args)?;
    if !stats.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
