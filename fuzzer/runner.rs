//! Main fuzzing runner.
//!
//! This module orchestrates a run by:
//! 1. Building a random database with equivalence members on a fresh engine
//! 2. Introspecting the schema back from the engine
//! 3. Running oracle checks, each with its own seed
//! 4. Writing the reproduction transcript
//!
//! A violation stops the run; a fatal outcome or a panic aborts it with an
//! error.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, RefUnwindSafe};
use std::path::PathBuf;
use std::sync::{LazyLock, Once};
use std::thread::ThreadId;

use anyhow::{Context as _, Result, anyhow};
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use parking_lot::Mutex;
use query_gen::{Context, Policy, Schema};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::engine::SqliteEngine;
use crate::errors::ErrorClassifier;
use crate::oracle::{CheckEnv, Oracle, OracleKind, Outcome};
use crate::schema::SchemaIntrospector;
use crate::setup::{DatabaseBuilder, SetupConfig};
use crate::transcript::Transcript;

/// Configuration for a fuzzing run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Random seed for deterministic execution.
    pub seed: u64,
    /// Number of oracle checks to run.
    pub checks: usize,
    /// Oracles to draw checks from. Empty means all of them.
    pub oracles: Vec<OracleKind>,
    /// Generation policy.
    pub policy: Policy,
    /// Database size limits.
    pub setup: SetupConfig,
    /// Extra expected-error patterns; a `re:` prefix marks a regex.
    pub expected_errors: Vec<String>,
    /// Whether to log every check.
    pub verbose: bool,
    /// Directory to save run artifacts.
    pub out_dir: PathBuf,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: rand::rng().next_u64(),
            checks: 1000,
            oracles: Vec::new(),
            policy: Policy::default(),
            setup: SetupConfig::default(),
            expected_errors: Vec::new(),
            verbose: false,
            out_dir: "simulator-output".into(),
        }
    }
}

/// Per-oracle outcome counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OracleTally {
    pub checked: usize,
    pub skipped: usize,
    pub violated: usize,
}

/// Statistics from a run.
#[derive(Debug, Default, Clone)]
pub struct SimStats {
    /// Number of setup statements executed.
    pub setup_statements: usize,
    /// Number of checks started.
    pub checks_run: usize,
    /// Number of checks whose relation held.
    pub checked: usize,
    /// Number of skipped checks.
    pub skipped: usize,
    /// Number of oracle violations.
    pub violations: usize,
    /// Number of fatal outcomes and panics.
    pub fatal: usize,
    /// Outcome counts by oracle name.
    pub per_oracle: BTreeMap<&'static str, OracleTally>,
}

impl SimStats {
    /// Returns true if the run completed without violations or fatal errors.
    pub fn is_success(&self) -> bool {
        self.violations == 0 && self.fatal == 0
    }

    /// Add the counts of another run.
    pub fn absorb(&mut self, other: &SimStats) {
        self.setup_statements += other.setup_statements;
        self.checks_run += other.checks_run;
        self.checked += other.checked;
        self.skipped += other.skipped;
        self.violations += other.violations;
        self.fatal += other.fatal;
        for (name, tally) in &other.per_oracle {
            let entry = self.per_oracle.entry(*name).or_default();
            entry.checked += tally.checked;
            entry.skipped += tally.skipped;
            entry.violated += tally.violated;
        }
    }

    fn record(&mut self, oracle: &'static str, outcome: &Outcome) {
        let tally = self.per_oracle.entry(oracle).or_default();
        match outcome {
            Outcome::Checked => {
                self.checked += 1;
                tally.checked += 1;
            }
            Outcome::Skipped(_) => {
                self.skipped += 1;
                tally.skipped += 1;
            }
            Outcome::Violated(_) => {
                self.violations += 1;
                tally.violated += 1;
            }
            Outcome::Fatal(_) => self.fatal += 1,
        }
    }

    /// Create a colorful table displaying run results.
    pub fn to_table(&self, config: &SimConfig) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let status = if self.is_success() {
            Cell::new("PASSED")
                .fg(Color::Green)
                .add_attribute(Attribute::Bold)
        } else {
            Cell::new("FAILED")
                .fg(Color::Red)
                .add_attribute(Attribute::Bold)
        };
        table.set_header(vec![
            Cell::new("Fuzzing Results").add_attribute(Attribute::Bold),
            status,
        ]);

        table.add_row(vec![
            Cell::new("Seed").fg(Color::Cyan),
            Cell::new(config.seed),
        ]);
        table.add_row(vec![
            Cell::new("Target Checks").fg(Color::Cyan),
            Cell::new(config.checks),
        ]);
        table.add_row(vec![
            Cell::new("Setup Statements").fg(Color::Blue),
            Cell::new(self.setup_statements).fg(Color::Blue),
        ]);
        table.add_row(vec![
            Cell::new("Checks Run").fg(Color::Blue),
            Cell::new(self.checks_run).fg(Color::Blue),
        ]);
        table.add_row(vec![
            Cell::new("Checked").fg(Color::Green),
            Cell::new(self.checked).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("Skipped").fg(Color::Yellow),
            Cell::new(self.skipped).fg(Color::Yellow),
        ]);

        let violations_cell = if self.violations > 0 {
            Cell::new(self.violations)
                .fg(Color::Red)
                .add_attribute(Attribute::Bold)
        } else {
            Cell::new(self.violations).fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new("Violations").fg(Color::Red),
            violations_cell,
        ]);

        let fatal_cell = if self.fatal > 0 {
            Cell::new(self.fatal).fg(Color::Red)
        } else {
            Cell::new(self.fatal).fg(Color::Green)
        };
        table.add_row(vec![Cell::new("Fatal").fg(Color::Red), fatal_cell]);

        for (name, tally) in &self.per_oracle {
            table.add_row(vec![
                Cell::new(format!("  {name}")),
                Cell::new(format!(
                    "{} checked / {} skipped / {} violated",
                    tally.checked, tally.skipped, tally.violated
                )),
            ]);
        }

        table
    }

    /// Print the stats as a colorful table to stdout.
    pub fn print_table(&self, config: &SimConfig) {
        println!("\n{}", self.to_table(config));
    }
}

/// The main fuzzer.
pub struct Fuzzer {
    config: SimConfig,
    rng: RefCell<ChaCha8Rng>,
    engine: SqliteEngine,
    classifier: ErrorClassifier,
    oracles: Vec<Box<dyn Oracle>>,
    /// Directory to save run artifacts
    pub out_dir: PathBuf,
}

impl RefUnwindSafe for Fuzzer {}

impl Fuzzer {
    /// Create a new fuzzer over a fresh in-memory SQLite database.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.policy.validate().context("Invalid generation policy")?;

        let out_dir = config.out_dir.clone();
        if !out_dir.exists() {
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("Failed to create {}", out_dir.display()))?;
        }

        let mut classifier =
            ErrorClassifier::sqlite().context("Failed to compile expected-error patterns")?;
        classifier
            .extend_from_args(&config.expected_errors)
            .context("Invalid --expected-error pattern")?;

        let kinds: &[OracleKind] = if config.oracles.is_empty() {
            OracleKind::ALL
        } else {
            &config.oracles
        };
        let oracles = kinds.iter().map(|kind| kind.oracle()).collect();

        let engine = SqliteEngine::open_in_memory().context("Failed to open SQLite database")?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            rng: RefCell::new(rng),
            engine,
            classifier,
            oracles,
            out_dir,
        })
    }

    /// Introspect and return the current schema.
    pub fn get_schema(&self) -> Result<Schema> {
        SchemaIntrospector::from_sqlite(self.engine.connection())
            .context("Failed to introspect SQLite schema")
    }

    /// Run the fuzzer.
    pub fn run(&self) -> Result<SimStats> {
        let mut stats = SimStats::default();
        let mut transcript = Transcript::new(self.config.seed);

        let result = self.run_inner(&mut stats, &mut transcript);

        // Always write the transcript and print stats, even on error
        if let Err(e) = transcript.write_to(&self.out_dir) {
            tracing::warn!("Failed to write test.sql: {e}");
        }
        stats.print_table(&self.config);

        result.map(|()| stats)
    }

    fn run_inner(&self, stats: &mut SimStats, transcript: &mut Transcript) -> Result<()> {
        tracing::info!(
            "Starting run with seed={}, checks={}, oracles={:?}",
            self.config.seed,
            self.config.checks,
            self.oracles.iter().map(|o| o.name()).collect::<Vec<_>>(),
        );

        let setup_seed = self.rng.borrow_mut().next_u64();
        let statements = DatabaseBuilder::new(self.config.setup, &self.config.policy)
            .build(&self.engine, &mut Context::new_with_seed(setup_seed))?;
        stats.setup_statements = statements.len();
        for sql in statements {
            transcript.record_setup(sql);
        }

        let schema = self.get_schema()?;
        tracing::debug!(
            "Schema has {} tables in {} equivalence groups",
            schema.tables.len(),
            schema.groups.len()
        );

        let panic_capture = PanicCapture::start();
        for i in 0..self.config.checks {
            let (index, check_seed) = {
                let mut rng = self.rng.borrow_mut();
                (rng.random_range(0..self.oracles.len()), rng.next_u64())
            };
            let name = self.oracles[index].name();
            stats.checks_run += 1;
            if self.config.verbose {
                tracing::info!("Check {i} [{name}]: seed {check_seed}");
            }

            // catch_unwind so that a panic inside a check still reports
            // stats and the seed of the offending check.
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                let mut env = CheckEnv::new(
                    &self.engine,
                    &schema,
                    &self.config.policy,
                    &self.classifier,
                    check_seed,
                );
                let outcome = self.oracles[index].check(&mut env);
                (outcome, env.executed().to_vec())
            }));

            let (outcome, executed) = match result {
                Ok(result) => result,
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "Unknown panic".to_string());
                    let context = panic_capture.take().unwrap_or_default();
                    stats.fatal += 1;
                    transcript.record_failure(name, check_seed, &[]);
                    tracing::error!("Panic in check {i} [{name}] (seed {check_seed}): {msg}");
                    tracing::error!("Backtrace:\n{context}");
                    return Err(anyhow!(
                        "Panic during check {i} [{name}] (seed {check_seed}): {msg}\n{context}"
                    ));
                }
            };

            stats.record(name, &outcome);
            match outcome {
                Outcome::Checked => {
                    tracing::debug!("Check {i} [{name}] passed");
                }
                Outcome::Skipped(reason) => {
                    tracing::debug!("Check {i} [{name}] skipped: {reason}");
                }
                Outcome::Violated(violation) => {
                    transcript.record_failure(name, check_seed, &violation.queries);
                    tracing::error!("Check {i} (seed {check_seed}): {violation}");
                    return Ok(());
                }
                Outcome::Fatal(message) => {
                    transcript.record_failure(name, check_seed, &executed);
                    tracing::error!("Fatal in check {i} [{name}] (seed {check_seed}): {message}");
                    return Err(anyhow!(
                        "Fatal outcome in check {i} [{name}] (seed {check_seed}): {message}"
                    ));
                }
            }
        }

        tracing::info!(
            "Finished {} checks: {} checked, {} skipped",
            stats.checks_run,
            stats.checked,
            stats.skipped
        );
        Ok(())
    }
}

/// Location and backtrace of the last panic, per thread running checks.
///
/// A thread without an entry panics through the hook that was installed
/// before ours.
static PANIC_CONTEXTS: LazyLock<Mutex<HashMap<ThreadId, Option<String>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Install the process-wide panic hook. Later calls do nothing.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let id = std::thread::current().id();
            let captured = {
                let mut contexts = PANIC_CONTEXTS.lock();
                match contexts.get_mut(&id) {
                    Some(slot) => {
                        let bt = std::backtrace::Backtrace::force_capture();
                        *slot = Some(format!("{info}\n{bt}"));
                        true
                    }
                    None => false,
                }
            };
            if !captured {
                previous(info);
            }
        }));
    });
}

/// Records panics on the current thread until dropped.
struct PanicCapture(ThreadId);

impl PanicCapture {
    fn start() -> Self {
        install_panic_hook();
        let id = std::thread::current().id();
        PANIC_CONTEXTS.lock().insert(id, None);
        Self(id)
    }

    /// Context of the last panic on this thread, if any.
    fn take(&self) -> Option<String> {
        PANIC_CONTEXTS.lock().get_mut(&self.0).and_then(Option::take)
    }
}

impl Drop for PanicCapture {
    fn drop(&mut self) {
        PANIC_CONTEXTS.lock().remove(&self.0);
    }
}

/// Run `jobs` independent fuzzers on scoped threads.
///
/// Worker `i` uses seed `config.seed + i` and writes its artifacts to
/// `worker-{i}` under the configured output directory.
pub fn run_jobs(config: &SimConfig, jobs: usize) -> Vec<Result<SimStats>> {
    install_panic_hook();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..jobs.max(1))
            .map(|i| {
                let mut worker = config.clone();
                worker.seed = config.seed.wrapping_add(i as u64);
                worker.out_dir = config.out_dir.join(format!("worker-{i}"));
                scope.spawn(move || Fuzzer::new(worker)?.run())
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("fuzzer worker panicked")))
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64, out_dir: PathBuf) -> SimConfig {
        SimConfig {
            seed,
            checks: 50,
            out_dir,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_sim_config_default() {
        let config = SimConfig::default();
        assert_eq!(config.checks, 1000);
        assert!(config.oracles.is_empty());
        assert_eq!(config.out_dir, PathBuf::from("simulator-output"));
    }

    #[test]
    fn test_fuzzer_creation() {
        let dir = tempfile::tempdir().unwrap();
        let fuzzer = Fuzzer::new(config(12345, dir.path().to_path_buf()));
        assert!(fuzzer.is_ok());
    }

    #[test]
    fn test_invalid_expected_error_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(1, dir.path().to_path_buf());
        config.expected_errors = vec!["re:(".to_string()];
        assert!(Fuzzer::new(config).is_err());
    }

    #[test]
    fn test_run_writes_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(42, dir.path().to_path_buf());
        config.oracles = vec![OracleKind::Norec, OracleKind::TlpWhere];
        let fuzzer = Fuzzer::new(config).unwrap();
        let stats = fuzzer.run().unwrap();

        assert!(stats.setup_statements > 0);
        assert!(stats.checks_run > 0);
        assert_eq!(stats.fatal, 0);
        assert!(stats.per_oracle.keys().all(|k| ["norec", "tlp-where"].contains(k)));

        let text = std::fs::read_to_string(dir.path().join("test.sql")).unwrap();
        assert!(text.starts_with("-- run seed: 42\n"));
        assert!(text.contains("CREATE TABLE t0 ("));
        assert_eq!(stats.violations > 0, text.contains("-- FAILED:"));
    }

    #[test]
    fn test_same_seed_same_setup() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let mut first = config(7, a.path().to_path_buf());
        first.checks = 0;
        let mut second = config(7, b.path().to_path_buf());
        second.checks = 0;
        Fuzzer::new(first).unwrap().run().unwrap();
        Fuzzer::new(second).unwrap().run().unwrap();
        assert_eq!(
            std::fs::read_to_string(a.path().join("test.sql")).unwrap(),
            std::fs::read_to_string(b.path().join("test.sql")).unwrap()
        );
    }

    #[test]
    fn test_run_jobs_uses_worker_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(100, dir.path().to_path_buf());
        config.checks = 10;
        let results = run_jobs(&config, 2);
        assert_eq!(results.len(), 2);
        for (i, result) in results.into_iter().enumerate() {
            assert!(result.is_ok());
            let text =
                std::fs::read_to_string(dir.path().join(format!("worker-{i}/test.sql"))).unwrap();
            assert!(text.starts_with(&format!("-- run seed: {}\n", 100 + i)));
        }
    }

    #[test]
    fn test_panic_context_stays_on_its_thread() {
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    scope.spawn(move || {
                        let capture = PanicCapture::start();
                        let result: std::thread::Result<()> =
                            std::panic::catch_unwind(|| panic!("worker {i} failed"));
                        assert!(result.is_err());
                        let context = capture.take().unwrap_or_default();
                        assert!(capture.take().is_none());
                        context
                    })
                })
                .collect();
            for (i, handle) in handles.into_iter().enumerate() {
                let context = handle.join().unwrap();
                assert!(context.contains(&format!("worker {i} failed")), "{context}");
                for other in (0..4).filter(|&other| other != i) {
                    assert!(!context.contains(&format!("worker {other} failed")));
                }
            }
        });
    }

    #[test]
    fn test_stats_absorb() {
        let mut total = SimStats::default();
        let mut one = SimStats::default();
        one.record("norec", &Outcome::Checked);
        one.record("norec", &Outcome::Skipped("x".into()));
        one.checks_run = 2;
        total.absorb(&one);
        total.absorb(&one);
        assert_eq!(total.checks_run, 4);
        assert_eq!(total.checked, 2);
        assert_eq!(
            total.per_oracle["norec"],
            OracleTally {
                checked: 2,
                skipped: 2,
                violated: 0
            }
        );
        assert!(total.is_success());
    }
}
