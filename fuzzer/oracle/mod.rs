//! Metamorphic oracles.
//!
//! Each oracle derives several semantically related queries from one
//! generated query, runs them, and checks a relation between their results
//! that holds in any correct engine. A check is a single transaction: it
//! builds everything it needs from the [`CheckEnv`] it is given and returns
//! an [`Outcome`]. Nothing carries over between checks.

pub mod no_crash;
pub mod norec;
pub mod pqs;
pub mod tlp;
pub mod tlp_aggregate;

use std::collections::BTreeSet;
use std::fmt;

use query_gen::{Context, GenError, Policy, Schema};

use crate::engine::{Engine, Row};
use crate::errors::ErrorClassifier;

pub use no_crash::{NoCrashAggregate, NoCrashWindow};
pub use norec::NoRec;
pub use pqs::Pqs;
pub use tlp::{TlpHaving, TlpWhere};
pub use tlp_aggregate::TlpAggregate;

/// Result of an oracle check.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The relation held.
    Checked,
    /// The check could not be completed (expected engine error, empty
    /// table, unusable result).
    Skipped(String),
    /// The relation was violated.
    Violated(Violation),
    /// The generator or catalog broke an internal contract.
    Fatal(String),
}

impl Outcome {
    pub fn is_checked(&self) -> bool {
        matches!(self, Outcome::Checked)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    pub fn is_violated(&self) -> bool {
        matches!(self, Outcome::Violated(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Outcome::Fatal(_))
    }
}

/// A violated relation, with every query the check ran.
#[derive(Debug, Clone)]
pub struct Violation {
    pub oracle: &'static str,
    pub message: String,
    pub queries: Vec<String>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} oracle violated: {}", self.oracle, self.message)?;
        for sql in &self.queries {
            writeln!(f, "    {sql};")?;
        }
        Ok(())
    }
}

/// Errors that end a check early. Mapped onto [`Outcome`] by [`finish`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum CheckError {
    #[error("{0}")]
    Skip(String),
    #[error("expected error ({pattern}): {message}")]
    Expected { pattern: String, message: String },
    #[error("unexpected error: {message}\n  SQL: {sql}")]
    Unexpected { sql: String, message: String },
    #[error("{0}")]
    Violated(String),
    #[error("{0}")]
    Fatal(String),
    #[error(transparent)]
    Gen(#[from] GenError),
}

/// Everything one check may use.
pub struct CheckEnv<'a> {
    pub engine: &'a dyn Engine,
    pub schema: &'a Schema,
    pub policy: &'a Policy,
    pub classifier: &'a ErrorClassifier,
    pub ctx: Context,
    executed: Vec<String>,
}

impl<'a> CheckEnv<'a> {
    pub fn new(
        engine: &'a dyn Engine,
        schema: &'a Schema,
        policy: &'a Policy,
        classifier: &'a ErrorClassifier,
        seed: u64,
    ) -> Self {
        Self {
            engine,
            schema,
            policy,
            classifier,
            ctx: Context::new_with_seed(seed),
            executed: Vec::new(),
        }
    }

    /// Seed of the check's RNG.
    pub fn seed(&self) -> u64 {
        self.ctx.seed()
    }

    /// Every statement the check sent to the engine, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub(crate) fn query(&mut self, sql: &str) -> Result<Vec<Row>, CheckError> {
        tracing::debug!("query: {sql}");
        self.executed.push(sql.to_string());
        self.engine.query(sql).map_err(|e| self.classify(sql, e))
    }

    pub(crate) fn first_column(&mut self, sql: &str) -> Result<Vec<Option<String>>, CheckError> {
        tracing::debug!("query: {sql}");
        self.executed.push(sql.to_string());
        self.engine.first_column(sql).map_err(|e| self.classify(sql, e))
    }

    pub(crate) fn execute(&mut self, sql: &str) -> Result<(), CheckError> {
        tracing::debug!("execute: {sql}");
        self.executed.push(sql.to_string());
        self.engine.execute(sql).map_err(|e| self.classify(sql, e))
    }

    fn classify(&self, sql: &str, error: impl fmt::Display) -> CheckError {
        let message = error.to_string();
        match self.classifier.is_expected(&message) {
            Some(pattern) => CheckError::Expected {
                pattern: pattern.to_string(),
                message,
            },
            None => CheckError::Unexpected {
                sql: sql.to_string(),
                message,
            },
        }
    }
}

/// Map the result of a check body onto an [`Outcome`].
pub(crate) fn finish(oracle: &'static str, result: Result<(), CheckError>, env: &CheckEnv<'_>) -> Outcome {
    let violation = |message: String| {
        Outcome::Violated(Violation {
            oracle,
            message,
            queries: env.executed().to_vec(),
        })
    };
    match result {
        Ok(()) => Outcome::Checked,
        Err(CheckError::Skip(reason)) => Outcome::Skipped(reason),
        Err(e @ CheckError::Expected { .. }) => Outcome::Skipped(e.to_string()),
        Err(e @ CheckError::Unexpected { .. }) => violation(e.to_string()),
        Err(CheckError::Violated(message)) => violation(message),
        Err(CheckError::Fatal(message)) => Outcome::Fatal(message),
        Err(CheckError::Gen(e)) if e.is_fatal() => Outcome::Fatal(e.to_string()),
        Err(CheckError::Gen(e)) => Outcome::Skipped(e.to_string()),
    }
}

/// A metamorphic oracle.
pub trait Oracle {
    fn name(&self) -> &'static str;

    /// Run one check.
    fn check(&self, env: &mut CheckEnv<'_>) -> Outcome;
}

/// Which oracle to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum OracleKind {
    /// Non-optimizing reference engine construction.
    Norec,
    /// Ternary logic partitioning of WHERE.
    TlpWhere,
    /// Ternary logic partitioning of HAVING.
    TlpHaving,
    /// Ternary logic partitioning of MIN/MAX/SUM/COUNT.
    TlpAggregate,
    /// Pivoted query synthesis.
    Pqs,
    /// Aggregate queries must not fail unexpectedly.
    NoCrashAggregate,
    /// Window queries must not fail unexpectedly.
    NoCrashWindow,
}

impl OracleKind {
    pub const ALL: &'static [OracleKind] = &[
        OracleKind::Norec,
        OracleKind::TlpWhere,
        OracleKind::TlpHaving,
        OracleKind::TlpAggregate,
        OracleKind::Pqs,
        OracleKind::NoCrashAggregate,
        OracleKind::NoCrashWindow,
    ];

    pub fn oracle(self) -> Box<dyn Oracle> {
        match self {
            OracleKind::Norec => Box::new(NoRec),
            OracleKind::TlpWhere => Box::new(TlpWhere),
            OracleKind::TlpHaving => Box::new(TlpHaving),
            OracleKind::TlpAggregate => Box::new(TlpAggregate),
            OracleKind::Pqs => Box::new(Pqs),
            OracleKind::NoCrashAggregate => Box::new(NoCrashAggregate),
            OracleKind::NoCrashWindow => Box::new(NoCrashWindow),
        }
    }
}

// =============================================================================
// Result comparison
// =============================================================================

/// Canonical text of every row.
pub fn canonical_rows(rows: &[Row]) -> Vec<String> {
    rows.iter().map(Row::canonical).collect()
}

/// Multiset equality.
pub fn compare_bags(expected: &[String], actual: &[String]) -> bool {
    let mut expected = expected.to_vec();
    let mut actual = actual.to_vec();
    expected.sort_unstable();
    actual.sort_unstable();
    expected == actual
}

/// Set equality.
pub fn compare_sets(expected: &[String], actual: &[String]) -> bool {
    let expected: BTreeSet<&String> = expected.iter().collect();
    let actual: BTreeSet<&String> = actual.iter().collect();
    expected == actual
}

/// Whether an aggregate difference is a real discrepancy rather than float
/// noise or overflow.
pub fn diff_violates(diff: f64) -> bool {
    let magnitude = diff.abs();
    magnitude > 1e-3 && magnitude < 1e100
}

/// The integer in the first row of a single-column result.
pub fn count_from(values: &[Option<String>]) -> Option<i64> {
    values.first()?.as_deref()?.trim().parse().ok()
}

/// Rows only in one side of a bag comparison, for violation messages.
pub(crate) fn bag_difference(expected: &[String], actual: &[String]) -> (Vec<String>, Vec<String>) {
    let mut only_expected = Vec::new();
    let mut remaining = actual.to_vec();
    for row in expected {
        match remaining.iter().position(|r| r == row) {
            Some(i) => {
                remaining.swap_remove(i);
            }
            None => only_expected.push(row.clone()),
        }
    }
    (only_expected, remaining)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::SqliteEngine;
    use crate::schema::SchemaIntrospector;
    use crate::setup::{DatabaseBuilder, SetupConfig};
    use query_gen::{AssembledQuery, Bindings, Column, Expr, FromClause, Select};

    /// A fresh in-memory engine with `ddl` applied.
    pub(crate) fn engine_with(ddl: &str) -> SqliteEngine {
        let engine = SqliteEngine::open_in_memory().unwrap();
        engine.execute(ddl).unwrap();
        engine
    }

    /// The engine's schema, read back through introspection.
    pub(crate) fn schema_of(engine: &SqliteEngine) -> Schema {
        SchemaIntrospector::from_sqlite(engine.connection()).unwrap()
    }

    /// `SELECT <every column> FROM tables` with no WHERE, default bindings
    /// and every column in the all-columns scope only.
    pub(crate) fn query_over(schema: &Schema, tables: &[&str]) -> AssembledQuery {
        let columns: Vec<Column> = tables
            .iter()
            .flat_map(|t| schema.get_table(t).unwrap().columns.clone())
            .collect();
        let select = Select::new(
            columns.iter().map(Expr::column).collect(),
            FromClause::list(tables.iter().copied()),
        );
        AssembledQuery {
            select,
            tables: tables.iter().map(|t| t.to_string()).collect(),
            all_columns: columns,
            group_by_columns: Vec::new(),
            aggregate_columns: Vec::new(),
            bindings: Bindings::new(),
            policy: Policy::default(),
        }
    }

    /// Fail on any violation or fatal outcome; SQLite is taken to be correct.
    pub(crate) fn assert_holds(outcomes: &[Outcome]) {
        for outcome in outcomes {
            assert!(!outcome.is_fatal() && !outcome.is_violated(), "{outcome:?}");
        }
    }

    /// Run `oracle` once against a fresh random database per seed.
    pub(crate) fn run_random(oracle: &dyn Oracle, seeds: std::ops::Range<u64>) -> Vec<Outcome> {
        let policy = Policy::default();
        let classifier = ErrorClassifier::sqlite().unwrap();
        seeds
            .map(|seed| {
                let engine = SqliteEngine::open_in_memory().unwrap();
                DatabaseBuilder::new(SetupConfig::default(), &policy)
                    .build(&engine, &mut Context::new_with_seed(seed))
                    .unwrap();
                let schema = schema_of(&engine);
                let mut env = CheckEnv::new(&engine, &schema, &policy, &classifier, seed);
                oracle.check(&mut env)
            })
            .collect()
    }

    #[test]
    fn test_compare_bags_and_sets() {
        let a = vec!["1".to_string(), "1".into(), "2".into()];
        let b = vec!["2".to_string(), "1".into(), "1".into()];
        let c = vec!["1".to_string(), "2".into()];
        assert!(compare_bags(&a, &b));
        assert!(!compare_bags(&a, &c));
        assert!(compare_sets(&a, &c));
        assert!(!compare_sets(&a, &["3".to_string()]));
    }

    #[test]
    fn test_bag_difference() {
        let a = vec!["1".to_string(), "1".into(), "2".into()];
        let b = vec!["1".to_string(), "3".into()];
        let (left, right) = bag_difference(&a, &b);
        assert_eq!(left, vec!["1".to_string(), "2".into()]);
        assert_eq!(right, vec!["3".to_string()]);
    }

    #[test]
    fn test_diff_violates() {
        assert!(!diff_violates(0.0));
        assert!(!diff_violates(0.0005));
        assert!(!diff_violates(-0.0009));
        assert!(diff_violates(0.01));
        assert!(diff_violates(-3.0));
        assert!(!diff_violates(1e101));
        assert!(!diff_violates(f64::NAN));
    }

    #[test]
    fn test_count_from() {
        assert_eq!(count_from(&[Some("3".into())]), Some(3));
        assert_eq!(count_from(&[None]), None);
        assert_eq!(count_from(&[Some("x".into())]), None);
        assert_eq!(count_from(&[]), None);
    }

    #[test]
    fn test_unexpected_error_is_violation() {
        let engine = engine_with("CREATE TABLE t0 (v0 BIGINT)");
        let schema = Schema::default();
        let policy = Policy::default();
        let classifier = ErrorClassifier::sqlite().unwrap();
        let mut env = CheckEnv::new(&engine, &schema, &policy, &classifier, 1);

        let result = env.query("SELECT * FROM no_such_table").map(|_| ());
        let outcome = finish("test", result, &env);
        let Outcome::Violated(v) = outcome else {
            panic!("expected violation, got {outcome:?}");
        };
        assert_eq!(v.queries, vec!["SELECT * FROM no_such_table".to_string()]);

        let result = env.query("SELECT no_such_fn(v0) FROM t0").map(|_| ());
        assert!(finish("test", result, &env).is_skipped());
    }

    #[test]
    fn test_gen_errors_map_by_kind() {
        let engine = engine_with("CREATE TABLE t0 (v0 BIGINT)");
        let schema = Schema::default();
        let policy = Policy::default();
        let classifier = ErrorClassifier::new();
        let env = CheckEnv::new(&engine, &schema, &policy, &classifier, 1);

        let fatal = finish("test", Err(GenError::invariant("bad catalog").into()), &env);
        assert!(fatal.is_fatal());
        let skipped = finish("test", Err(GenError::schema_empty("tables").into()), &env);
        assert!(skipped.is_skipped());
    }

    #[test]
    fn test_every_kind_has_an_oracle() {
        for kind in OracleKind::ALL {
            assert!(!kind.oracle().name().is_empty());
        }
    }
}
