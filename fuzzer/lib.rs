//! This fuzzer looks for logic bugs in a SQL engine with metamorphic oracles
//! (NoREC, TLP, PQS) and for unexpected errors with crash oracles. It builds
//! a random database, introspects its schema, and runs seeded checks that
//! derive related queries from one generated query and compare their
//! results.

pub mod engine;
pub mod errors;
pub mod oracle;
pub mod runner;
pub mod schema;
pub mod setup;
pub mod transcript;

pub use engine::{Engine, EngineError, Row, SqlValue, SqliteEngine};
pub use errors::{ErrorCategory, ErrorClassifier, ErrorPattern, PatternMatcher};
pub use oracle::{CheckEnv, Oracle, OracleKind, Outcome, Violation};
pub use runner::{Fuzzer, OracleTally, SimConfig, SimStats, run_jobs};
pub use schema::SchemaIntrospector;
pub use setup::{DatabaseBuilder, SetupConfig};
pub use transcript::Transcript;
