//! Reproduction artifact.
//!
//! A transcript replays a failing check from scratch: the seeds, every setup
//! statement, then the failing check's queries. It is written as plain SQL
//! (`test.sql`) so it can be fed straight to the engine's shell.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Statements needed to reproduce a run.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    run_seed: u64,
    check_seed: Option<u64>,
    oracle: Option<String>,
    setup: Vec<String>,
    failed: Vec<String>,
}

impl Transcript {
    pub fn new(run_seed: u64) -> Self {
        Self {
            run_seed,
            ..Self::default()
        }
    }

    /// Record a setup statement that was executed successfully.
    pub fn record_setup(&mut self, sql: impl Into<String>) {
        self.setup.push(sql.into());
    }

    pub fn setup(&self) -> &[String] {
        &self.setup
    }

    /// Record the failing check: its oracle, seed and queries.
    pub fn record_failure(&mut self, oracle: &str, check_seed: u64, queries: &[String]) {
        self.oracle = Some(oracle.to_string());
        self.check_seed = Some(check_seed);
        self.failed = queries.to_vec();
    }

    pub fn has_failure(&self) -> bool {
        self.check_seed.is_some()
    }

    /// Render the transcript as SQL text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("-- run seed: {}\n", self.run_seed));
        if let Some(seed) = self.check_seed {
            out.push_str(&format!("-- check seed: {seed}\n"));
        }
        if let Some(oracle) = &self.oracle {
            out.push_str(&format!("-- oracle: {oracle}\n"));
        }
        out.push('\n');
        for sql in &self.setup {
            out.push_str(&format!("{sql};\n"));
        }
        for sql in &self.failed {
            out.push_str(&format!("\n-- FAILED:\n{sql};\n"));
        }
        out
    }

    /// Write `test.sql` into `dir`, creating the directory if needed.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join("test.sql");
        let mut file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.write_all(self.render().as_bytes())?;
        tracing::info!(
            "Wrote {} setup and {} failing statements to {}",
            self.setup.len(),
            self.failed.len(),
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_layout() {
        let mut transcript = Transcript::new(7);
        transcript.record_setup("CREATE TABLE t0 (v0 BIGINT)");
        transcript.record_setup("INSERT INTO t0 VALUES (1)");
        assert!(!transcript.has_failure());
        transcript.record_failure(
            "norec",
            99,
            &["SELECT COUNT(*) FROM t0 WHERE true".to_string()],
        );

        let text = transcript.render();
        assert!(text.starts_with("-- run seed: 7\n-- check seed: 99\n-- oracle: norec\n"));
        let create = text.find("CREATE TABLE t0").unwrap();
        let failed = text.find("-- FAILED:\nSELECT COUNT(*)").unwrap();
        assert!(create < failed);
        assert!(text.ends_with("WHERE true;\n"));
    }

    #[test]
    fn test_write_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut transcript = Transcript::new(1);
        transcript.record_setup("CREATE TABLE t0 (v0 TEXT)");
        let path = transcript.write_to(&dir.path().join("out")).unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written, transcript.render());
    }
}
