//! Random database construction.
//!
//! Builds base tables `t{i}` with random columns and rows, then adds the
//! equivalence members of each base table: an indexed copy `t{i}_indexed`
//! and a view `t{i}_view`. Members share the base name, so introspection
//! puts them in the same equivalence group.

use anyhow::{Context as _, Result};
use query_gen::generate::literal::generate_literal;
use query_gen::{Bindings, Context, DataType, Expr, Policy, printer};

use crate::engine::Engine;

/// Limits for the generated database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupConfig {
    /// Maximum number of base tables.
    pub max_tables: usize,
    /// Maximum number of columns per base table.
    pub max_columns: usize,
    /// Maximum number of INSERT statements per base table.
    pub max_inserts: usize,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            max_tables: 3,
            max_columns: 3,
            max_inserts: 5,
        }
    }
}

/// Maximum number of rows in one INSERT statement.
const MAX_ROWS_PER_INSERT: usize = 3;

/// Builds a fresh random database on an engine.
pub struct DatabaseBuilder<'a> {
    config: SetupConfig,
    policy: &'a Policy,
}

impl<'a> DatabaseBuilder<'a> {
    pub fn new(config: SetupConfig, policy: &'a Policy) -> Self {
        Self { config, policy }
    }

    /// Generate the setup statements without executing them.
    pub fn statements(&self, ctx: &mut Context) -> Vec<String> {
        let n_tables = ctx.gen_range_inclusive(1, self.config.max_tables.max(1));
        let mut statements = Vec::new();
        let mut tables = Vec::with_capacity(n_tables);

        for i in 0..n_tables {
            let n_columns = ctx.gen_range_inclusive(1, self.config.max_columns.max(1));
            let columns: Vec<(String, DataType)> = (0..n_columns)
                .map(|j| (format!("v{j}"), DataType::random_without_null(ctx)))
                .collect();
            let name = format!("t{i}");
            statements.push(create_table(&name, &columns));

            let n_inserts = ctx.gen_range_inclusive(0, self.config.max_inserts);
            for _ in 0..n_inserts {
                statements.push(self.insert(ctx, &name, &columns));
            }
            tables.push((name, columns));
        }

        for (name, columns) in &tables {
            let indexed = format!("{name}_indexed");
            statements.push(create_table(&indexed, columns));
            statements.push(format!("INSERT INTO {indexed} SELECT * FROM {name}"));
            if let Some((first, _)) = columns.first() {
                statements.push(format!("CREATE INDEX {indexed}_{first} ON {indexed} ({first})"));
            }
            statements.push(format!("CREATE VIEW {name}_view AS SELECT * FROM {name}"));
        }

        statements
    }

    /// Generate and execute the setup statements, returning them in order.
    pub fn build(&self, engine: &dyn Engine, ctx: &mut Context) -> Result<Vec<String>> {
        let statements = self.statements(ctx);
        for sql in &statements {
            tracing::debug!("setup: {sql}");
            engine
                .execute(sql)
                .with_context(|| format!("Setup statement failed: {sql}"))?;
        }
        tracing::info!("Created database with {} setup statements", statements.len());
        Ok(statements)
    }

    fn insert(&self, ctx: &mut Context, table: &str, columns: &[(String, DataType)]) -> String {
        let bindings = Bindings::new();
        let n_rows = ctx.gen_range_inclusive(1, MAX_ROWS_PER_INSERT);
        let rows: Vec<String> = (0..n_rows)
            .map(|_| {
                let values: Vec<String> = columns
                    .iter()
                    .map(|(_, ty)| {
                        let value = Expr::constant(generate_literal(ctx, *ty, self.policy));
                        printer::sql(&value, &bindings).to_string()
                    })
                    .collect();
                format!("({})", values.join(", "))
            })
            .collect();
        format!("INSERT INTO {table} VALUES {}", rows.join(", "))
    }
}

fn create_table(name: &str, columns: &[(String, DataType)]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .map(|(col, ty)| format!("{col} {}", ty.ddl_name()))
        .collect();
    format!("CREATE TABLE {name} ({})", defs.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SqliteEngine;
    use crate::schema::SchemaIntrospector;

    #[test]
    fn test_statements_are_deterministic() {
        let policy = Policy::default();
        let builder = DatabaseBuilder::new(SetupConfig::default(), &policy);
        let a = builder.statements(&mut Context::new_with_seed(3));
        let b = builder.statements(&mut Context::new_with_seed(3));
        assert_eq!(a, b);
        assert!(a[0].starts_with("CREATE TABLE t0 ("));
    }

    #[test]
    fn test_build_creates_equivalence_groups() {
        let policy = Policy::default();
        let config = SetupConfig {
            max_tables: 2,
            max_columns: 4,
            max_inserts: 3,
        };
        let builder = DatabaseBuilder::new(config, &policy);
        for seed in 0..10 {
            let engine = SqliteEngine::open_in_memory().unwrap();
            let mut ctx = Context::new_with_seed(seed);
            builder.build(&engine, &mut ctx).unwrap();

            let schema = SchemaIntrospector::from_sqlite(engine.connection()).unwrap();
            assert!(!schema.groups.is_empty() && schema.groups.len() <= 2);
            for (base, members) in &schema.groups {
                assert_eq!(members.len(), 3, "{base}: {members:?}");
                let counts: Vec<_> = members
                    .iter()
                    .map(|m| engine.first_column(&format!("SELECT COUNT(*) FROM {m}")).unwrap())
                    .collect();
                assert!(counts.iter().all(|c| c == &counts[0]));
            }
        }
    }
}
