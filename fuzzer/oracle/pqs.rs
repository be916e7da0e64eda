//! Pivoted query synthesis.
//!
//! A random pivot row is sampled from a cross product of tables into `tt`.
//! A predicate that is TRUE for the pivot row is then used to filter the
//! same cross product into `ttt`; the pivot row must be among the results.

use query_gen::{
    AssembledQuery, Bindings, Column, Expr, FromClause, PredicateTriple, Select, Table,
    assemble_select, catalog, printer,
};

use super::{CheckEnv, CheckError, Oracle, Outcome, count_from, finish};
use crate::engine::Engine;

const PIVOT_TABLE: &str = "tt";
const RESULT_TABLE: &str = "ttt";

pub struct Pqs;

impl Oracle for Pqs {
    fn name(&self) -> &'static str {
        "pqs"
    }

    fn check(&self, env: &mut CheckEnv<'_>) -> Outcome {
        let result = run(env);
        finish(self.name(), result, env)
    }
}

/// Drops the pivot and result tables when created and when dropped.
struct ScratchTables<'e> {
    engine: &'e dyn Engine,
}

impl<'e> ScratchTables<'e> {
    fn new(engine: &'e dyn Engine) -> Self {
        let scratch = Self { engine };
        scratch.drop_all();
        scratch
    }

    fn drop_all(&self) {
        for table in [PIVOT_TABLE, RESULT_TABLE] {
            if let Err(e) = self.engine.execute(&format!("DROP TABLE IF EXISTS {table}")) {
                tracing::warn!("failed to drop {table}: {e}");
            }
        }
    }
}

impl Drop for ScratchTables<'_> {
    fn drop(&mut self) {
        self.drop_all();
    }
}

fn run(env: &mut CheckEnv<'_>) -> Result<(), CheckError> {
    let mut query = assemble_select(env.schema, env.policy, &mut env.ctx)?;
    query.select.from = FromClause::list(query.tables.iter().cloned());
    query.bindings = Bindings::new();

    query.all_columns = query
        .tables
        .iter()
        .filter_map(|name| env.schema.get_table(name))
        .flat_map(|table| table.columns.iter().cloned())
        .collect();
    let predicate = query.gen_all().predicate(&mut env.ctx)?;

    pivot(env, &mut query, predicate)
}

/// Sample a pivot row over the tables of `query` and check that a
/// predicate built from `predicate` retrieves it.
///
/// Every column in `query.all_columns` takes part; the FROM clause is the
/// plain table list of `query.tables`.
pub(crate) fn pivot(
    env: &mut CheckEnv<'_>,
    query: &mut AssembledQuery,
    predicate: Expr,
) -> Result<(), CheckError> {
    let _scratch = ScratchTables::new(env.engine);

    query
        .bindings
        .mutate_members(env.schema, &query.tables, &mut env.ctx)?;
    let mut aliased = query.bindings.clone();
    let mut aliases = Vec::with_capacity(query.all_columns.len());
    for (i, column) in query.all_columns.iter().enumerate() {
        let alias = format!("cc{i}");
        aliased.set_column_alias(column.table.clone(), column.name.clone(), alias.clone());
        aliases.push(Column::new(alias, column.data_type));
    }

    let create_pivot = pivot_table_sql(query);
    env.execute(&create_pivot)?;
    let rows = env.query(&format!("SELECT * FROM {PIVOT_TABLE}"))?;
    if rows.is_empty() {
        return Err(CheckError::Skip("a sampled table is empty".to_string()));
    }

    let mut pivot_predicate = None;
    for part in PredicateTriple::new(predicate).into_parts() {
        let sql = format!(
            "SELECT * FROM {PIVOT_TABLE} WHERE {}",
            printer::sql(&part, &aliased)
        );
        match env.query(&sql)?.len() {
            0 => continue,
            1 => {
                pivot_predicate = Some(part);
                break;
            }
            n => {
                return Err(CheckError::Fatal(format!(
                    "pivot table holds {n} rows matching {sql}"
                )));
            }
        }
    }
    let Some(pivot_predicate) = pivot_predicate else {
        return Err(CheckError::Skip("no partition holds the pivot row".to_string()));
    };

    let fetch = aliased_fetch(&query.all_columns);
    let mut filtered = Select::new(fetch, query.select.from.clone());
    filtered.where_clause = Some(pivot_predicate);
    let create_result = format!(
        "CREATE TABLE {RESULT_TABLE} AS {}",
        printer::sql(&filtered, &query.bindings)
    );
    env.execute(&create_result)?;

    let count_sql = containment_sql(&aliases);
    let count = env.first_column(&count_sql)?;
    match count_from(&count) {
        Some(0) => Err(CheckError::Violated(
            "pivot row is missing from the filtered result".to_string(),
        )),
        Some(_) => Ok(()),
        None => Err(CheckError::Skip("non-integer containment count".to_string())),
    }
}

/// `t.c AS cc{i}` for every column.
fn aliased_fetch(columns: &[Column]) -> Vec<Expr> {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| Expr::alias(Expr::column(column), format!("cc{i}")))
        .collect()
}

/// `CREATE TABLE tt AS WITH cte0 AS (... ORDER BY RANDOM() LIMIT 1), ...
/// SELECT * FROM cte0, cte1, ...`
fn pivot_table_sql(query: &AssembledQuery) -> String {
    let mut ctes = Vec::with_capacity(query.tables.len());
    for table in &query.tables {
        let fetch = query
            .all_columns
            .iter()
            .enumerate()
            .filter(|(_, c)| &c.table == table)
            .map(|(i, c)| Expr::alias(Expr::column(c), format!("cc{i}")))
            .collect();
        let mut sample = Select::new(fetch, FromClause::list([table.clone()]));
        sample.order_by = vec![Expr::call(&catalog::RANDOM, Vec::new())];
        sample.limit = Some(1);
        ctes.push(sample);
    }

    let definitions: Vec<String> = ctes
        .iter()
        .enumerate()
        .map(|(i, cte)| format!("cte{i} AS ({})", printer::sql(cte, &query.bindings)))
        .collect();
    let names: Vec<String> = (0..ctes.len()).map(|i| format!("cte{i}")).collect();
    format!(
        "CREATE TABLE {PIVOT_TABLE} AS WITH {} SELECT * FROM {}",
        definitions.join(", "),
        names.join(", ")
    )
}

/// `SELECT COUNT(*) FROM tt JOIN ttt ON (tt.cc0 IS NOT DISTINCT FROM ttt.cc0) AND ...`
fn containment_sql(aliases: &[Column]) -> String {
    let pivot = Table::new(PIVOT_TABLE, aliases.to_vec());
    let result = Table::new(RESULT_TABLE, aliases.to_vec());
    let condition = pivot
        .columns
        .iter()
        .zip(&result.columns)
        .map(|(p, r)| {
            Expr::binary(
                &catalog::IS_NOT_DISTINCT_FROM,
                Expr::column(p),
                Expr::column(r),
            )
        })
        .reduce(Expr::and);

    let bindings = Bindings::new();
    match condition {
        Some(on) => format!(
            "SELECT COUNT(*) FROM {PIVOT_TABLE} JOIN {RESULT_TABLE} ON {}",
            printer::sql(&on, &bindings)
        ),
        None => format!("SELECT COUNT(*) FROM {PIVOT_TABLE}, {RESULT_TABLE}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorClassifier;
    use crate::oracle::tests::{assert_holds, engine_with, query_over, run_random, schema_of};
    use query_gen::{DataType, Literal, Policy};

    const TWO_TABLES: &str = "CREATE TABLE t0 (v0 BIGINT);
         CREATE TABLE t1 (v0 TEXT);
         INSERT INTO t0 VALUES (1), (2), (NULL);
         INSERT INTO t1 VALUES ('a'), ('b');";

    #[test]
    fn test_pivot_row_is_found() {
        let engine = engine_with(TWO_TABLES);
        let schema = schema_of(&engine);
        let policy = Policy::default();
        let classifier = ErrorClassifier::sqlite().unwrap();
        let greater = catalog::find(">").unwrap();

        for seed in 0..20 {
            let mut env = CheckEnv::new(&engine, &schema, &policy, &classifier, seed);
            let mut query = query_over(&schema, &["t0", "t1"]);
            let predicate = Expr::binary(
                greater,
                Expr::column(&query.all_columns[0]),
                Expr::constant(Literal::BigInt(1)),
            );
            pivot(&mut env, &mut query, predicate).unwrap();

            let count_sql = env.executed().last().unwrap().clone();
            assert!(count_sql.starts_with(
                "SELECT COUNT(*) FROM tt JOIN ttt ON ((tt.cc0 IS NOT DISTINCT FROM ttt.cc0) AND"
            ));
            // The scratch tables are gone once the check returns.
            assert!(engine.query("SELECT * FROM tt").is_err());
            assert!(engine.query("SELECT * FROM ttt").is_err());
        }
    }

    #[test]
    fn test_count_is_at_least_one() {
        let engine = engine_with(TWO_TABLES);
        let schema = schema_of(&engine);
        let policy = Policy::default();
        let classifier = ErrorClassifier::sqlite().unwrap();

        for seed in 0..20 {
            let mut env = CheckEnv::new(&engine, &schema, &policy, &classifier, seed);
            let mut query = query_over(&schema, &["t0", "t1"]);
            let predicate = Expr::is_null(Expr::column(&query.all_columns[1]));
            // A zero count is a violation and a bad count a skip, so success
            // means the pivot row was found at least once.
            pivot(&mut env, &mut query, predicate).unwrap();
            assert!(
                env.executed()
                    .iter()
                    .any(|sql| sql.starts_with("CREATE TABLE ttt AS") && sql.contains("(NOT "))
            );
        }
    }

    #[test]
    fn test_empty_table_skips() {
        let engine = engine_with(
            "CREATE TABLE t0 (v0 BIGINT);
             CREATE TABLE t1 (v0 BIGINT);
             INSERT INTO t0 VALUES (1);",
        );
        let schema = schema_of(&engine);
        let policy = Policy::default();
        let classifier = ErrorClassifier::sqlite().unwrap();
        let mut env = CheckEnv::new(&engine, &schema, &policy, &classifier, 1);
        let mut query = query_over(&schema, &["t0", "t1"]);
        let predicate = Expr::is_null(Expr::column(&query.all_columns[0]));
        let err = pivot(&mut env, &mut query, predicate).unwrap_err();
        assert!(matches!(err, CheckError::Skip(_)), "{err}");
    }

    #[test]
    fn test_pivot_table_sql() {
        let engine = engine_with(TWO_TABLES);
        let schema = schema_of(&engine);
        let query = query_over(&schema, &["t0", "t1"]);
        assert_eq!(
            pivot_table_sql(&query),
            "CREATE TABLE tt AS WITH \
             cte0 AS (SELECT t0.v0 AS cc0 FROM t0 ORDER BY RANDOM() LIMIT 1), \
             cte1 AS (SELECT t1.v0 AS cc1 FROM t1 ORDER BY RANDOM() LIMIT 1) \
             SELECT * FROM cte0, cte1"
        );
    }

    #[test]
    fn test_containment_sql() {
        let aliases = vec![
            Column::new("cc0", DataType::BigInt),
            Column::new("cc1", DataType::String),
        ];
        assert_eq!(
            containment_sql(&aliases),
            "SELECT COUNT(*) FROM tt JOIN ttt ON \
             ((tt.cc0 IS NOT DISTINCT FROM ttt.cc0) AND (tt.cc1 IS NOT DISTINCT FROM ttt.cc1))"
        );
    }

    #[test]
    fn test_random_runs_hold() {
        assert_holds(&run_random(&Pqs, 0..100));
    }
}
