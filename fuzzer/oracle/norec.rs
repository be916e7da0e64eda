//! Non-optimizing reference engine construction.
//!
//! `SELECT COUNT(*) FROM F WHERE P` is typically optimized through the
//! predicate, while `SELECT COUNT(CASE WHEN P THEN 1 ELSE NULL END) FROM F`
//! has to evaluate `P` on every row. Both count the rows where `P` is TRUE.

use query_gen::{AssembledQuery, Expr, Literal, Select, assemble_select, catalog, printer};

use super::{CheckEnv, CheckError, Oracle, Outcome, count_from, finish};

pub struct NoRec;

impl Oracle for NoRec {
    fn name(&self) -> &'static str {
        "norec"
    }

    fn check(&self, env: &mut CheckEnv<'_>) -> Outcome {
        let result = run(env);
        finish(self.name(), result, env)
    }
}

fn run(env: &mut CheckEnv<'_>) -> Result<(), CheckError> {
    let mut query = assemble_select(env.schema, env.policy, &mut env.ctx)?;
    let predicate = match query.select.where_clause.take() {
        Some(predicate) => predicate,
        None => query.gen_all().predicate(&mut env.ctx)?,
    };
    compare_counts(env, &mut query, &predicate)
}

/// Run the optimized and unoptimized counts of `predicate` over the FROM
/// clause of `query` and compare them.
pub(crate) fn compare_counts(
    env: &mut CheckEnv<'_>,
    query: &mut AssembledQuery,
    predicate: &Expr,
) -> Result<(), CheckError> {
    query
        .bindings
        .mutate_members(env.schema, &query.tables, &mut env.ctx)?;
    let mut optimized = Select::new(vec![Expr::count_star()], query.select.from.clone());
    optimized.where_clause = Some(predicate.clone());
    let optimized_sql = printer::sql(&optimized, &query.bindings).to_string();

    query
        .bindings
        .mutate_members(env.schema, &query.tables, &mut env.ctx)?;
    let flag = Expr::case(
        predicate.clone(),
        Expr::constant(Literal::BigInt(1)),
        Expr::null(),
    );
    let unoptimized = Select::new(
        vec![Expr::call(&catalog::COUNT, vec![flag])],
        query.select.from.clone(),
    );
    let unoptimized_sql = printer::sql(&unoptimized, &query.bindings).to_string();

    let optimized_count = count(env, &optimized_sql)?;
    let unoptimized_count = count(env, &unoptimized_sql)?;
    if optimized_count == unoptimized_count {
        return Ok(());
    }
    if query.select.from.has_natural_join() {
        return Err(CheckError::Skip(
            "count mismatch under NATURAL JOIN".to_string(),
        ));
    }
    Err(CheckError::Violated(format!(
        "WHERE count {optimized_count} != CASE count {unoptimized_count}"
    )))
}

fn count(env: &mut CheckEnv<'_>, sql: &str) -> Result<i64, CheckError> {
    let values = env.first_column(sql)?;
    count_from(&values).ok_or_else(|| CheckError::Skip(format!("non-integer count from {sql}")))
}
