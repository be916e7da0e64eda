//! Crash oracles for aggregate and window queries.
//!
//! These only require that a query either runs or fails with an expected
//! error. Arity fuzzing is on, so calls may carry argument lists their
//! functions reject.

use query_gen::{DataType, assemble_select, generate_window, having_clause, printer};

use super::{CheckEnv, CheckError, Oracle, Outcome, finish};

pub struct NoCrashAggregate;

impl Oracle for NoCrashAggregate {
    fn name(&self) -> &'static str {
        "nocrash-aggregate"
    }

    fn check(&self, env: &mut CheckEnv<'_>) -> Outcome {
        let result = run_aggregate(env);
        finish(self.name(), result, env)
    }
}

pub struct NoCrashWindow;

impl Oracle for NoCrashWindow {
    fn name(&self) -> &'static str {
        "nocrash-window"
    }

    fn check(&self, env: &mut CheckEnv<'_>) -> Outcome {
        let result = run_window(env);
        finish(self.name(), result, env)
    }
}

fn run_aggregate(env: &mut CheckEnv<'_>) -> Result<(), CheckError> {
    let mut query = assemble_select(env.schema, env.policy, &mut env.ctx)?;
    let ctx = &mut env.ctx;

    query.select.distinct = ctx.gen_bool();
    if ctx.gen_bool() {
        query.select.order_by = query.gen_all().generate_order_bys(ctx)?;
    }
    if ctx.gen_bool() {
        query.select.where_clause = None;
    }
    if ctx.gen_bool_with_prob(env.policy.grouped_aggregate_probability) {
        query.set_aggregates(ctx)?;
        if ctx.gen_bool() {
            let having = having_clause(ctx, query.gen_group_by(), query.gen_aggregate())?;
            query.select.having = Some(having);
        }
    }

    let fuzzed = {
        let generator = query
            .gen_aggregate()
            .with_aggregates(true)
            .with_fuzz_arity(true);
        let ty = *ctx.choose(DataType::NUMERIC).unwrap_or(&DataType::BigInt);
        generator.generate(ctx, ty, 0)?
    };
    query.select.fetch.push(fuzzed);

    query
        .bindings
        .mutate_members(env.schema, &query.tables, &mut env.ctx)?;
    let sql = printer::sql(&query.select, &query.bindings).to_string();
    env.query(&sql)?;
    Ok(())
}

fn run_window(env: &mut CheckEnv<'_>) -> Result<(), CheckError> {
    let mut query = assemble_select(env.schema, env.policy, &mut env.ctx)?;
    let ctx = &mut env.ctx;

    let ty = DataType::random_without_null(ctx);
    let generator = query.gen_all().with_fuzz_arity(true);
    let window = generate_window(&generator, ctx, ty)?;
    query.select.fetch = vec![window];

    query
        .bindings
        .mutate_members(env.schema, &query.tables, &mut env.ctx)?;
    let sql = printer::sql(&query.select, &query.bindings).to_string();
    env.query(&sql)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::tests::{assert_holds, run_random};

    #[test]
    fn test_aggregate_runs_hold() {
        let outcomes = run_random(&NoCrashAggregate, 0..100);
        assert_holds(&outcomes);
        assert!(outcomes.iter().any(Outcome::is_checked));
    }

    #[test]
    fn test_window_runs_hold() {
        let outcomes = run_random(&NoCrashWindow, 0..100);
        assert_holds(&outcomes);
        assert!(outcomes.iter().any(Outcome::is_checked));
    }
}
