//! Ternary logic partitioning of WHERE and HAVING.
//!
//! For any predicate `P` every row (or group) satisfies exactly one of `P`,
//! `NOT P` and `P IS NULL`. Filtering a query by each of the three and
//! combining the results must therefore give back the unfiltered query.

use query_gen::{
    AssembledQuery, Expr, PredicateTriple, Select, assemble_select, having_clause, printer,
};

use super::{
    CheckEnv, CheckError, Oracle, Outcome, bag_difference, canonical_rows, compare_bags,
    compare_sets, finish,
};

/// How partitions are combined before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combine {
    /// Multiset union.
    Bag,
    /// Set union; DISTINCT and GROUP BY collapse duplicates across partitions.
    Set,
}

/// Where the partitioning predicate is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Where,
    Having,
}

pub struct TlpWhere;

impl Oracle for TlpWhere {
    fn name(&self) -> &'static str {
        "tlp-where"
    }

    fn check(&self, env: &mut CheckEnv<'_>) -> Outcome {
        let result = run_where(env);
        finish(self.name(), result, env)
    }
}

pub struct TlpHaving;

impl Oracle for TlpHaving {
    fn name(&self) -> &'static str {
        "tlp-having"
    }

    fn check(&self, env: &mut CheckEnv<'_>) -> Outcome {
        let result = run_having(env);
        finish(self.name(), result, env)
    }
}

fn run_where(env: &mut CheckEnv<'_>) -> Result<(), CheckError> {
    let mut query = assemble_select(env.schema, env.policy, &mut env.ctx)?;
    let ctx = &mut env.ctx;

    query.select.distinct = ctx.gen_bool();
    if ctx.gen_bool() {
        query.select.order_by = query.gen_all().generate_order_bys(ctx)?;
    }
    if ctx.gen_bool_with_prob(env.policy.tlp_group_by_probability) {
        let group_by = query.gen_group_by().generate_expressions(ctx)?;
        query.select.fetch = group_by.clone();
        query.select.group_by = group_by;
    }

    // Mode B keeps the generated WHERE as a common filter E.
    if ctx.gen_bool() {
        query.select.where_clause = None;
    }
    let predicate = query.gen_all().predicate(ctx)?;

    let combine = if query.select.distinct || !query.select.group_by.is_empty() {
        Combine::Set
    } else {
        Combine::Bag
    };
    partition(env, &mut query, predicate, Slot::Where, combine)
}

fn run_having(env: &mut CheckEnv<'_>) -> Result<(), CheckError> {
    let mut query = assemble_select(env.schema, env.policy, &mut env.ctx)?;
    let ctx = &mut env.ctx;

    query.select.distinct = ctx.gen_bool();
    if ctx.gen_bool() {
        query.select.order_by = query.gen_all().generate_order_bys(ctx)?;
    }
    if ctx.gen_bool() {
        query.select.where_clause = None;
    }
    query.set_aggregates(ctx)?;
    let predicate = having_clause(ctx, query.gen_group_by(), query.gen_aggregate())?;

    let combine = if query.select.distinct {
        Combine::Set
    } else {
        Combine::Bag
    };
    partition(env, &mut query, predicate, Slot::Having, combine)
}

/// Compare `query` against the union of its three partitions by
/// `predicate`.
///
/// For [`Slot::Where`] an existing WHERE clause `E` is kept in every
/// partition as `E AND P`, `E AND NOT P`, `E AND (P IS NULL)`. Members are
/// re-picked before each query is rendered.
pub(crate) fn partition(
    env: &mut CheckEnv<'_>,
    query: &mut AssembledQuery,
    predicate: Expr,
    slot: Slot,
    combine: Combine,
) -> Result<(), CheckError> {
    let mut base = query.select.clone();
    if slot == Slot::Having {
        base.having = None;
    }

    query
        .bindings
        .mutate_members(env.schema, &query.tables, &mut env.ctx)?;
    let base_sql = printer::sql(&base, &query.bindings).to_string();

    let mut partition_sqls = Vec::with_capacity(3);
    for part in PredicateTriple::new(predicate).into_parts() {
        let partitioned = with_predicate(&base, part, slot);
        query
            .bindings
            .mutate_members(env.schema, &query.tables, &mut env.ctx)?;
        partition_sqls.push(printer::sql(&partitioned, &query.bindings).to_string());
    }

    let expected = canonical_rows(&env.query(&base_sql)?);
    let mut actual = Vec::new();
    for sql in &partition_sqls {
        actual.extend(canonical_rows(&env.query(sql)?));
    }

    let equal = match combine {
        Combine::Bag => compare_bags(&expected, &actual),
        Combine::Set => compare_sets(&expected, &actual),
    };
    if equal {
        return Ok(());
    }
    let (missing, extra) = bag_difference(&expected, &actual);
    Err(CheckError::Violated(format!(
        "{} rows vs {} rows in partitions ({combine:?}); only in query: {missing:?}; only in partitions: {extra:?}",
        expected.len(),
        actual.len(),
    )))
}

fn with_predicate(base: &Select, part: Expr, slot: Slot) -> Select {
    let mut select = base.clone();
    match slot {
        Slot::Where => {
            select.where_clause = Some(match select.where_clause.take() {
                Some(common) => Expr::and(common, part),
                None => part,
            });
        }
        Slot::Having => select.having = Some(part),
    }
    select
}
