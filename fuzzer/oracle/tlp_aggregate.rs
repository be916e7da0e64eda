//! Ternary logic partitioning of MIN, MAX, SUM and COUNT.
//!
//! The aggregate over the whole table is recombined from the aggregates over
//! the three partitions by the matching combiner (SUM for COUNT), inside a
//! single difference query.

use query_gen::{
    AssembledQuery, Expr, OperatorSignature, PredicateTriple, assemble_select, catalog, printer,
};

use super::{CheckEnv, CheckError, Oracle, Outcome, diff_violates, finish};

/// Aggregates the oracle can partition.
const AGGREGATES: [&OperatorSignature; 4] = [
    &catalog::MIN,
    &catalog::MAX,
    &catalog::SUM,
    &catalog::COUNT,
];

pub struct TlpAggregate;

impl Oracle for TlpAggregate {
    fn name(&self) -> &'static str {
        "tlp-aggregate"
    }

    fn check(&self, env: &mut CheckEnv<'_>) -> Outcome {
        let result = run(env);
        finish(self.name(), result, env)
    }
}

/// Function combining the partition results of `aggregate`.
fn combiner(aggregate: &OperatorSignature) -> &'static str {
    match aggregate.name {
        "MIN" => "MIN",
        "MAX" => "MAX",
        _ => "SUM",
    }
}

fn run(env: &mut CheckEnv<'_>) -> Result<(), CheckError> {
    let mut query = assemble_select(env.schema, env.policy, &mut env.ctx)?;
    let ctx = &mut env.ctx;

    let aggregate = ctx.choose(&AGGREGATES).copied().unwrap_or(&catalog::COUNT);
    let argument = query.gen_all().generate_any(ctx)?;
    let predicate = query.gen_all().predicate(ctx)?;
    query.select.fetch = vec![Expr::call(aggregate, vec![argument])];
    query.select.where_clause = None;

    compare(env, &mut query, aggregate, predicate)
}

/// Check the aggregate fetched by `query` against its recombined partitions.
pub(crate) fn compare(
    env: &mut CheckEnv<'_>,
    query: &mut AssembledQuery,
    aggregate: &OperatorSignature,
    predicate: Expr,
) -> Result<(), CheckError> {
    query
        .bindings
        .mutate_members(env.schema, &query.tables, &mut env.ctx)?;
    let whole = printer::sql(&query.select, &query.bindings).to_string();

    let mut parts = Vec::with_capacity(3);
    for part in PredicateTriple::new(predicate).into_parts() {
        let mut partitioned = query.select.clone();
        partitioned.where_clause = Some(part);
        query
            .bindings
            .mutate_members(env.schema, &query.tables, &mut env.ctx)?;
        parts.push(printer::sql(&partitioned, &query.bindings).to_string());
    }

    let sql = format!(
        "SELECT ({whole}) - (SELECT {}(value) FROM (SELECT ({}) AS value UNION ALL SELECT ({}) UNION ALL SELECT ({})) AS sub) AS result_difference",
        combiner(aggregate),
        parts[0],
        parts[1],
        parts[2],
    );
    let values = env.first_column(&sql)?;
    let Some(Some(text)) = values.first() else {
        return Ok(());
    };
    let diff = parse_difference(text)?;
    if diff_violates(diff) {
        return Err(CheckError::Violated(format!(
            "{} over the table differs from its partitions by {diff}",
            aggregate.name
        )));
    }
    Ok(())
}

fn parse_difference(text: &str) -> Result<f64, CheckError> {
    let trimmed = text.trim();
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.contains("nan") || lowered.contains("inf") {
        return Err(CheckError::Skip(format!("non-finite difference {trimmed}")));
    }
    match trimmed.parse::<f64>() {
        Ok(diff) if diff.is_finite() => Ok(diff),
        _ => Err(CheckError::Skip(format!("unparseable difference {trimmed}"))),
    }
}
