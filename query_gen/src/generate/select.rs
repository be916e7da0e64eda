//! SELECT assembly.
//!
//! A query is assembled over logical tables, so it never names two members
//! of one equivalence group. The selected columns are split into three
//! scopes that the oracles draw expressions from:
//!
//! ```text
//! columns:   [c0 c1 | c2 c3 | c4]
//!             group   aggregate
//!             by      arguments
//! ```
//!
//! `gen_all` sees every column, `gen_group_by` the first slice and
//! `gen_aggregate` the second one.

use strum::IntoEnumIterator;

use crate::ast::{Expr, FromClause, Join, JoinKind, Select, TableRef};
use crate::bindings::Bindings;
use crate::context::Context;
use crate::error::GenError;
use crate::generate::expr::ExprGenerator;
use crate::policy::Policy;
use crate::schema::{Column, DataType, Schema, Table};

/// A generated SELECT together with everything needed to derive related
/// queries from it.
#[derive(Debug, Clone)]
pub struct AssembledQuery {
    pub select: Select,
    /// Logical table names, in FROM order.
    pub tables: Vec<String>,
    pub all_columns: Vec<Column>,
    pub group_by_columns: Vec<Column>,
    pub aggregate_columns: Vec<Column>,
    pub bindings: Bindings,
    pub policy: Policy,
}

impl AssembledQuery {
    /// Generator over every selected column.
    pub fn gen_all(&self) -> ExprGenerator<'_> {
        ExprGenerator::new(&self.policy, &self.all_columns)
    }

    /// Generator over the group-by scope.
    pub fn gen_group_by(&self) -> ExprGenerator<'_> {
        ExprGenerator::new(&self.policy, &self.group_by_columns)
    }

    /// Generator over the aggregate scope. Aggregates are still disabled;
    /// callers enable them where an aggregate may appear.
    pub fn gen_aggregate(&self) -> ExprGenerator<'_> {
        ExprGenerator::new(&self.policy, &self.aggregate_columns)
    }

    /// Turn the query into an aggregate query.
    ///
    /// Every group-by column becomes a GROUP BY term, followed by up to
    /// `max_list_size` extra expressions over the group-by scope. Aggregate
    /// expressions reference the aggregate scope only inside aggregate
    /// calls. The fetch list is a random non-empty subset of both, so every
    /// fetched value is determined by its group.
    pub fn set_aggregates(&mut self, ctx: &mut Context) -> Result<(), GenError> {
        let max = self.policy.max_list_size;

        let group_by = {
            let generator = self.gen_group_by();
            let mut terms: Vec<Expr> = self.group_by_columns.iter().map(Expr::column).collect();
            let min = usize::from(terms.is_empty());
            let n = ctx.gen_range_inclusive(min, max);
            for _ in 0..n {
                terms.push(generator.generate_any(ctx)?);
            }
            terms
        };

        let aggregates = {
            let generator = self.gen_aggregate();
            let n = ctx.gen_range_inclusive(1, max);
            (0..n)
                .map(|_| {
                    let ty = *ctx.choose(DataType::NUMERIC).unwrap_or(&DataType::BigInt);
                    generator.aggregate_expression(ctx, ty)
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let candidates: Vec<Expr> = group_by.iter().chain(&aggregates).cloned().collect();
        self.select.fetch = ctx.nonempty_subset(&candidates);
        self.select.group_by = group_by;
        Ok(())
    }

    /// Whether the FROM clause uses explicit join syntax.
    pub fn has_joins(&self) -> bool {
        !self.select.from.joins.is_empty()
    }
}

/// Assemble a random `SELECT columns FROM tables WHERE predicate`.
pub fn assemble_select(
    schema: &Schema,
    policy: &Policy,
    ctx: &mut Context,
) -> Result<AssembledQuery, GenError> {
    let logical = schema.logical_tables();
    if logical.is_empty() {
        return Err(GenError::schema_empty("tables"));
    }

    let mut tables: Vec<&Table> = ctx.nonempty_subset(&logical);
    let cap = ctx.gen_range_inclusive(1, policy.max_tables.max(1));
    tables.truncate(cap);
    let table_names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();

    let implicit = ctx.gen_bool_with_prob(policy.implicit_from_probability);
    let from = if implicit {
        FromClause::list(table_names.iter().cloned())
    } else {
        generate_join_chain(&tables, policy, ctx)?
    };

    let mut bindings = Bindings::new();
    if !implicit && ctx.gen_bool_with_prob(policy.table_alias_probability) {
        for (i, name) in table_names.iter().enumerate() {
            bindings.set_table_alias(name.clone(), format!("tt{i}"));
        }
    }

    let every_column: Vec<Column> = tables
        .iter()
        .flat_map(|t| t.columns.iter().cloned())
        .collect();
    let all_columns = ctx.nonempty_subset(&every_column);
    let n = all_columns.len();
    let s1 = ctx.gen_range_inclusive(0, n);
    let s2 = ctx.gen_range_inclusive(s1, n);
    let group_by_columns = all_columns[..s1].to_vec();
    let aggregate_columns = all_columns[s1..s2].to_vec();

    let where_clause = ExprGenerator::new(policy, &all_columns).predicate(ctx)?;
    let fetch = all_columns.iter().map(Expr::column).collect();

    let mut select = Select::new(fetch, from);
    select.all = ctx.gen_bool_with_prob(policy.select_all_probability);
    select.where_clause = Some(where_clause);

    Ok(AssembledQuery {
        select,
        tables: table_names,
        all_columns,
        group_by_columns,
        aggregate_columns,
        bindings,
        policy: *policy,
    })
}

/// `t0 JOIN t1 ON ... LEFT JOIN t2 ...`
///
/// Join conditions see the columns of every table joined so far.
fn generate_join_chain(
    tables: &[&Table],
    policy: &Policy,
    ctx: &mut Context,
) -> Result<FromClause, GenError> {
    let Some((first, rest)) = tables.split_first() else {
        return Ok(FromClause::default());
    };

    let kinds: Vec<JoinKind> = JoinKind::iter().collect();
    let mut in_scope: Vec<Column> = first.columns.clone();
    let mut joins = Vec::with_capacity(rest.len());

    for table in rest {
        in_scope.extend(table.columns.iter().cloned());
        let kind = *ctx.choose(&kinds).unwrap_or(&JoinKind::Inner);
        let long_form = ctx.gen_bool();
        let violate = ctx.gen_bool_with_prob(policy.join_rule_violation_probability);
        let on = if kind.takes_condition() != violate {
            Some(ExprGenerator::new(policy, &in_scope).predicate(ctx)?)
        } else {
            None
        };
        joins.push(Join {
            kind,
            long_form,
            table: TableRef::new(table.name.clone()),
            on,
        });
    }

    Ok(FromClause {
        tables: vec![TableRef::new(first.name.clone())],
        joins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaBuilder, Table};

    fn schema() -> Schema {
        let cols = || {
            vec![
                Column::new("v0", DataType::BigInt),
                Column::new("v1", DataType::String),
                Column::new("v2", DataType::Double),
            ]
        };
        SchemaBuilder::new()
            .table(Table::new("t0", cols()))
            .table(Table::new("t0_indexed", cols()))
            .table(Table::new("t0_view", cols()).view())
            .table(Table::new("t1", cols()))
            .table(Table::new("t2", vec![Column::new("v0", DataType::Boolean)]))
            .build()
    }

    #[test]
    fn test_empty_schema_is_reported() {
        let mut ctx = Context::new_with_seed(1);
        let err = assemble_select(&Schema::default(), &Policy::default(), &mut ctx).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_logical_tables_only() {
        let schema = schema();
        let policy = Policy::default();
        let mut ctx = Context::new_with_seed(2);
        for _ in 0..100 {
            let q = assemble_select(&schema, &policy, &mut ctx).unwrap();
            assert!(!q.tables.is_empty() && q.tables.len() <= policy.max_tables);
            for name in &q.tables {
                assert!(["t0", "t1", "t2"].contains(&name.as_str()), "{name}");
            }
            let refs: Vec<_> = q.select.from.table_refs().map(|t| t.name.clone()).collect();
            assert_eq!(refs, q.tables);
        }
    }

    #[test]
    fn test_scopes_are_slices_of_all_columns() {
        let schema = schema();
        let policy = Policy::default();
        let mut ctx = Context::new_with_seed(3);
        for _ in 0..100 {
            let q = assemble_select(&schema, &policy, &mut ctx).unwrap();
            let n = q.group_by_columns.len();
            let m = q.aggregate_columns.len();
            assert!(n + m <= q.all_columns.len());
            assert_eq!(q.group_by_columns[..], q.all_columns[..n]);
            assert_eq!(q.aggregate_columns[..], q.all_columns[n..n + m]);
            assert_eq!(q.select.fetch.len(), q.all_columns.len());
            assert!(q.select.where_clause.is_some());
        }
    }

    #[test]
    fn test_join_conditions_follow_kind() {
        let schema = schema();
        let policy = Policy::default()
            .with_implicit_from_probability(0.0)
            .with_join_rule_violation_probability(0.0)
            .with_max_tables(3);
        let mut ctx = Context::new_with_seed(4);
        let mut saw_join = false;
        for _ in 0..100 {
            let q = assemble_select(&schema, &policy, &mut ctx).unwrap();
            assert_eq!(q.select.from.tables.len(), 1);
            for join in &q.select.from.joins {
                saw_join = true;
                assert_eq!(join.on.is_some(), join.kind.takes_condition());
            }
        }
        assert!(saw_join);
    }

    #[test]
    fn test_implicit_from_has_no_aliases() {
        let schema = schema();
        let policy = Policy::default()
            .with_implicit_from_probability(1.0)
            .with_table_alias_probability(1.0);
        let mut ctx = Context::new_with_seed(5);
        for _ in 0..20 {
            let q = assemble_select(&schema, &policy, &mut ctx).unwrap();
            assert!(!q.has_joins());
            assert!(q.tables.iter().all(|t| q.bindings.table_alias(t).is_none()));
        }
    }

    #[test]
    fn test_positional_aliases() {
        let schema = schema();
        let policy = Policy::default()
            .with_implicit_from_probability(0.0)
            .with_table_alias_probability(1.0);
        let mut ctx = Context::new_with_seed(6);
        let q = assemble_select(&schema, &policy, &mut ctx).unwrap();
        for (i, table) in q.tables.iter().enumerate() {
            assert_eq!(q.bindings.table_alias(table), Some(format!("tt{i}").as_str()));
        }
    }

    #[test]
    fn test_joined_tables_print_positional_aliases() {
        let schema = schema();
        let policy = Policy::default().with_implicit_from_probability(0.0);
        let mut ctx = Context::new_with_seed(9);
        for _ in 0..50 {
            let q = assemble_select(&schema, &policy, &mut ctx).unwrap();
            for (i, table) in q.select.from.table_refs().enumerate() {
                let printed = crate::printer::sql(table, &q.bindings).to_string();
                assert!(printed.ends_with(&format!(" AS tt{i}")), "{printed}");
            }
        }
    }

    #[test]
    fn test_set_aggregates() {
        let schema = schema();
        let policy = Policy::default();
        let mut ctx = Context::new_with_seed(7);
        for _ in 0..50 {
            let mut q = assemble_select(&schema, &policy, &mut ctx).unwrap();
            q.set_aggregates(&mut ctx).unwrap();
            let extra = q.select.group_by.len() - q.group_by_columns.len();
            assert!(extra <= policy.max_list_size);
            assert!(!q.select.group_by.is_empty());
            assert!(!q.select.fetch.is_empty());
            assert!(q.select.group_by.iter().all(|e| !e.contains_aggregate()));
        }
    }

    #[test]
    fn test_grouped_fetch_is_determined_by_group() {
        let schema = schema();
        let policy = Policy::default().with_max_expr_depth(4);
        let mut ctx = Context::new_with_seed(8);
        for _ in 0..200 {
            let mut q = assemble_select(&schema, &policy, &mut ctx).unwrap();
            q.set_aggregates(&mut ctx).unwrap();

            let grouped: Vec<Expr> = q.group_by_columns.iter().map(Expr::column).collect();
            assert_eq!(q.select.group_by[..grouped.len()], grouped[..]);
            for expr in &q.select.fetch {
                if q.select.group_by.contains(expr) {
                    continue;
                }
                assert!(expr.contains_aggregate(), "{expr:?}");
                assert!(!expr.has_bare_column(), "{expr:?}");
            }
        }
    }
}
