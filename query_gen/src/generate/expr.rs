//! Type-directed expression generation.
//!
//! [`ExprGenerator::generate`] builds a tree whose root evaluates to the
//! requested [`DataType`]. Operators are drawn from the catalog by return
//! type and their argument types are derived from the signature's rules, so
//! every inner node receives arguments it accepts (up to the deliberate
//! type confusion at leaves controlled by the policy).

use crate::ast::{Expr, NullsOrder, OrderDirection, OrderingTerm};
use crate::catalog::{self, ArgRule, Arity, OperatorSignature};
use crate::context::Context;
use crate::error::GenError;
use crate::generate::literal::generate_literal;
use crate::generate::window;
use crate::policy::Policy;
use crate::schema::{Column, DataType};

/// Expression generator over a fixed column scope.
///
/// Cheap to copy; feature flags are switched per sub-tree by copying with a
/// builder method rather than mutating shared state.
#[derive(Debug, Clone, Copy)]
pub struct ExprGenerator<'a> {
    policy: &'a Policy,
    columns: &'a [Column],
    aggregates: bool,
    windows: bool,
    fuzz_arity: bool,
    /// Columns visible inside aggregate arguments, when they differ from
    /// `columns`.
    aggregate_arguments: Option<&'a [Column]>,
}

impl<'a> ExprGenerator<'a> {
    pub fn new(policy: &'a Policy, columns: &'a [Column]) -> Self {
        Self {
            policy,
            columns,
            aggregates: false,
            windows: false,
            fuzz_arity: false,
            aggregate_arguments: None,
        }
    }

    /// Allow aggregate calls in generated trees.
    pub fn with_aggregates(mut self, enabled: bool) -> Self {
        self.aggregates = enabled;
        self
    }

    /// Allow window-function calls in generated trees.
    pub fn with_windows(mut self, enabled: bool) -> Self {
        self.windows = enabled;
        self
    }

    /// Allow calls with random argument lists.
    pub fn with_fuzz_arity(mut self, enabled: bool) -> Self {
        self.fuzz_arity = enabled;
        self
    }

    pub fn with_columns(mut self, columns: &'a [Column]) -> Self {
        self.columns = columns;
        self
    }

    pub fn policy(&self) -> &'a Policy {
        self.policy
    }

    pub fn columns(&self) -> &'a [Column] {
        self.columns
    }

    pub fn aggregates_enabled(&self) -> bool {
        self.aggregates
    }

    /// Generate an expression of `data_type` at `depth`.
    pub fn generate(
        &self,
        ctx: &mut Context,
        data_type: DataType,
        depth: usize,
    ) -> Result<Expr, GenError> {
        if depth >= self.policy.max_expr_depth || ctx.gen_bool_with_prob(self.policy.leaf_probability)
        {
            return Ok(self.leaf(ctx, data_type));
        }

        let candidates = self.candidates(ctx, data_type);
        let Some(sig) = ctx.choose(&candidates).copied() else {
            if data_type == DataType::Null {
                return Ok(self.leaf(ctx, data_type));
            }
            return Err(GenError::invariant(format!(
                "no operator in the catalog returns {data_type}"
            ))
            .in_scope("expression"));
        };

        let args = self.generate_args(ctx, sig, data_type, depth)?;
        if sig.is_window() {
            return window::over(self, ctx, Expr::call(sig, args));
        }
        Ok(Expr::apply(sig, args))
    }

    /// Generate an expression of a random non-NULL type at depth 0.
    pub fn generate_any(&self, ctx: &mut Context) -> Result<Expr, GenError> {
        let data_type = DataType::random_without_null(ctx);
        self.generate(ctx, data_type, 0)
    }

    /// Generate a BOOLEAN expression at depth 0.
    pub fn predicate(&self, ctx: &mut Context) -> Result<Expr, GenError> {
        self.generate(ctx, DataType::Boolean, 0)
    }

    /// Generate an expression for the SELECT list or HAVING clause of a
    /// grouped query.
    ///
    /// The result contains at least one aggregate call, and this
    /// generator's columns appear only inside aggregate arguments, so the
    /// value never depends on which row of a group the engine picks.
    /// `data_type` should be numeric or BOOLEAN; any other type gets a
    /// numeric aggregate.
    pub fn aggregate_expression(
        &self,
        ctx: &mut Context,
        data_type: DataType,
    ) -> Result<Expr, GenError> {
        let outer = ExprGenerator {
            columns: &[],
            aggregates: true,
            windows: false,
            aggregate_arguments: Some(self.columns),
            ..*self
        };
        let expr = outer.generate(ctx, data_type, 0)?;
        if expr.contains_aggregate() {
            return Ok(expr);
        }

        let numeric = if data_type.is_numeric() {
            data_type
        } else {
            *ctx.choose(DataType::NUMERIC).unwrap_or(&DataType::BigInt)
        };
        let aggregates: Vec<_> = catalog::aggregates()
            .filter(|sig| sig.can_return(numeric))
            .collect();
        let Some(sig) = ctx.choose(&aggregates).copied() else {
            return Err(GenError::invariant(format!("no aggregate returns {numeric}"))
                .in_scope("aggregate"));
        };
        let call = Expr::apply(sig, outer.generate_args(ctx, sig, numeric, 0)?);
        if data_type == DataType::Boolean {
            let bound = outer.constant(ctx, numeric);
            return Ok(Expr::binary(&catalog::GREATER, call, bound));
        }
        Ok(call)
    }

    /// Catalog candidates for `data_type` under this generator's flags.
    fn candidates(
        &self,
        ctx: &mut Context,
        data_type: DataType,
    ) -> Vec<&'static OperatorSignature> {
        let drop_functions = ctx.gen_bool_with_prob(self.policy.drop_function_probability);
        let mut candidates = catalog::candidates(data_type, drop_functions);

        candidates.retain(|sig| self.windows || !sig.is_window());
        if !self.aggregates {
            candidates.retain(|sig| !sig.is_aggregate());
        } else if data_type.is_numeric()
            && ctx.gen_bool_with_prob(self.policy.aggregate_only_probability)
        {
            candidates.retain(|sig| sig.is_aggregate());
        }
        candidates
    }

    /// Generate the arguments of a call to `sig` returning `data_type`.
    pub(crate) fn generate_args(
        &self,
        ctx: &mut Context,
        sig: &'static OperatorSignature,
        data_type: DataType,
        depth: usize,
    ) -> Result<Vec<Expr>, GenError> {
        let mut inner = if sig.is_aggregate() || sig.is_window() {
            self.with_aggregates(false).with_windows(false)
        } else {
            *self
        };
        if sig.is_aggregate() {
            if let Some(columns) = self.aggregate_arguments {
                inner.columns = columns;
                inner.aggregate_arguments = None;
            }
        }

        let calls_function = !matches!(
            sig.category,
            catalog::OpCategory::UnaryPrefix
                | catalog::OpCategory::UnaryPostfix
                | catalog::OpCategory::Binary
        );
        if self.fuzz_arity
            && calls_function
            && ctx.gen_bool_with_prob(self.policy.fuzz_arity_probability)
        {
            let n = ctx.gen_range_inclusive(0, self.policy.max_variadic_args);
            return (0..n)
                .map(|_| {
                    let ty = DataType::random_without_null(ctx);
                    inner.generate(ctx, ty, depth + 1)
                })
                .collect();
        }

        let n = match sig.arity {
            Arity::Fixed(n) => n,
            Arity::Variadic => ctx.gen_range_inclusive(0, self.policy.max_variadic_args),
        };
        let arg_types = resolve_arg_types(ctx, sig, data_type, n)?;
        arg_types
            .into_iter()
            .map(|ty| inner.generate(ctx, ty, depth + 1))
            .collect()
    }

    /// Emit a leaf: a NULL, a column of the type, or a constant.
    pub fn leaf(&self, ctx: &mut Context, data_type: DataType) -> Expr {
        let data_type = if ctx.gen_bool_with_prob(self.policy.wrong_type_probability) {
            DataType::random_without_null(ctx)
        } else {
            data_type
        };

        if ctx.gen_bool_with_prob(self.policy.null_probability) {
            return Expr::null();
        }
        if ctx.gen_bool() {
            if let Some(column) = self.column_of_type(ctx, data_type) {
                return column;
            }
        }
        self.constant(ctx, data_type)
    }

    /// A random in-scope column of `data_type`, if there is one.
    pub fn column_of_type(&self, ctx: &mut Context, data_type: DataType) -> Option<Expr> {
        let matching: Vec<&Column> = self
            .columns
            .iter()
            .filter(|c| c.data_type == data_type)
            .collect();
        ctx.choose(&matching).map(|c| Expr::column(c))
    }

    pub fn constant(&self, ctx: &mut Context, data_type: DataType) -> Expr {
        Expr::constant(generate_literal(ctx, data_type, self.policy))
    }

    /// `n` references to random in-scope columns; duplicates are allowed.
    ///
    /// Without columns in scope, constants of random types are returned.
    pub fn generate_columns(&self, ctx: &mut Context, n: usize) -> Vec<Expr> {
        (0..n)
            .map(|_| match ctx.choose(self.columns) {
                Some(column) => Expr::column(column),
                None => {
                    let ty = DataType::random_without_null(ctx);
                    self.constant(ctx, ty)
                }
            })
            .collect()
    }

    /// 1 to `max_list_size` ORDER BY expressions, some wrapped in ordering
    /// terms.
    pub fn generate_order_bys(&self, ctx: &mut Context) -> Result<Vec<Expr>, GenError> {
        let n = ctx.gen_range_inclusive(1, self.policy.max_list_size);
        (0..n)
            .map(|_| {
                let expr = self.generate_any(ctx)?;
                if !ctx.gen_bool_with_prob(self.policy.ordering_term_probability) {
                    return Ok(expr);
                }
                let direction = if ctx.gen_bool() {
                    OrderDirection::Asc
                } else {
                    OrderDirection::Desc
                };
                let nulls = if ctx.gen_bool() {
                    Some(if ctx.gen_bool() {
                        NullsOrder::First
                    } else {
                        NullsOrder::Last
                    })
                } else {
                    None
                };
                Ok(Expr::OrderingTerm(Box::new(OrderingTerm {
                    expr,
                    direction,
                    nulls,
                })))
            })
            .collect()
    }

    /// 1 to `max_list_size` expressions of random types.
    pub fn generate_expressions(&self, ctx: &mut Context) -> Result<Vec<Expr>, GenError> {
        let n = ctx.gen_range_inclusive(1, self.policy.max_list_size);
        (0..n).map(|_| self.generate_any(ctx)).collect()
    }
}

/// Resolve the type of each of `n` arguments of `sig`.
///
/// A missing rule, an empty `Fixed` list or `SameAsFirst` at position 0 means
/// the catalog entry is malformed and is reported as an invariant violation.
pub fn resolve_arg_types(
    ctx: &mut Context,
    sig: &OperatorSignature,
    return_type: DataType,
    n: usize,
) -> Result<Vec<DataType>, GenError> {
    let mut types = Vec::with_capacity(n);
    for pos in 0..n {
        let rule = sig.arg_rule(pos).ok_or_else(|| {
            GenError::invariant(format!("{} has no argument rule at {pos}", sig.name))
        })?;
        let ty = match rule {
            ArgRule::Fixed(candidates) => *ctx.choose(candidates).ok_or_else(|| {
                GenError::invariant(format!("{} has an empty type list at {pos}", sig.name))
            })?,
            ArgRule::SameAsFirst => *types.first().ok_or_else(|| {
                GenError::invariant(format!("{} uses SameAsFirst at position 0", sig.name))
            })?,
            ArgRule::SameAsReturn => return_type,
        };
        types.push(ty);
    }
    Ok(types)
}

/// `NOT p`
pub fn negate(predicate: Expr) -> Expr {
    Expr::not(predicate)
}

/// `p IS NULL`
pub fn is_null(predicate: Expr) -> Expr {
    Expr::is_null(predicate)
}

/// The ternary partition of a predicate: `P`, `NOT P`, `P IS NULL`.
///
/// For every row exactly one of the three evaluates to TRUE.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateTriple {
    pub predicate: Expr,
    pub negated: Expr,
    pub is_null: Expr,
}

impl PredicateTriple {
    pub fn new(predicate: Expr) -> Self {
        Self {
            negated: negate(predicate.clone()),
            is_null: is_null(predicate.clone()),
            predicate,
        }
    }

    pub fn parts(&self) -> [&Expr; 3] {
        [&self.predicate, &self.negated, &self.is_null]
    }

    pub fn into_parts(self) -> [Expr; 3] {
        [self.predicate, self.negated, self.is_null]
    }
}

/// A HAVING predicate: either over the group-by columns, or over aggregates
/// of the aggregate columns.
///
/// The group-by columns must all be grouping terms of the query for the
/// first form to be well defined.
pub fn having_clause(
    ctx: &mut Context,
    group_by: ExprGenerator<'_>,
    aggregate: ExprGenerator<'_>,
) -> Result<Expr, GenError> {
    if ctx.gen_bool() {
        group_by.predicate(ctx)
    } else {
        aggregate.aggregate_expression(ctx, DataType::Boolean)
    }
}
