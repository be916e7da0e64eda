//! Window expression generation.
//!
//! `function(args) OVER ([PARTITION BY ...] [ORDER BY ...] [frame])`, where
//! the function is a window function or an aggregate used as one.

use strum::IntoEnumIterator;

use crate::ast::{Expr, FrameBound, FrameUnit, WindowExpr, WindowFrame};
use crate::catalog::{self, OperatorSignature};
use crate::context::Context;
use crate::error::GenError;
use crate::generate::expr::ExprGenerator;
use crate::schema::DataType;

/// Largest frame offset in the common case.
const SMALL_OFFSET: i64 = 5;

/// Range for offsets in unusual frames.
const CHAOS_OFFSET: (i64, i64) = (-5, 100);

/// Generate a window expression evaluating to `data_type`.
pub fn generate_window(
    generator: &ExprGenerator<'_>,
    ctx: &mut Context,
    data_type: DataType,
) -> Result<Expr, GenError> {
    let candidates: Vec<&'static OperatorSignature> = catalog::window_functions()
        .chain(catalog::aggregates())
        .filter(|sig| sig.can_return(data_type))
        .collect();
    let sig = *ctx.choose(&candidates).ok_or_else(|| {
        GenError::exhausted("window", format!("no window function returns {data_type}"))
    })?;

    let args = generator.generate_args(ctx, sig, data_type, 0)?;
    over(generator, ctx, Expr::call(sig, args))
}

/// Attach a random OVER clause to `call`.
pub(crate) fn over(
    generator: &ExprGenerator<'_>,
    ctx: &mut Context,
    call: Expr,
) -> Result<Expr, GenError> {
    let plain = generator.with_aggregates(false).with_windows(false);
    let policy = generator.policy();

    let n_partitions = ctx.gen_range_inclusive(0, 2);
    let mut partition_by = Vec::with_capacity(n_partitions);
    for _ in 0..n_partitions {
        let expr = if !plain.columns().is_empty()
            && ctx.gen_bool_with_prob(policy.partition_column_probability)
        {
            plain.generate_columns(ctx, 1).remove(0)
        } else {
            plain.generate_any(ctx)?
        };
        partition_by.push(expr);
    }

    let order_by = plain.generate_order_bys(ctx)?;
    let frame = if ctx.gen_bool_with_prob(policy.window_frame_probability) {
        Some(random_frame(generator, ctx))
    } else {
        None
    };

    Ok(Expr::Window(Box::new(WindowExpr {
        call,
        partition_by,
        order_by,
        frame,
    })))
}

/// A random frame: `unit start` or `unit BETWEEN start AND end`.
pub fn random_frame(generator: &ExprGenerator<'_>, ctx: &mut Context) -> WindowFrame {
    let units: Vec<FrameUnit> = FrameUnit::iter().collect();
    let unit = ctx.choose(&units).copied().unwrap_or(FrameUnit::Rows);
    let start = frame_bound(generator, ctx, true);
    let end = if ctx.gen_bool() {
        None
    } else {
        Some(frame_bound(generator, ctx, false))
    };
    WindowFrame { unit, start, end }
}

fn frame_bound(generator: &ExprGenerator<'_>, ctx: &mut Context, is_start: bool) -> FrameBound {
    let chaos = generator.policy().frame_chaos_probability;
    let offset = if ctx.gen_bool_with_prob(chaos) {
        ctx.gen_i64_range(CHAOS_OFFSET.0, CHAOS_OFFSET.1)
    } else {
        ctx.gen_i64_range(0, SMALL_OFFSET)
    };

    let mut options = vec![
        FrameBound::UnboundedPreceding,
        FrameBound::Preceding(offset),
        FrameBound::CurrentRow,
        FrameBound::Following(offset),
        FrameBound::UnboundedFollowing,
    ];
    if !is_start && !ctx.gen_bool_with_prob(chaos) {
        options.retain(|b| *b != FrameBound::UnboundedPreceding);
    }
    ctx.choose(&options)
        .copied()
        .unwrap_or(FrameBound::CurrentRow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use crate::schema::{Column, Table};

    fn columns() -> Vec<Column> {
        Table::new(
            "t0",
            vec![
                Column::new("v0", DataType::BigInt),
                Column::new("v1", DataType::String),
            ],
        )
        .columns
    }

    #[test]
    fn test_generate_window_shape() {
        let cols = columns();
        let policy = Policy::default();
        let generator = ExprGenerator::new(&policy, &cols);
        let mut ctx = Context::new_with_seed(3);
        for ty in DataType::NON_NULL {
            for _ in 0..30 {
                let expr = generate_window(&generator, &mut ctx, *ty).unwrap();
                let Expr::Window(w) = expr else {
                    panic!("expected window expression");
                };
                let func = w.call.operator().unwrap();
                assert!(func.is_window() || func.is_aggregate());
                assert!(func.can_return(*ty));
                assert!(w.partition_by.len() <= 2);
                assert!(!w.order_by.is_empty());
            }
        }
    }

    #[test]
    fn test_window_arguments_are_plain() {
        let cols = columns();
        let policy = Policy::default().with_leaf_probability(0.1);
        let generator = ExprGenerator::new(&policy, &cols).with_aggregates(true);
        let mut ctx = Context::new_with_seed(5);
        for _ in 0..100 {
            let Expr::Window(w) = generate_window(&generator, &mut ctx, DataType::BigInt).unwrap()
            else {
                panic!("expected window expression");
            };
            let Expr::Call { args, .. } = &w.call else {
                panic!("expected call");
            };
            assert!(args.iter().all(|a| !a.contains_aggregate()));
            assert!(w.partition_by.iter().all(|e| !e.contains_aggregate()));
        }
    }

    #[test]
    fn test_frame_end_rarely_unbounded_preceding() {
        let cols = columns();
        let policy = Policy {
            frame_chaos_probability: 0.0,
            ..Policy::default()
        };
        let generator = ExprGenerator::new(&policy, &cols);
        let mut ctx = Context::new_with_seed(7);
        for _ in 0..200 {
            let frame = random_frame(&generator, &mut ctx);
            assert_ne!(frame.end, Some(FrameBound::UnboundedPreceding));
            for bound in [Some(frame.start), frame.end].into_iter().flatten() {
                if let FrameBound::Preceding(n) | FrameBound::Following(n) = bound {
                    assert!((0..=SMALL_OFFSET).contains(&n));
                }
            }
        }
    }
}
