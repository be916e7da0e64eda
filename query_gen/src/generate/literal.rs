//! Literal value generation.

use crate::ast::Literal;
use crate::context::Context;
use crate::policy::Policy;
use crate::schema::DataType;

/// Largest magnitude of a "small" integer literal.
const SMALL_INT: i64 = 5;

/// Maximum length of a generated string literal.
const MAX_STRING_LEN: usize = 8;

/// Generate a literal value for the given data type.
pub fn generate_literal(ctx: &mut Context, data_type: DataType, policy: &Policy) -> Literal {
    if ctx.gen_bool_with_prob(policy.null_probability) {
        return Literal::Null;
    }

    match data_type {
        DataType::BigInt => generate_bigint(ctx),
        DataType::Double => generate_double(ctx),
        DataType::String => generate_string(ctx),
        DataType::Boolean => Literal::Boolean(ctx.gen_bool()),
        DataType::Null => Literal::Null,
    }
}

/// Generate an integer literal: half the time anywhere in range, otherwise
/// small values near zero where edge cases cluster.
pub fn generate_bigint(ctx: &mut Context) -> Literal {
    let value = if ctx.gen_bool() {
        ctx.gen_u64() as i64
    } else {
        ctx.gen_i64_range(-SMALL_INT, SMALL_INT)
    };
    Literal::BigInt(value)
}

/// Generate a double literal.
///
/// Half of the values are in [0, 1). The rest are split between values
/// spread over the whole finite range and the special values NaN, ±Inf
/// and ±0.
pub fn generate_double(ctx: &mut Context) -> Literal {
    let value = if ctx.gen_bool() {
        if ctx.gen_bool() {
            (ctx.gen_unit_f64() - 0.5) * 2.0 * f64::MAX
        } else {
            let specials = [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0, 0.0];
            specials[ctx.gen_range(specials.len())]
        }
    } else {
        ctx.gen_unit_f64()
    };
    Literal::Double(value)
}

/// Generate a string literal.
pub fn generate_string(ctx: &mut Context) -> Literal {
    let len = ctx.gen_range_inclusive(0, MAX_STRING_LEN);
    Literal::String(ctx.gen_string(len))
}
