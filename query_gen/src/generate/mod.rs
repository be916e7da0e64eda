//! SQL generation modules.
//!
//! # Design Principles
//!
//! **Every probability comes from the policy.**
//!
//! Generator functions receive their configuration through an
//! [`ExprGenerator`](expr::ExprGenerator) or an explicit `&Policy`, and every
//! random decision goes through the caller's [`Context`](crate::Context).
//! This keeps a check replayable from its seed and lets tests pin a decision
//! by setting a probability to 0 or 1.
//!
//! When adding new generator functions:
//! 1. Add any new configurable parameters to `Policy` in `policy.rs`
//! 2. Draw randomness only from the `Context` passed in
//! 3. Never use hardcoded values for probabilities

pub mod expr;
pub mod literal;
pub mod select;
pub mod window;
