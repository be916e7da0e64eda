//! Type-directed SQL query generation for metamorphic testing.
//!
//! This crate provides a schema-constrained query generator with:
//! - **A static operator catalog** whose signatures drive generation by type
//! - **Equivalence groups** of tables that hold the same logical data
//! - **Per-check bindings** that choose physical tables and aliases at
//!   print time, so one tree renders against many encodings
//! - **Runtime policy** controlling every probability and limit
//! - **proptest integration** via `Strategy`
//!
//! # Example
//!
//! ```
//! use query_gen::{
//!     Column, Context, DataType, Policy, PredicateTriple, QueryGen, SchemaBuilder, Table,
//!     printer,
//! };
//!
//! let cols = || vec![Column::new("v0", DataType::BigInt), Column::new("v1", DataType::String)];
//! let schema = SchemaBuilder::new()
//!     .table(Table::new("t0", cols()))
//!     .table(Table::new("t0_view", cols()).view())
//!     .build();
//!
//! let generator = QueryGen::new(schema, Policy::default());
//! let mut ctx = Context::new_with_seed(42);
//! let mut query = generator.select(&mut ctx).unwrap();
//!
//! let triple = PredicateTriple::new(query.gen_all().predicate(&mut ctx).unwrap());
//! query.select.where_clause = Some(triple.negated);
//! query
//!     .bindings
//!     .mutate_members(generator.schema(), &query.tables, &mut ctx)
//!     .unwrap();
//! let sql = printer::sql(&query.select, &query.bindings).to_string();
//! assert!(sql.starts_with("SELECT"));
//! ```

pub mod ast;
pub mod bindings;
pub mod builder;
pub mod catalog;
pub mod context;
pub mod error;
pub mod generate;
pub mod policy;
pub mod printer;
pub mod schema;
pub mod strategy;

// Re-export main types
pub use ast::{
    ColumnRef, Expr, ExprKind, FrameBound, FrameUnit, FromClause, Join, JoinKind, Literal,
    NullsOrder, OrderDirection, OrderingTerm, Select, TableRef, WindowExpr, WindowFrame,
};
pub use bindings::Bindings;
pub use builder::QueryGenBuilder;
pub use catalog::{ArgRule, Arity, CATALOG, OpCategory, OperatorSignature};
pub use context::Context;
pub use error::{GenError, GenErrorKind};
pub use generate::expr::{ExprGenerator, PredicateTriple, having_clause};
pub use generate::select::{AssembledQuery, assemble_select};
pub use generate::window::generate_window;
pub use policy::Policy;
pub use schema::{Column, DataType, Schema, SchemaBuilder, Table};
pub use strategy::{ExprStrategy, GeneratedExpr};

/// Query generator over a fixed schema and policy.
#[derive(Debug, Clone)]
pub struct QueryGen {
    schema: Schema,
    policy: Policy,
}

impl QueryGen {
    /// Create a new QueryGen with the given schema and policy.
    pub fn new(schema: Schema, policy: Policy) -> Self {
        Self { schema, policy }
    }

    /// Create a builder for constructing a QueryGen.
    pub fn builder() -> QueryGenBuilder {
        QueryGenBuilder::new()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Assemble a random SELECT over the schema's logical tables.
    pub fn select(&self, ctx: &mut Context) -> Result<AssembledQuery, GenError> {
        assemble_select(&self.schema, &self.policy, ctx)
    }

    /// Convert this generator into a proptest strategy for expressions of
    /// `data_type`.
    pub fn strategy(self, data_type: DataType) -> ExprStrategy {
        ExprStrategy::new(self, data_type)
    }
}
