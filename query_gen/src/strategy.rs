//! proptest Strategy implementation.

use std::fmt;

use proptest::prelude::*;
use proptest::strategy::{NewTree, ValueTree};
use proptest::test_runner::TestRunner;

use crate::QueryGen;
use crate::ast::Expr;
use crate::context::Context;
use crate::printer;
use crate::schema::DataType;

/// A generated expression with the SQL it renders to.
#[derive(Clone, Debug)]
pub struct GeneratedExpr {
    pub sql: String,
    pub expr: Expr,
    /// Seed the expression was generated from.
    pub seed: u64,
    pub data_type: DataType,
}

/// proptest Strategy for expressions of one type over a random query scope.
pub struct ExprStrategy {
    generator: QueryGen,
    data_type: DataType,
}

impl fmt::Debug for ExprStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprStrategy")
            .field("schema_tables", &self.generator.schema().tables.len())
            .field("data_type", &self.data_type)
            .finish()
    }
}

impl ExprStrategy {
    pub fn new(generator: QueryGen, data_type: DataType) -> Self {
        Self {
            generator,
            data_type,
        }
    }
}

impl Strategy for ExprStrategy {
    type Tree = ExprValueTree;
    type Value = GeneratedExpr;

    fn new_tree(&self, runner: &mut TestRunner) -> NewTree<Self> {
        let seed: u64 = runner.rng().random();
        let mut ctx = Context::new_with_seed(seed);

        let query = self
            .generator
            .select(&mut ctx)
            .map_err(|e| e.to_string())?;
        let expr = query
            .gen_all()
            .generate(&mut ctx, self.data_type, 0)
            .map_err(|e| e.to_string())?;
        let sql = printer::sql(&expr, &query.bindings).to_string();

        Ok(ExprValueTree {
            current: GeneratedExpr {
                sql,
                expr,
                seed,
                data_type: self.data_type,
            },
        })
    }
}

/// Value tree for generated expressions. Shrinking is not supported; a
/// failing case is reproduced from its seed instead.
pub struct ExprValueTree {
    current: GeneratedExpr,
}

impl ValueTree for ExprValueTree {
    type Value = GeneratedExpr;

    fn current(&self) -> Self::Value {
        self.current.clone()
    }

    fn simplify(&mut self) -> bool {
        false
    }

    fn complicate(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::expr::ExprGenerator;
    use crate::policy::Policy;
    use crate::schema::{Column, SchemaBuilder, Table};

    fn test_generator(policy: Policy) -> QueryGen {
        let schema = SchemaBuilder::new()
            .table(Table::new(
                "t0",
                vec![
                    Column::new("v0", DataType::BigInt),
                    Column::new("v1", DataType::Boolean),
                ],
            ))
            .table(Table::new("t1", vec![Column::new("v0", DataType::String)]))
            .build();
        QueryGen::new(schema, policy)
    }

    #[test]
    fn test_strategy_generates_predicates() {
        let strategy = ExprStrategy::new(test_generator(Policy::default()), DataType::Boolean);
        proptest!(|(generated in strategy)| {
            prop_assert!(!generated.sql.is_empty());
            prop_assert_eq!(generated.data_type, DataType::Boolean);
        });
    }

    #[test]
    fn test_strategy_deterministic_with_seed() {
        let strategy = ExprStrategy::new(test_generator(Policy::default()), DataType::String);
        let mut runner = TestRunner::default();
        let generated = strategy.new_tree(&mut runner).unwrap().current();

        let mut ctx = Context::new_with_seed(generated.seed);
        let query = strategy.generator.select(&mut ctx).unwrap();
        let expr = query.gen_all().generate(&mut ctx, DataType::String, 0).unwrap();
        assert_eq!(expr, generated.expr);
    }

    proptest! {
        #[test]
        fn generation_terminates(
            seed in any::<u64>(),
            max_depth in 0usize..=10,
            type_index in 0usize..DataType::ALL.len(),
        ) {
            let columns = vec![
                Column::new("v0", DataType::BigInt),
                Column::new("v1", DataType::Double),
                Column::new("v2", DataType::String),
            ];
            let policy = Policy::default().with_max_expr_depth(max_depth);
            let generator = ExprGenerator::new(&policy, &columns)
                .with_aggregates(true)
                .with_windows(true)
                .with_fuzz_arity(true);
            let mut ctx = Context::new_with_seed(seed);
            let expr = generator.generate(&mut ctx, DataType::ALL[type_index], 0);
            prop_assert!(expr.is_ok());
        }
    }
}
