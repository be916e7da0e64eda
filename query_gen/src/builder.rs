//! Builder API for QueryGen.

use crate::QueryGen;
use crate::error::GenError;
use crate::policy::Policy;
use crate::schema::Schema;

/// Builder for constructing a QueryGen.
#[derive(Debug, Default)]
pub struct QueryGenBuilder {
    schema: Option<Schema>,
    policy: Policy,
}

impl QueryGenBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set the policy.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the generator, validating the policy.
    pub fn build(self) -> Result<QueryGen, GenError> {
        let schema = self
            .schema
            .ok_or_else(|| GenError::invalid_config("schema is required"))?;
        self.policy.validate()?;
        Ok(QueryGen::new(schema, self.policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, DataType, SchemaBuilder, Table};

    fn test_schema() -> Schema {
        SchemaBuilder::new()
            .table(Table::new("t0", vec![Column::new("v0", DataType::BigInt)]))
            .build()
    }

    #[test]
    fn test_builder_requires_schema() {
        assert!(QueryGenBuilder::new().build().is_err());
    }

    #[test]
    fn test_builder_validates_policy() {
        let result = QueryGenBuilder::new()
            .schema(test_schema())
            .policy(Policy::default().with_max_tables(0))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_creates_generator() {
        let generator = QueryGenBuilder::new()
            .schema(test_schema())
            .policy(Policy::default().with_max_expr_depth(2))
            .build()
            .unwrap();
        assert_eq!(generator.schema().tables.len(), 1);
        assert_eq!(generator.policy().max_expr_depth, 2);
    }
}
