//! Per-check name bindings consulted by the printer.
//!
//! Trees refer to tables and columns by their logical names. Which physical
//! member of an equivalence group is printed, and under which alias, is
//! decided here. A `Bindings` value belongs to exactly one oracle check.

use std::collections::HashMap;

use crate::context::Context;
use crate::error::GenError;
use crate::schema::Schema;

/// Name bindings for one check.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    /// Logical table -> selected equivalence member.
    members: HashMap<String, String>,
    /// Logical table -> display alias.
    table_aliases: HashMap<String, String>,
    /// (logical table, column) -> column alias.
    column_aliases: HashMap<(String, String), String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical name printed for `table`. Defaults to the logical name.
    pub fn member<'a>(&'a self, table: &'a str) -> &'a str {
        self.members.get(table).map(String::as_str).unwrap_or(table)
    }

    pub fn set_member(&mut self, table: impl Into<String>, member: impl Into<String>) {
        self.members.insert(table.into(), member.into());
    }

    pub fn table_alias(&self, table: &str) -> Option<&str> {
        self.table_aliases.get(table).map(String::as_str)
    }

    pub fn set_table_alias(&mut self, table: impl Into<String>, alias: impl Into<String>) {
        self.table_aliases.insert(table.into(), alias.into());
    }

    /// Name used to qualify columns of `table`: its alias, else its member.
    pub fn qualifier<'a>(&'a self, table: &'a str) -> &'a str {
        self.table_alias(table).unwrap_or_else(|| self.member(table))
    }

    pub fn column_alias(&self, table: &str, column: &str) -> Option<&str> {
        self.column_aliases
            .get(&(table.to_string(), column.to_string()))
            .map(String::as_str)
    }

    pub fn set_column_alias(
        &mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        alias: impl Into<String>,
    ) {
        self.column_aliases
            .insert((table.into(), column.into()), alias.into());
    }

    /// Re-pick the equivalence member of every table in `tables`.
    ///
    /// Aliases are untouched, so a rendered query keeps its shape and only
    /// the physical sources change.
    pub fn mutate_members<S: AsRef<str>>(
        &mut self,
        schema: &Schema,
        tables: &[S],
        ctx: &mut Context,
    ) -> Result<(), GenError> {
        for table in tables {
            schema.pick_alternate_member(table.as_ref(), ctx, self)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, DataType, SchemaBuilder, Table};

    #[test]
    fn test_defaults_to_logical_name() {
        let bindings = Bindings::new();
        assert_eq!(bindings.member("t0"), "t0");
        assert_eq!(bindings.qualifier("t0"), "t0");
        assert!(bindings.table_alias("t0").is_none());
        assert!(bindings.column_alias("t0", "v0").is_none());
    }

    #[test]
    fn test_alias_wins_over_member() {
        let mut bindings = Bindings::new();
        bindings.set_member("t0", "t0_view");
        assert_eq!(bindings.qualifier("t0"), "t0_view");
        bindings.set_table_alias("t0", "tt0");
        assert_eq!(bindings.qualifier("t0"), "tt0");
        assert_eq!(bindings.member("t0"), "t0_view");
    }

    #[test]
    fn test_mutate_members_keeps_aliases() {
        let cols = || vec![Column::new("v0", DataType::BigInt)];
        let schema = SchemaBuilder::new()
            .table(Table::new("t0", cols()))
            .table(Table::new("t0_indexed", cols()))
            .table(Table::new("t1", cols()))
            .build();
        let mut ctx = Context::new_with_seed(11);
        let mut bindings = Bindings::new();
        bindings.set_table_alias("t0", "tt0");
        bindings.set_column_alias("t1", "v0", "cc0");

        let mut seen_indexed = false;
        for _ in 0..50 {
            bindings
                .mutate_members(&schema, &["t0", "t1"], &mut ctx)
                .unwrap();
            seen_indexed |= bindings.member("t0") == "t0_indexed";
            assert_eq!(bindings.member("t1"), "t1");
            assert_eq!(bindings.table_alias("t0"), Some("tt0"));
            assert_eq!(bindings.column_alias("t1", "v0"), Some("cc0"));
        }
        assert!(seen_indexed);
    }
}
