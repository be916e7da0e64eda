//! Schema and equivalence-group model.
//!
//! Tables that hold the same logical data in different physical encodings
//! (a plain table, an indexed copy, a view) share a base name and form an
//! equivalence group. Queries are assembled over one representative per
//! group; oracles then swap in other members through [`Bindings`].

use std::collections::BTreeMap;
use std::fmt;

use strum::{EnumIter, IntoEnumIterator};

use crate::bindings::Bindings;
use crate::context::Context;
use crate::error::GenError;

/// SQL data types understood by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DataType {
    String,
    BigInt,
    Double,
    Boolean,
    Null,
}

impl DataType {
    /// Numeric types, in catalog order.
    pub const NUMERIC: &'static [DataType] = &[DataType::BigInt, DataType::Double];

    /// Every type that can be a generation target.
    pub const NON_NULL: &'static [DataType] = &[
        DataType::String,
        DataType::BigInt,
        DataType::Double,
        DataType::Boolean,
    ];

    /// Every type, including NULL.
    pub const ALL: &'static [DataType] = &[
        DataType::String,
        DataType::BigInt,
        DataType::Double,
        DataType::Boolean,
        DataType::Null,
    ];

    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::BigInt | DataType::Double)
    }

    /// Pick a random type other than NULL.
    pub fn random_without_null(ctx: &mut Context) -> DataType {
        let types: Vec<DataType> = DataType::iter().filter(|t| *t != DataType::Null).collect();
        *ctx.choose(&types).unwrap_or(&DataType::BigInt)
    }

    /// Map an engine type name to a data type.
    ///
    /// Accepts both SQL spellings (`BIGINT`, `DOUBLE PRECISION`, `VARCHAR`)
    /// and Arrow-style names (`Int64`, `Float64`, `Utf8View`).
    pub fn from_engine_type(type_name: &str) -> DataType {
        let upper = type_name.trim().to_uppercase();
        if upper.is_empty() || upper == "NULL" {
            DataType::Null
        } else if upper.starts_with("BOOL") {
            DataType::Boolean
        } else if upper.contains("INT") {
            DataType::BigInt
        } else if upper.contains("DOUB")
            || upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("NUMERIC")
            || upper.contains("DECIMAL")
        {
            DataType::Double
        } else {
            DataType::String
        }
    }

    /// Type name used in CREATE TABLE statements.
    pub fn ddl_name(self) -> &'static str {
        match self {
            DataType::String => "TEXT",
            DataType::BigInt => "BIGINT",
            DataType::Double => "DOUBLE",
            DataType::Boolean => "BOOLEAN",
            DataType::Null => "NULL",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => write!(f, "STRING"),
            DataType::BigInt => write!(f, "BIGINT"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Null => write!(f, "NULL"),
        }
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Column {
    pub name: String,
    /// Name of the owning table.
    pub table: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            table: String::new(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A table (or view) definition.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub is_view: bool,
}

impl Table {
    /// Create a table, binding every column to it.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let name = name.into();
        let columns = columns
            .into_iter()
            .map(|mut c| {
                c.table = name.clone();
                c
            })
            .collect();
        Self {
            name,
            columns,
            is_view: false,
        }
    }

    /// Mark the table as a view.
    pub fn view(mut self) -> Self {
        self.is_view = true;
        self
    }

    /// Logical name shared by every member of the table's equivalence group.
    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }

    pub fn columns_of_type(&self, data_type: DataType) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(move |c| c.data_type == data_type)
    }
}

/// Strip the physical-encoding suffix: `t1_indexed` -> `t1`.
pub fn base_name(name: &str) -> &str {
    name.split('_').next().unwrap_or(name)
}

/// Database schema with derived equivalence groups.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Schema {
    pub tables: Vec<Table>,
    /// Base name -> member table names, base table first.
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Schema {
    /// Build a schema, partitioning tables into equivalence groups.
    pub fn new(tables: Vec<Table>) -> Self {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for table in &tables {
            groups
                .entry(table.base_name().to_string())
                .or_default()
                .push(table.name.clone());
        }
        for (base, members) in groups.iter_mut() {
            members.sort_by(|a, b| (a != base, a).cmp(&(b != base, b)));
        }
        Self { tables, groups }
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// One representative table per equivalence group.
    ///
    /// The representative is the member whose name equals the base name when
    /// present, otherwise the first member.
    pub fn logical_tables(&self) -> Vec<&Table> {
        self.groups
            .values()
            .filter_map(|members| members.first())
            .filter_map(|name| self.get_table(name))
            .collect()
    }

    /// Members of the equivalence group containing `table`.
    pub fn group_of(&self, table: &str) -> Option<&[String]> {
        self.groups.get(base_name(table)).map(Vec::as_slice)
    }

    /// Select a random member of `table`'s equivalence group and record it as
    /// the name printed for `table` in `bindings`.
    ///
    /// An empty or unknown group is a bookkeeping defect and is reported as
    /// an invariant violation.
    pub fn pick_alternate_member(
        &self,
        table: &str,
        ctx: &mut Context,
        bindings: &mut Bindings,
    ) -> Result<String, GenError> {
        let members = self
            .group_of(table)
            .ok_or_else(|| GenError::invariant(format!("table {table} has no equivalence group")))?;
        let member = ctx
            .choose(members)
            .ok_or_else(|| GenError::invariant(format!("equivalence group of {table} is empty")))?
            .clone();
        bindings.set_member(table, member.clone());
        Ok(member)
    }
}

/// Builder for creating schemas.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: Vec<Table>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(self.tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        let cols = || {
            vec![
                Column::new("v0", DataType::BigInt),
                Column::new("v1", DataType::String),
            ]
        };
        SchemaBuilder::new()
            .table(Table::new("t1_indexed", cols()))
            .table(Table::new("t1", cols()))
            .table(Table::new("t1_view", cols()).view())
            .table(Table::new("t2", vec![Column::new("v0", DataType::Double)]))
            .build()
    }

    #[test]
    fn test_groups_by_base_name() {
        let schema = schema();
        assert_eq!(schema.groups.len(), 2);
        assert_eq!(
            schema.groups["t1"],
            vec!["t1".to_string(), "t1_indexed".into(), "t1_view".into()]
        );
        assert_eq!(schema.group_of("t1_view").unwrap().len(), 3);
        assert_eq!(schema.group_of("t2").unwrap(), ["t2".to_string()]);
    }

    #[test]
    fn test_logical_tables_prefer_base() {
        let schema = schema();
        let names: Vec<_> = schema.logical_tables().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["t1", "t2"]);
    }

    #[test]
    fn test_columns_bound_to_table() {
        let schema = schema();
        let t2 = schema.get_table("t2").unwrap();
        assert!(t2.columns.iter().all(|c| c.table == "t2"));
        assert_eq!(t2.columns_of_type(DataType::Double).count(), 1);
        assert!(schema.get_table("t1_view").unwrap().is_view);
    }

    #[test]
    fn test_pick_alternate_member() {
        let schema = schema();
        let mut ctx = Context::new_with_seed(5);
        let mut bindings = Bindings::new();
        for _ in 0..20 {
            let member = schema
                .pick_alternate_member("t1", &mut ctx, &mut bindings)
                .unwrap();
            assert!(member.starts_with("t1"));
            assert_eq!(bindings.member("t1"), member);
        }
        assert!(
            schema
                .pick_alternate_member("nope", &mut ctx, &mut bindings)
                .unwrap_err()
                .is_fatal()
        );
    }

    #[test]
    fn test_from_engine_type() {
        assert_eq!(DataType::from_engine_type("Int64"), DataType::BigInt);
        assert_eq!(DataType::from_engine_type("bigint"), DataType::BigInt);
        assert_eq!(DataType::from_engine_type("Float64"), DataType::Double);
        assert_eq!(DataType::from_engine_type("DOUBLE"), DataType::Double);
        assert_eq!(DataType::from_engine_type("Boolean"), DataType::Boolean);
        assert_eq!(DataType::from_engine_type("Utf8View"), DataType::String);
        assert_eq!(DataType::from_engine_type("TEXT"), DataType::String);
        assert_eq!(DataType::from_engine_type(""), DataType::Null);
    }
}
