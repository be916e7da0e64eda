//! Schema introspection from a live database.
//!
//! Uses `sqlite_master` and PRAGMA commands to read the current tables and
//! views and converts them to the `query_gen::Schema` format, which groups
//! them into equivalence groups by base name.

use anyhow::{Context, Result};
use query_gen::{Column, DataType, Schema, SchemaBuilder, Table};

/// Introspects schema from a database connection.
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Introspect schema from a SQLite connection.
    pub fn from_sqlite(conn: &rusqlite::Connection) -> Result<Schema> {
        let objects = Self::get_objects_sqlite(conn)?;
        let mut builder = SchemaBuilder::new();

        for (name, is_view) in objects {
            let columns = Self::get_columns_sqlite(conn, &name)?;
            if columns.is_empty() {
                continue;
            }
            let table = Table::new(name, columns);
            builder = builder.table(if is_view { table.view() } else { table });
        }

        Ok(builder.build())
    }

    fn get_objects_sqlite(conn: &rusqlite::Connection) -> Result<Vec<(String, bool)>> {
        let mut stmt = conn
            .prepare(
                "SELECT name, type FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .context("Failed to prepare table query")?;

        let objects = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let kind: String = row.get(1)?;
                Ok((name, kind == "view"))
            })
            .context("Failed to query tables")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to collect table names")?;

        Ok(objects)
    }

    fn get_columns_sqlite(conn: &rusqlite::Connection, table_name: &str) -> Result<Vec<Column>> {
        // table_info returns: cid, name, type, notnull, dflt_value, pk
        let query = format!("PRAGMA table_info(\"{table_name}\")");
        let mut stmt = conn.prepare(&query).context("Failed to prepare PRAGMA")?;

        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let type_str: String = row.get::<_, String>(2).unwrap_or_default();
                let notnull: i64 = row.get(3)?;
                Ok((name, type_str, notnull != 0))
            })
            .context("Failed to query columns")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to collect columns")?;

        Ok(columns
            .into_iter()
            .map(|(name, type_str, notnull)| {
                let column = Column::new(name, DataType::from_engine_type(&type_str));
                if notnull { column.not_null() } else { column }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_introspect_groups_members() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t0 (v0 BIGINT NOT NULL, v1 DOUBLE, v2 BOOLEAN, v3 TEXT);
             CREATE TABLE t0_indexed (v0 BIGINT NOT NULL, v1 DOUBLE, v2 BOOLEAN, v3 TEXT);
             CREATE INDEX i0 ON t0_indexed (v0);
             CREATE VIEW t0_view AS SELECT * FROM t0;
             CREATE TABLE t1 (v0 TEXT);",
        )
        .unwrap();

        let schema = SchemaIntrospector::from_sqlite(&conn).unwrap();
        assert_eq!(schema.tables.len(), 4);
        assert_eq!(
            schema.groups["t0"],
            vec!["t0".to_string(), "t0_indexed".into(), "t0_view".into()]
        );

        let t0 = schema.get_table("t0").unwrap();
        let types: Vec<_> = t0.columns.iter().map(|c| c.data_type).collect();
        assert_eq!(
            types,
            [DataType::BigInt, DataType::Double, DataType::Boolean, DataType::String]
        );
        assert!(!t0.columns[0].nullable);
        assert!(schema.get_table("t0_view").unwrap().is_view);
        assert_eq!(schema.get_table("t0_view").unwrap().columns.len(), 4);
    }
}
