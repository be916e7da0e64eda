//! Execution collaborator.
//!
//! Oracles only talk to the engine under test through the [`Engine`] trait.
//! [`SqliteEngine`] runs statements on an in-memory SQLite database.

use std::fmt;

/// A single value from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Text form of the value, or `None` for NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(i) => Some(i.to_string()),
            SqlValue::Real(f) => Some(format!("{f:?}")),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Blob(b) => Some(format!("x'{}'", hex(b))),
        }
    }

    /// Form used when comparing result rows.
    ///
    /// Text is quoted so it never collides with NULL or a number. Reals keep
    /// twelve significant digits and a negative zero prints as zero, so sums
    /// accumulated in a different row order still compare equal.
    pub fn canonical(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) if f.is_finite() => format!("{:.11e}", f + 0.0),
            SqlValue::Real(f) => format!("{f}"),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::Blob(b) => format!("x'{}'", hex(b)),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "{text}"),
            None => write!(f, "NULL"),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A row of values from a query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<SqlValue>);

impl Row {
    /// Canonical text of the whole row, used to compare result multisets.
    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(SqlValue::canonical)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Error returned by the engine under test.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Execution collaborator: runs SQL text and returns rows.
pub trait Engine {
    /// Run a query and collect every row.
    fn query(&self, sql: &str) -> Result<Vec<Row>, EngineError>;

    /// Run a statement that returns no rows.
    fn execute(&self, sql: &str) -> Result<(), EngineError>;

    /// First column of every row; `None` for NULL.
    fn first_column(&self, sql: &str) -> Result<Vec<Option<String>>, EngineError> {
        Ok(self
            .query(sql)?
            .into_iter()
            .map(|row| row.0.first().and_then(SqlValue::as_text))
            .collect())
    }
}

/// SQLite engine over a private in-memory database.
pub struct SqliteEngine {
    conn: rusqlite::Connection,
}

impl SqliteEngine {
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Ok(Self {
            conn: rusqlite::Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn convert_value(value: rusqlite::types::ValueRef<'_>) -> SqlValue {
        match value {
            rusqlite::types::ValueRef::Null => SqlValue::Null,
            rusqlite::types::ValueRef::Integer(i) => SqlValue::Integer(i),
            rusqlite::types::ValueRef::Real(f) => SqlValue::Real(f),
            rusqlite::types::ValueRef::Text(s) => {
                SqlValue::Text(String::from_utf8_lossy(s).to_string())
            }
            rusqlite::types::ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

impl Engine for SqliteEngine {
    fn query(&self, sql: &str) -> Result<Vec<Row>, EngineError> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut query_rows = stmt.query([])?;
        let mut rows = Vec::new();
        while let Some(row) = query_rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(Self::convert_value(row.get_ref(i)?));
            }
            rows.push(Row(values));
        }
        Ok(rows)
    }

    fn execute(&self, sql: &str) -> Result<(), EngineError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}
