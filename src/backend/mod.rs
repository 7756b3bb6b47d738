//! Narrow database backend interface.
//!
//! Everything the installer needs from a relational database goes through
//! [`DbBackend`]: statement execution, row queries, batched inserts, column
//! introspection, index creation and table/view drops. Backends distinguish
//! "object already exists" failures from real errors so the executor can
//! treat re-creation as success-by-idempotence.

mod sqlite;

pub use sqlite::SqliteBackend;

use crate::sql::Dialect;

/// Errors from backend execution.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("no such table: {0}")]
    NoSuchTable(String),
}

impl BackendError {
    /// Whether this error means the object was already there.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, BackendError::AlreadyExists(_))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// One database value, independent of the driver in use.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Datatype name observed from a live value, used when a column cannot be
    /// traced back to a catalog column.
    pub fn datatype(&self) -> Option<&'static str> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(_) => Some("integer"),
            SqlValue::Real(_) => Some("real"),
            SqlValue::Text(_) => Some("text"),
            SqlValue::Blob(_) => Some("blob"),
        }
    }

    /// JSON rendering for cached samples.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Integer(i) => serde_json::Value::from(*i),
            SqlValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SqlValue::Text(s) => serde_json::Value::from(s.clone()),
            SqlValue::Blob(b) => {
                let hex: String = b.iter().map(|x| format!("{:02x}", x)).collect();
                serde_json::Value::from(hex)
            }
        }
    }
}

/// One introspected column: live name plus the declared type, when the
/// backend reports one.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: Option<String>,
}

impl ColumnInfo {
    /// Whether the declared type is a binary type that must pass through the
    /// backend's marshalling hook on insert.
    pub fn is_binary(&self) -> bool {
        self.decl_type
            .as_deref()
            .map(|t| {
                let t = t.to_lowercase();
                t.contains("blob") || t.contains("bytea")
            })
            .unwrap_or(false)
    }
}

/// Result of a row query: column names in select order plus row values.
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// The narrow interface the installer drives a relational database through.
pub trait DbBackend {
    /// Dialect this backend executes.
    fn dialect(&self) -> Dialect;

    /// Connection string the backend was opened with.
    fn dsn(&self) -> &str;

    /// Execute one statement, discarding any result rows.
    fn execute(&self, sql: &str) -> BackendResult<()>;

    /// Run a query and collect its rows.
    fn query_rows(&self, sql: &str) -> BackendResult<QueryRows>;

    /// Insert a batch of rows in one transaction.
    ///
    /// Values are bound positionally against `columns`; a partially inserted
    /// batch is not rolled back beyond the failing transaction.
    fn insert_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> BackendResult<()>;

    /// Rows per insert transaction. Tuned per backend: larger where the
    /// driver handles many-row inserts cheaply.
    fn insert_batch_size(&self) -> usize;

    /// Live columns of a table, in declaration order.
    fn introspect_columns(&self, table: &str) -> BackendResult<Vec<ColumnInfo>>;

    fn has_table(&self, name: &str) -> BackendResult<bool>;

    /// Drop a table if present.
    fn drop_table(&self, name: &str) -> BackendResult<()>;

    /// Drop a view if present.
    fn drop_view(&self, name: &str) -> BackendResult<()>;

    /// Create an index; an index that already exists is not an error.
    fn create_index(&self, name: &str, table: &str, columns: &[String]) -> BackendResult<()>;

    /// Backend-specific marshalling for binary values bound on insert.
    fn marshal_binary(&self, value: SqlValue) -> SqlValue {
        value
    }
}
