//! External catalog boundary.
//!
//! The warehouse consumes the catalog through two narrow operations:
//! resolving a textual reference to a dataset/partition identity, and opening
//! a resolved partition for schema and row access. The catalog side of this
//! boundary lives elsewhere; [`MemoryLibrary`] is an in-process
//! implementation used in tests.

mod memory;

pub use memory::{MemoryLibrary, MemoryPartition};

use crate::backend::SqlValue;
use crate::identity::{PartitionRef, ResolvedRef};

/// Errors from catalog access.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("partition not found in catalog: {0}")]
    PartitionNotFound(String),

    #[error("partition {partition} has no table {table}")]
    NoSuchTable { partition: String, table: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type LibraryResult<T> = Result<T, LibraryError>;

/// Canonical definition of one table as the catalog knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogTable {
    /// Versioned table id.
    pub vid: String,
    pub name: String,
    pub description: Option<String>,
    /// Columns in source declaration order.
    pub columns: Vec<CatalogColumn>,
}

/// Canonical definition of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogColumn {
    /// Column id; contains no underscore so installed names split cleanly.
    pub id: String,
    pub name: String,
    pub datatype: String,
    pub description: Option<String>,
    pub sequence_id: i64,
}

/// The catalog as the warehouse sees it.
pub trait Library {
    /// Map a textual or versioned reference to a concrete identity.
    ///
    /// Safe to call repeatedly; no caching contract is assumed.
    fn resolve(&self, reference: &str) -> Option<ResolvedRef>;

    /// Open a resolved partition for schema and row access.
    fn open_partition(&self, vid: &str) -> LibraryResult<PartitionSource>;
}

/// An open partition: its identity, catalog schema, and a readable
/// connection to its rows.
pub struct PartitionSource {
    pub identity: PartitionRef,
    pub schema: Vec<CatalogTable>,
    conn: rusqlite::Connection,
}

impl PartitionSource {
    pub fn new(
        identity: PartitionRef,
        schema: Vec<CatalogTable>,
        conn: rusqlite::Connection,
    ) -> Self {
        Self {
            identity,
            schema,
            conn,
        }
    }

    /// Catalog definition of one of this partition's tables.
    pub fn table(&self, name: &str) -> Option<&CatalogTable> {
        self.schema.iter().find(|t| t.name == name)
    }

    /// Source column names of a table, in declaration order.
    pub fn columns(&self, table: &str) -> LibraryResult<Vec<String>> {
        let catalog = self.table(table).ok_or_else(|| LibraryError::NoSuchTable {
            partition: self.identity.vid.clone(),
            table: table.to_string(),
        })?;
        Ok(catalog.columns.iter().map(|c| c.name.clone()).collect())
    }

    /// Stream a table's rows in fixed-size batches.
    ///
    /// Rows are read `select * from <table> [where ...]` through the
    /// partition's own connection and handed to `f` one batch at a time.
    pub fn for_each_batch<E, F>(
        &self,
        table: &str,
        where_clause: Option<&str>,
        batch_size: usize,
        mut f: F,
    ) -> Result<(), E>
    where
        F: FnMut(Vec<Vec<SqlValue>>) -> Result<(), E>,
        E: From<LibraryError>,
    {
        let mut sql = format!("SELECT * FROM \"{}\"", table.replace('"', "\"\""));
        if let Some(clause) = where_clause {
            sql.push_str(" WHERE (");
            sql.push_str(clause);
            sql.push(')');
        }

        let mut stmt = self.conn.prepare(&sql).map_err(LibraryError::from)?;
        let column_count = stmt.column_count();

        let mut rows = stmt.query([]).map_err(LibraryError::from)?;
        let mut batch: Vec<Vec<SqlValue>> = Vec::with_capacity(batch_size.min(1024));

        loop {
            let row = rows.next().map_err(LibraryError::from)?;
            match row {
                Some(row) => {
                    let mut values = Vec::with_capacity(column_count);
                    for i in 0..column_count {
                        let v: rusqlite::types::Value =
                            row.get(i).map_err(LibraryError::from)?;
                        values.push(match v {
                            rusqlite::types::Value::Null => SqlValue::Null,
                            rusqlite::types::Value::Integer(i) => SqlValue::Integer(i),
                            rusqlite::types::Value::Real(f) => SqlValue::Real(f),
                            rusqlite::types::Value::Text(s) => SqlValue::Text(s),
                            rusqlite::types::Value::Blob(b) => SqlValue::Blob(b),
                        });
                    }
                    batch.push(values);
                    if batch.len() >= batch_size {
                        f(std::mem::take(&mut batch))?;
                    }
                }
                None => break,
            }
        }

        if !batch.is_empty() {
            f(batch)?;
        }
        Ok(())
    }
}
