//! SQLite warehouse backend over `rusqlite`.

use rusqlite::types::Value as SqliteValue;
use rusqlite::{params_from_iter, Connection};

use super::{BackendError, BackendResult, ColumnInfo, DbBackend, QueryRows, SqlValue};
use crate::sql::{Dialect, SqlDialect};

/// SQLite can absorb large multi-row transactions cheaply.
const INSERT_BATCH_SIZE: usize = 50_000;

/// A warehouse database stored in a SQLite file (or in memory).
pub struct SqliteBackend {
    conn: Connection,
    dsn: String,
}

impl SqliteBackend {
    /// Open or create the warehouse database at `path`.
    pub fn open(path: &str) -> BackendResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            dsn: format!("sqlite:///{}", path),
        })
    }

    /// Open an in-memory warehouse (for testing).
    pub fn open_in_memory() -> BackendResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            dsn: "sqlite://:memory:".to_string(),
        })
    }

    fn classify(err: rusqlite::Error) -> BackendError {
        let msg = err.to_string().to_lowercase();
        if msg.contains("already exists") {
            BackendError::AlreadyExists(err.to_string())
        } else if msg.contains("no such table") {
            BackendError::NoSuchTable(err.to_string())
        } else {
            BackendError::Sqlite(err)
        }
    }
}

fn to_sqlite(value: SqlValue) -> SqliteValue {
    match value {
        SqlValue::Null => SqliteValue::Null,
        SqlValue::Integer(i) => SqliteValue::Integer(i),
        SqlValue::Real(f) => SqliteValue::Real(f),
        SqlValue::Text(s) => SqliteValue::Text(s),
        SqlValue::Blob(b) => SqliteValue::Blob(b),
    }
}

fn from_sqlite(value: SqliteValue) -> SqlValue {
    match value {
        SqliteValue::Null => SqlValue::Null,
        SqliteValue::Integer(i) => SqlValue::Integer(i),
        SqliteValue::Real(f) => SqlValue::Real(f),
        SqliteValue::Text(s) => SqlValue::Text(s),
        SqliteValue::Blob(b) => SqlValue::Blob(b),
    }
}

impl DbBackend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn dsn(&self) -> &str {
        &self.dsn
    }

    fn execute(&self, sql: &str) -> BackendResult<()> {
        self.conn
            .execute_batch(sql)
            .map_err(Self::classify)?;
        Ok(())
    }

    fn query_rows(&self, sql: &str) -> BackendResult<QueryRows> {
        let mut stmt = self.conn.prepare(sql).map_err(Self::classify)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let count = columns.len();

        let mut rows = Vec::new();
        let mut raw = stmt.query([]).map_err(Self::classify)?;
        while let Some(row) = raw.next().map_err(Self::classify)? {
            let mut values = Vec::with_capacity(count);
            for i in 0..count {
                let v: SqliteValue = row.get(i)?;
                values.push(from_sqlite(v));
            }
            rows.push(values);
        }

        Ok(QueryRows { columns, rows })
    }

    fn insert_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> BackendResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let dialect = self.dialect();
        let cols = columns
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote_identifier(table),
            cols,
            placeholders
        );

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&sql).map_err(Self::classify)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter().cloned().map(to_sqlite)))
                    .map_err(Self::classify)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_batch_size(&self) -> usize {
        INSERT_BATCH_SIZE
    }

    fn introspect_columns(&self, table: &str) -> BackendResult<Vec<ColumnInfo>> {
        let sql = format!("PRAGMA table_info({})", Dialect::Sqlite.quote_identifier(table));
        let mut stmt = self.conn.prepare(&sql).map_err(Self::classify)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get::<_, String>(1)?,
                    decl_type: row.get::<_, Option<String>>(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(BackendError::NoSuchTable(table.to_string()));
        }
        Ok(columns)
    }

    fn has_table(&self, name: &str) -> BackendResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn drop_table(&self, name: &str) -> BackendResult<()> {
        let sql = Dialect::Sqlite.dialect().drop_table_sql(name);
        self.execute(&sql)
    }

    fn drop_view(&self, name: &str) -> BackendResult<()> {
        let sql = Dialect::Sqlite.dialect().drop_view_sql(name);
        self.execute(&sql)
    }

    fn create_index(&self, name: &str, table: &str, columns: &[String]) -> BackendResult<()> {
        let sql = Dialect::Sqlite.dialect().create_index_sql(name, table, columns);
        match self.execute(&sql) {
            Err(e) if e.is_already_exists() => {
                tracing::info!(index = name, "index already exists");
                Ok(())
            }
            other => other,
        }
    }
}
