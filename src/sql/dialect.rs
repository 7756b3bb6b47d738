//! SQL dialect definitions for the statements the installer emits.
//!
//! The engine does not build a general SQL AST; manifests carry their own
//! SELECT bodies and the engine only wraps them in the DDL each backend
//! expects. Each dialect implements [`SqlDialect`] for its specific syntax:
//!
//! - Identifier quoting: `"` (SQLite/PostgreSQL)
//! - View lifecycle: `DROP VIEW IF EXISTS` / `CREATE VIEW ... AS`
//! - Materialization: `CREATE TABLE ... AS <select>`
//! - Binary column types: `BLOB` vs `BYTEA`

/// SQL dialect trait - defines how installer statements are rendered.
///
/// Default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name, matched against the keys of a manifest `sql` section.
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Map a catalog datatype name to this dialect's column type.
    fn column_type(&self, datatype: &str) -> &'static str {
        match datatype.to_lowercase().as_str() {
            "integer" | "int" | "bigint" | "smallint" => "INTEGER",
            "real" | "float" | "double" | "numeric" | "decimal" => "REAL",
            "blob" | "binary" => "BLOB",
            _ => "TEXT",
        }
    }

    /// `CREATE TABLE` from an ordered list of `(name, catalog datatype)`.
    ///
    /// Column order is load-bearing: the loader copies rows positionally.
    fn create_table_sql(&self, name: &str, columns: &[(String, String)]) -> String {
        let cols = columns
            .iter()
            .map(|(n, dt)| format!("{} {}", self.quote_identifier(n), self.column_type(dt)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote_identifier(name),
            cols
        )
    }

    fn drop_view_sql(&self, name: &str) -> String {
        format!("DROP VIEW IF EXISTS {}", self.quote_identifier(name))
    }

    fn create_view_sql(&self, name: &str, select: &str) -> String {
        format!("CREATE VIEW {} AS {}", self.quote_identifier(name), select)
    }

    fn drop_table_sql(&self, name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_identifier(name))
    }

    /// Materialize a SELECT into a table.
    fn create_table_as_sql(&self, name: &str, select: &str) -> String {
        format!("CREATE TABLE {} AS {}", self.quote_identifier(name), select)
    }

    fn create_index_sql(&self, name: &str, table: &str, columns: &[String]) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.quote_identifier(name),
            self.quote_identifier(table),
            cols
        )
    }

    fn select_all_sql(&self, name: &str) -> String {
        format!("SELECT * FROM {}", self.quote_identifier(name))
    }

    fn sample_sql(&self, name: &str, limit: u64) -> String {
        format!("SELECT * FROM {} LIMIT {}", self.quote_identifier(name), limit)
    }

    fn count_sql(&self, name: &str) -> String {
        format!("SELECT count(*) FROM {}", self.quote_identifier(name))
    }

    /// Union the rows of several tables under one SELECT.
    ///
    /// With a single table this is a plain passthrough SELECT, avoiding a
    /// redundant subquery layer.
    fn union_sql(&self, names: &[String]) -> String {
        if names.len() == 1 {
            self.select_all_sql(&names[0])
        } else {
            let selects = names
                .iter()
                .map(|n| self.select_all_sql(n))
                .collect::<Vec<_>>()
                .join(" UNION ");
            format!("SELECT * FROM ({}) AS subquery", selects)
        }
    }
}

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }
}

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn column_type(&self, datatype: &str) -> &'static str {
        match datatype.to_lowercase().as_str() {
            "integer" | "int" => "INTEGER",
            "bigint" => "BIGINT",
            "smallint" => "SMALLINT",
            "real" | "float" | "double" | "numeric" | "decimal" => "DOUBLE PRECISION",
            "blob" | "binary" => "BYTEA",
            _ => "TEXT",
        }
    }
}

/// Supported dialects as a copyable enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Sqlite => &Sqlite,
            Dialect::Postgres => &Postgres,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn column_type(&self, datatype: &str) -> &'static str {
        self.dialect().column_type(datatype)
    }
}
