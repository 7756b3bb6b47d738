//! SQLite-based schema registry.
//!
//! Persistent metadata store for everything a warehouse installs: table
//! records with lineage, their columns, partition records, manifests and
//! their links, and extract jobs. One registry instance is scoped to one
//! warehouse database.
//!
//! # Design
//!
//! - Table/partition attributes that vary by kind live in a JSON `data`
//!   blob ([`TableData`]), the fixed identity fields in real columns
//! - Versioned - auto-clears on version mismatch
//! - `proto_vid` is first-writer-wins: once a record is linked to its
//!   canonical table the link never changes

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::identity::{self, PartitionRef};
use crate::library::CatalogTable;

/// Current registry schema version. Bump this when the layout changes.
const REGISTRY_VERSION: i32 = 1;

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine registry directory")]
    NoRegistryDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no table record for vid: {0}")]
    NoSuchTable(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// What kind of relational object a table record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// A base table, either canonical (no `proto_vid`) or an installed
    /// physical copy of one (with `proto_vid`).
    Table,
    /// A plain SQL view.
    View,
    /// A materialized view, stored as a real table.
    MView,
    /// A naming view pointing at another object's data.
    Alias,
}

impl TableKind {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "table" => Some(TableKind::Table),
            "view" => Some(TableKind::View),
            "mview" => Some(TableKind::MView),
            "alias" => Some(TableKind::Alias),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Table => "table",
            TableKind::View => "view",
            TableKind::MView => "mview",
            TableKind::Alias => "alias",
        }
    }
}

/// Kind-varying attributes of a table record, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    /// SQL text a view or mview was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,

    /// Unix-millisecond stamp of the last (re)build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,

    /// Table/view names this object's SQL body references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tc_names: Vec<String>,

    /// Cached `LIMIT 20` sample; first row is the column names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Vec<Vec<serde_json::Value>>>,

    /// Cached row count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,

    /// Every concrete name that implements this logical table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub installed_names: Vec<String>,

    /// Documentation summary from the manifest section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Vid of the partition a physical copy was loaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_partition: Option<String>,
}

/// One registered table, view, mview or alias.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRecord {
    pub vid: String,
    /// Owning dataset vid: the source dataset for canonical tables, the
    /// warehouse vid for objects the warehouse created.
    pub d_vid: String,
    pub name: String,
    pub altname: Option<String>,
    pub kind: TableKind,
    pub installed: bool,
    /// Canonical table this record derives from; immutable once set.
    pub proto_vid: Option<String>,
    pub sequence_id: i64,
    pub description: Option<String>,
    pub data: TableData,
}

/// One registered column of a table record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnRecord {
    pub t_vid: String,
    /// Canonical column id from the catalog, when known.
    pub c_id: Option<String>,
    pub name: String,
    pub altname: Option<String>,
    pub datatype: Option<String>,
    pub description: Option<String>,
    pub sequence_id: i64,
    /// Canonical column id a live column was traced back to.
    pub derivedfrom: Option<String>,
}

/// One referenced partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRecord {
    pub vid: String,
    pub vname: String,
    pub format: String,
    pub dataset_vid: String,
    pub installed: bool,
}

/// One installed manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestRecord {
    pub uid: String,
    pub title: Option<String>,
    pub summary: Option<String>,
}

/// One registered extract job.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractRecord {
    pub manifest_uid: String,
    pub path: String,
    /// Free-form descriptor (table, format, ...) as JSON.
    pub descriptor: serde_json::Value,
}

/// Unix-millisecond wall clock, used for `updated` stamps.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

/// Attributes applied when installing or re-installing a table record.
#[derive(Debug, Clone, Default)]
pub struct InstallTable {
    /// Explicit vid; derived from the warehouse vid and name when absent.
    pub vid: Option<String>,
    pub altname: Option<String>,
    pub kind: Option<TableKind>,
    pub proto_vid: Option<String>,
    pub description: Option<String>,
    /// Data fields to merge over the existing blob.
    pub data: Option<TableData>,
}

/// SQLite-backed schema registry.
pub struct SchemaRegistry {
    conn: Connection,
}

impl SchemaRegistry {
    /// Open or create the registry database at `path`.
    pub fn open(path: &str) -> RegistryResult<Self> {
        let conn = Connection::open(path)?;
        let registry = Self { conn };
        registry.init()?;
        Ok(registry)
    }

    /// Open or create the registry at its default location,
    /// `~/.granary/registry.db`.
    pub fn open_default() -> RegistryResult<Self> {
        let path = Self::default_path()?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::open(&path.to_string_lossy())
    }

    /// Open an in-memory registry (for testing).
    pub fn open_in_memory() -> RegistryResult<Self> {
        let conn = Connection::open_in_memory()?;
        let registry = Self { conn };
        registry.init()?;
        Ok(registry)
    }

    /// Default on-disk location, `~/.granary/registry.db`.
    pub fn default_path() -> RegistryResult<PathBuf> {
        let base = dirs::home_dir().ok_or(RegistryError::NoRegistryDir)?;
        Ok(base.join(".granary").join("registry.db"))
    }

    /// Initialize the registry schema and check version.
    fn init(&self) -> RegistryResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tables (
                vid TEXT PRIMARY KEY,
                d_vid TEXT NOT NULL,
                name TEXT NOT NULL,
                altname TEXT,
                kind TEXT NOT NULL,
                installed INTEGER NOT NULL DEFAULT 0,
                proto_vid TEXT,
                sequence_id INTEGER NOT NULL,
                description TEXT,
                data TEXT NOT NULL DEFAULT '{}',
                UNIQUE (d_vid, name)
            );

            CREATE TABLE IF NOT EXISTS columns (
                t_vid TEXT NOT NULL,
                c_id TEXT,
                name TEXT NOT NULL,
                altname TEXT,
                datatype TEXT,
                description TEXT,
                sequence_id INTEGER NOT NULL,
                derivedfrom TEXT,
                UNIQUE (t_vid, name)
            );

            CREATE TABLE IF NOT EXISTS partitions (
                vid TEXT PRIMARY KEY,
                vname TEXT NOT NULL,
                format TEXT NOT NULL,
                dataset_vid TEXT NOT NULL,
                installed INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS manifests (
                uid TEXT PRIMARY KEY,
                title TEXT,
                summary TEXT
            );

            CREATE TABLE IF NOT EXISTS manifest_links (
                manifest_uid TEXT NOT NULL,
                kind TEXT NOT NULL,
                ref_vid TEXT NOT NULL,
                UNIQUE (manifest_uid, kind, ref_vid)
            );

            CREATE TABLE IF NOT EXISTS extracts (
                manifest_uid TEXT NOT NULL,
                path TEXT NOT NULL,
                descriptor TEXT NOT NULL,
                UNIQUE (manifest_uid, path)
            );
            ",
        )?;

        let stored_version: Option<i32> = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == REGISTRY_VERSION => {}
            Some(_) => {
                self.clear_all()?;
                self.set_version()?;
            }
            None => {
                self.set_version()?;
            }
        }

        Ok(())
    }

    fn set_version(&self) -> RegistryResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
            params![REGISTRY_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// Drop all registry content (but keep the schema).
    pub fn clear_all(&self) -> RegistryResult<()> {
        self.conn.execute_batch(
            "DELETE FROM tables;
             DELETE FROM columns;
             DELETE FROM partitions;
             DELETE FROM manifests;
             DELETE FROM manifest_links;
             DELETE FROM extracts;
             DELETE FROM meta WHERE key != 'version';",
        )?;
        Ok(())
    }

    // =========================================================================
    // Warehouse metadata
    // =========================================================================

    pub fn meta_set(&self, key: &str, value: &str) -> RegistryResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn meta_get(&self, key: &str) -> RegistryResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    // =========================================================================
    // Table records
    // =========================================================================

    fn row_to_table(row: &rusqlite::Row<'_>) -> rusqlite::Result<(TableRecord, String)> {
        let kind: String = row.get(4)?;
        let data: String = row.get(9)?;
        Ok((
            TableRecord {
                vid: row.get(0)?,
                d_vid: row.get(1)?,
                name: row.get(2)?,
                altname: row.get(3)?,
                kind: TableKind::from_str(&kind).unwrap_or(TableKind::Table),
                installed: row.get::<_, i64>(5)? != 0,
                proto_vid: row.get(6)?,
                sequence_id: row.get(7)?,
                description: row.get(8)?,
                data: TableData::default(),
            },
            data,
        ))
    }

    fn parse_table(pair: (TableRecord, String)) -> RegistryResult<TableRecord> {
        let (mut record, data) = pair;
        record.data = serde_json::from_str(&data)?;
        Ok(record)
    }

    const TABLE_COLUMNS: &'static str =
        "vid, d_vid, name, altname, kind, installed, proto_vid, sequence_id, description, data";

    /// Find a table record by name, anywhere in this registry.
    pub fn find_table_by_name(&self, name: &str) -> RegistryResult<Option<TableRecord>> {
        let sql = format!(
            "SELECT {} FROM tables WHERE name = ? LIMIT 1",
            Self::TABLE_COLUMNS
        );
        let pair = self
            .conn
            .query_row(&sql, params![name], Self::row_to_table)
            .optional()?;
        pair.map(Self::parse_table).transpose()
    }

    /// Find a table record by name within one dataset scope.
    pub fn find_table_in_dataset(
        &self,
        d_vid: &str,
        name: &str,
    ) -> RegistryResult<Option<TableRecord>> {
        let sql = format!(
            "SELECT {} FROM tables WHERE d_vid = ? AND name = ?",
            Self::TABLE_COLUMNS
        );
        let pair = self
            .conn
            .query_row(&sql, params![d_vid, name], Self::row_to_table)
            .optional()?;
        pair.map(Self::parse_table).transpose()
    }

    pub fn find_table_by_vid(&self, vid: &str) -> RegistryResult<Option<TableRecord>> {
        let sql = format!(
            "SELECT {} FROM tables WHERE vid = ?",
            Self::TABLE_COLUMNS
        );
        let pair = self
            .conn
            .query_row(&sql, params![vid], Self::row_to_table)
            .optional()?;
        pair.map(Self::parse_table).transpose()
    }

    /// All records whose `proto_vid` points at the given canonical table.
    pub fn derived_tables(&self, proto_vid: &str) -> RegistryResult<Vec<TableRecord>> {
        let sql = format!(
            "SELECT {} FROM tables WHERE proto_vid = ? ORDER BY name",
            Self::TABLE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let pairs = stmt
            .query_map(params![proto_vid], Self::row_to_table)?
            .collect::<Result<Vec<_>, _>>()?;
        pairs.into_iter().map(Self::parse_table).collect()
    }

    /// Every table record, ordered by vid for stable iteration.
    pub fn tables(&self) -> RegistryResult<Vec<TableRecord>> {
        let sql = format!("SELECT {} FROM tables ORDER BY vid", Self::TABLE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let pairs = stmt
            .query_map([], Self::row_to_table)?
            .collect::<Result<Vec<_>, _>>()?;
        pairs.into_iter().map(Self::parse_table).collect()
    }

    /// Create or update a table record by `(d_vid, name)` and mark it
    /// installed.
    ///
    /// Data fields merge over the existing blob; `proto_vid` is only written
    /// the first time (first writer wins).
    pub fn install_table(
        &self,
        d_vid: &str,
        name: &str,
        install: InstallTable,
    ) -> RegistryResult<TableRecord> {
        let existing = self.find_table_in_dataset(d_vid, name)?;

        let record = match existing {
            Some(mut t) => {
                if let Some(altname) = install.altname {
                    t.altname = Some(altname);
                }
                if let Some(kind) = install.kind {
                    t.kind = kind;
                }
                if t.proto_vid.is_none() {
                    t.proto_vid = install.proto_vid;
                }
                if let Some(description) = install.description {
                    t.description = Some(description);
                }
                if let Some(data) = install.data {
                    merge_data(&mut t.data, data);
                }
                t.installed = true;
                t
            }
            None => {
                let next_seq: i64 = self
                    .conn
                    .query_row(
                        "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM tables WHERE d_vid = ?",
                        params![d_vid],
                        |row| row.get(0),
                    )?;
                TableRecord {
                    vid: install
                        .vid
                        .unwrap_or_else(|| identity::table_vid(d_vid, name)),
                    d_vid: d_vid.to_string(),
                    name: name.to_string(),
                    altname: install.altname,
                    kind: install.kind.unwrap_or(TableKind::Table),
                    installed: true,
                    proto_vid: install.proto_vid,
                    sequence_id: next_seq,
                    description: install.description,
                    data: install.data.unwrap_or_default(),
                }
            }
        };

        self.save_table(&record)?;
        Ok(record)
    }

    fn save_table(&self, t: &TableRecord) -> RegistryResult<()> {
        let data = serde_json::to_string(&t.data)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO tables
             (vid, d_vid, name, altname, kind, installed, proto_vid, sequence_id, description, data)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                t.vid,
                t.d_vid,
                t.name,
                t.altname,
                t.kind.as_str(),
                t.installed as i64,
                t.proto_vid,
                t.sequence_id,
                t.description,
                data
            ],
        )?;
        Ok(())
    }

    /// Overwrite the data blob of an existing record.
    pub fn save_table_data(&self, vid: &str, data: &TableData) -> RegistryResult<()> {
        let json = serde_json::to_string(data)?;
        let rows = self.conn.execute(
            "UPDATE tables SET data = ? WHERE vid = ?",
            params![json, vid],
        )?;
        if rows == 0 {
            return Err(RegistryError::NoSuchTable(vid.to_string()));
        }
        Ok(())
    }

    /// Mark a canonical table installed under a concrete name.
    pub fn mark_table_installed(&self, vid: &str, installed_name: &str) -> RegistryResult<()> {
        let mut t = self
            .find_table_by_vid(vid)?
            .ok_or_else(|| RegistryError::NoSuchTable(vid.to_string()))?;
        t.installed = true;
        if !t.data.installed_names.iter().any(|n| n == installed_name) {
            t.data.installed_names.push(installed_name.to_string());
        }
        self.save_table(&t)
    }

    /// Append a derived name to a record's `installed_names`, deduplicated.
    pub fn add_installed_name(&self, vid: &str, name: &str) -> RegistryResult<()> {
        self.mark_table_installed(vid, name)
    }

    /// Remove a table record and its columns.
    pub fn remove_table(&self, vid: &str) -> RegistryResult<()> {
        self.conn
            .execute("DELETE FROM columns WHERE t_vid = ?", params![vid])?;
        self.conn
            .execute("DELETE FROM tables WHERE vid = ?", params![vid])?;
        Ok(())
    }

    /// Register a canonical table and its columns from the catalog.
    ///
    /// Existing column rows are preserved; this is idempotent across
    /// re-installs of the same partition.
    pub fn install_proto_table(
        &self,
        table: &CatalogTable,
        dataset_vid: &str,
    ) -> RegistryResult<TableRecord> {
        let record = self.install_table(
            dataset_vid,
            &table.name,
            InstallTable {
                vid: Some(table.vid.clone()),
                kind: Some(TableKind::Table),
                description: table.description.clone(),
                ..Default::default()
            },
        )?;

        for column in &table.columns {
            self.upsert_column(&ColumnRecord {
                t_vid: table.vid.clone(),
                c_id: Some(column.id.clone()),
                name: column.name.clone(),
                altname: Some(format!("{}_{}", column.id, column.name)),
                datatype: Some(column.datatype.clone()),
                description: column.description.clone(),
                sequence_id: column.sequence_id,
                derivedfrom: None,
            })?;
        }

        Ok(record)
    }

    // =========================================================================
    // Columns
    // =========================================================================

    pub fn upsert_column(&self, c: &ColumnRecord) -> RegistryResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO columns
             (t_vid, c_id, name, altname, datatype, description, sequence_id, derivedfrom)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                c.t_vid,
                c.c_id,
                c.name,
                c.altname,
                c.datatype,
                c.description,
                c.sequence_id,
                c.derivedfrom
            ],
        )?;
        Ok(())
    }

    pub fn delete_columns(&self, t_vid: &str) -> RegistryResult<usize> {
        let rows = self
            .conn
            .execute("DELETE FROM columns WHERE t_vid = ?", params![t_vid])?;
        Ok(rows)
    }

    pub fn columns(&self, t_vid: &str) -> RegistryResult<Vec<ColumnRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT t_vid, c_id, name, altname, datatype, description, sequence_id, derivedfrom
             FROM columns WHERE t_vid = ? ORDER BY sequence_id",
        )?;
        let columns = stmt
            .query_map(params![t_vid], |row| {
                Ok(ColumnRecord {
                    t_vid: row.get(0)?,
                    c_id: row.get(1)?,
                    name: row.get(2)?,
                    altname: row.get(3)?,
                    datatype: row.get(4)?,
                    description: row.get(5)?,
                    sequence_id: row.get(6)?,
                    derivedfrom: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Look up a canonical catalog column by its id.
    pub fn find_canonical_column(&self, c_id: &str) -> RegistryResult<Option<ColumnRecord>> {
        let column = self
            .conn
            .query_row(
                "SELECT t_vid, c_id, name, altname, datatype, description, sequence_id, derivedfrom
                 FROM columns WHERE c_id = ? AND derivedfrom IS NULL",
                params![c_id],
                |row| {
                    Ok(ColumnRecord {
                        t_vid: row.get(0)?,
                        c_id: row.get(1)?,
                        name: row.get(2)?,
                        altname: row.get(3)?,
                        datatype: row.get(4)?,
                        description: row.get(5)?,
                        sequence_id: row.get(6)?,
                        derivedfrom: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(column)
    }

    // =========================================================================
    // Partitions
    // =========================================================================

    pub fn upsert_partition(&self, p: &PartitionRef) -> RegistryResult<()> {
        self.conn.execute(
            "INSERT INTO partitions (vid, vname, format, dataset_vid, installed)
             VALUES (?, ?, ?, ?, 0)
             ON CONFLICT (vid) DO UPDATE SET vname = excluded.vname, format = excluded.format",
            params![p.vid, p.vname, p.format.as_str(), p.dataset_vid],
        )?;
        Ok(())
    }

    pub fn partition(&self, vid: &str) -> RegistryResult<Option<PartitionRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT vid, vname, format, dataset_vid, installed FROM partitions WHERE vid = ?",
                params![vid],
                Self::row_to_partition,
            )
            .optional()?;
        Ok(record)
    }

    fn row_to_partition(row: &rusqlite::Row<'_>) -> rusqlite::Result<PartitionRecord> {
        Ok(PartitionRecord {
            vid: row.get(0)?,
            vname: row.get(1)?,
            format: row.get(2)?,
            dataset_vid: row.get(3)?,
            installed: row.get::<_, i64>(4)? != 0,
        })
    }

    pub fn mark_partition_installed(&self, vid: &str) -> RegistryResult<()> {
        self.conn.execute(
            "UPDATE partitions SET installed = 1 WHERE vid = ?",
            params![vid],
        )?;
        Ok(())
    }

    pub fn installed_partitions(&self) -> RegistryResult<Vec<PartitionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT vid, vname, format, dataset_vid, installed
             FROM partitions WHERE installed = 1 ORDER BY vname",
        )?;
        let records = stmt
            .query_map([], Self::row_to_partition)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Partitions belonging to one dataset, installed or not.
    pub fn dataset_partitions(&self, dataset_vid: &str) -> RegistryResult<Vec<PartitionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT vid, vname, format, dataset_vid, installed
             FROM partitions WHERE dataset_vid = ? ORDER BY vname",
        )?;
        let records = stmt
            .query_map(params![dataset_vid], Self::row_to_partition)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn remove_partition(&self, vid: &str) -> RegistryResult<()> {
        self.conn
            .execute("DELETE FROM partitions WHERE vid = ?", params![vid])?;
        Ok(())
    }

    // =========================================================================
    // Manifests and links
    // =========================================================================

    pub fn upsert_manifest(
        &self,
        uid: &str,
        title: Option<&str>,
        summary: Option<&str>,
    ) -> RegistryResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO manifests (uid, title, summary) VALUES (?, ?, ?)",
            params![uid, title, summary],
        )?;
        Ok(())
    }

    pub fn manifests(&self) -> RegistryResult<Vec<ManifestRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uid, title, summary FROM manifests ORDER BY uid")?;
        let records = stmt
            .query_map([], |row| {
                Ok(ManifestRecord {
                    uid: row.get(0)?,
                    title: row.get(1)?,
                    summary: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn link_manifest_partition(&self, uid: &str, p_vid: &str) -> RegistryResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO manifest_links (manifest_uid, kind, ref_vid)
             VALUES (?, 'partition', ?)",
            params![uid, p_vid],
        )?;
        Ok(())
    }

    pub fn link_manifest_table(&self, uid: &str, t_vid: &str) -> RegistryResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO manifest_links (manifest_uid, kind, ref_vid)
             VALUES (?, 'table', ?)",
            params![uid, t_vid],
        )?;
        Ok(())
    }

    pub fn manifest_links(&self, uid: &str, kind: &str) -> RegistryResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT ref_vid FROM manifest_links WHERE manifest_uid = ? AND kind = ? ORDER BY ref_vid",
        )?;
        let vids = stmt
            .query_map(params![uid, kind], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(vids)
    }

    // =========================================================================
    // Extracts
    // =========================================================================

    pub fn upsert_extract(
        &self,
        manifest_uid: &str,
        path: &str,
        descriptor: &serde_json::Value,
    ) -> RegistryResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO extracts (manifest_uid, path, descriptor) VALUES (?, ?, ?)",
            params![manifest_uid, path, serde_json::to_string(descriptor)?],
        )?;
        Ok(())
    }

    /// Paths of every extract currently linked to a manifest.
    pub fn extract_paths(&self, manifest_uid: &str) -> RegistryResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM extracts WHERE manifest_uid = ? ORDER BY path")?;
        let paths = stmt
            .query_map(params![manifest_uid], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    pub fn extracts(&self, manifest_uid: &str) -> RegistryResult<Vec<ExtractRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT manifest_uid, path, descriptor FROM extracts WHERE manifest_uid = ? ORDER BY path",
        )?;
        let pairs = stmt
            .query_map(params![manifest_uid], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        pairs
            .into_iter()
            .map(|(uid, path, descriptor)| {
                Ok(ExtractRecord {
                    manifest_uid: uid,
                    path,
                    descriptor: serde_json::from_str(&descriptor)?,
                })
            })
            .collect()
    }

    pub fn delete_extract(&self, manifest_uid: &str, path: &str) -> RegistryResult<bool> {
        let rows = self.conn.execute(
            "DELETE FROM extracts WHERE manifest_uid = ? AND path = ?",
            params![manifest_uid, path],
        )?;
        Ok(rows > 0)
    }
}

/// Merge incoming data fields over an existing blob, field by field.
fn merge_data(existing: &mut TableData, incoming: TableData) {
    if incoming.sql.is_some() {
        existing.sql = incoming.sql;
    }
    if incoming.updated.is_some() {
        existing.updated = incoming.updated;
    }
    if !incoming.tc_names.is_empty() {
        existing.tc_names = incoming.tc_names;
    }
    if incoming.sample.is_some() {
        existing.sample = incoming.sample;
    }
    if incoming.count.is_some() {
        existing.count = incoming.count;
    }
    for name in incoming.installed_names {
        if !existing.installed_names.contains(&name) {
            existing.installed_names.push(name);
        }
    }
    if incoming.summary.is_some() {
        existing.summary = incoming.summary;
    }
    if incoming.source_partition.is_some() {
        existing.source_partition = incoming.source_partition;
    }
}
