//! In-process catalog backed by in-memory SQLite, for tests.

use std::collections::HashMap;

use rusqlite::{params_from_iter, Connection};

use super::{CatalogTable, Library, LibraryError, LibraryResult, PartitionSource};
use crate::backend::SqlValue;
use crate::identity::{PartitionRef, ResolvedRef};

/// One partition held by a [`MemoryLibrary`]: identity, catalog schema, and
/// source rows keyed by table name.
#[derive(Debug, Clone)]
pub struct MemoryPartition {
    pub identity: PartitionRef,
    pub tables: Vec<CatalogTable>,
    rows: HashMap<String, Vec<Vec<SqlValue>>>,
}

impl MemoryPartition {
    pub fn new(identity: PartitionRef, tables: Vec<CatalogTable>) -> Self {
        Self {
            identity,
            tables,
            rows: HashMap::new(),
        }
    }

    /// Attach source rows for one table, in catalog column order.
    pub fn with_rows(mut self, table: &str, rows: Vec<Vec<SqlValue>>) -> Self {
        self.rows.insert(table.to_string(), rows);
        self
    }
}

/// A catalog whose datasets and partitions live in process memory.
///
/// References resolve by partition vid, id or vname, or by any alias
/// registered with [`MemoryLibrary::with_ref`]. Dataset-level references
/// resolve to an identity without a partition.
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    partitions: Vec<MemoryPartition>,
    refs: HashMap<String, String>,
    datasets: HashMap<String, (String, String)>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partition(mut self, partition: MemoryPartition) -> Self {
        self.partitions.push(partition);
        self
    }

    /// Register an extra reference string resolving to a partition vid.
    pub fn with_ref(mut self, reference: &str, partition_vid: &str) -> Self {
        self.refs
            .insert(reference.to_string(), partition_vid.to_string());
        self
    }

    /// Register a dataset-only reference (resolves without a partition).
    pub fn with_dataset(mut self, reference: &str, vid: &str, id: &str) -> Self {
        self.datasets
            .insert(reference.to_string(), (vid.to_string(), id.to_string()));
        self
    }

    fn find(&self, vid: &str) -> Option<&MemoryPartition> {
        self.partitions.iter().find(|p| p.identity.vid == vid)
    }
}

impl Library for MemoryLibrary {
    fn resolve(&self, reference: &str) -> Option<ResolvedRef> {
        if let Some((vid, id)) = self.datasets.get(reference) {
            return Some(ResolvedRef {
                dataset_vid: vid.clone(),
                dataset_id: id.clone(),
                partition: None,
            });
        }

        let vid = self.refs.get(reference).map(|s| s.as_str()).or_else(|| {
            self.partitions
                .iter()
                .find(|p| {
                    p.identity.vid == reference
                        || p.identity.id == reference
                        || p.identity.vname == reference
                })
                .map(|p| p.identity.vid.as_str())
        })?;

        let partition = self.find(vid)?;
        Some(ResolvedRef {
            dataset_vid: partition.identity.dataset_vid.clone(),
            dataset_id: partition.identity.dataset_id.clone(),
            partition: Some(partition.identity.clone()),
        })
    }

    fn open_partition(&self, vid: &str) -> LibraryResult<PartitionSource> {
        let partition = self
            .find(vid)
            .ok_or_else(|| LibraryError::PartitionNotFound(vid.to_string()))?;

        // Materialize the partition's rows into a fresh in-memory database
        // with the plain source column names.
        let conn = Connection::open_in_memory()?;
        for table in &partition.tables {
            let cols = table
                .columns
                .iter()
                .map(|c| format!("\"{}\"", c.name))
                .collect::<Vec<_>>()
                .join(", ");
            conn.execute_batch(&format!("CREATE TABLE \"{}\" ({})", table.name, cols))?;

            if let Some(rows) = partition.rows.get(&table.name) {
                let placeholders = vec!["?"; table.columns.len()].join(", ");
                let sql = format!("INSERT INTO \"{}\" VALUES ({})", table.name, placeholders);
                let mut stmt = conn.prepare(&sql)?;
                for row in rows {
                    stmt.execute(params_from_iter(row.iter().cloned().map(
                        |v| match v {
                            SqlValue::Null => rusqlite::types::Value::Null,
                            SqlValue::Integer(i) => rusqlite::types::Value::Integer(i),
                            SqlValue::Real(f) => rusqlite::types::Value::Real(f),
                            SqlValue::Text(s) => rusqlite::types::Value::Text(s),
                            SqlValue::Blob(b) => rusqlite::types::Value::Blob(b),
                        },
                    )))?;
                }
            }
        }

        Ok(PartitionSource::new(
            partition.identity.clone(),
            partition.tables.clone(),
            conn,
        ))
    }
}
