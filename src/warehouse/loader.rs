//! Partition row loader.
//!
//! Copies the rows of one partition table into a warehouse table in
//! fixed-size batches, one insert transaction per batch. Columns are matched
//! positionally by zipping the source and destination column lists, so the
//! destination DDL must declare columns in source order. Binary destination
//! columns pass through the backend's marshalling hook.

use tracing::{debug, info};

use crate::backend::{BackendError, DbBackend, SqlValue};
use crate::library::{LibraryError, PartitionSource};

/// Errors while streaming partition rows into the warehouse.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error(transparent)]
    Source(#[from] LibraryError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("column count mismatch copying {table}: source has {src_cols}, destination has {dest}")]
    ColumnMismatch {
        table: String,
        src_cols: usize,
        dest: usize,
    },
}

/// Streams partition rows into warehouse tables.
pub struct Loader<'w> {
    backend: &'w dyn DbBackend,
}

impl<'w> Loader<'w> {
    pub fn new(backend: &'w dyn DbBackend) -> Self {
        Self { backend }
    }

    /// Copy `source_table` from the partition into `dest_table`.
    ///
    /// Returns the destination name. Partially inserted batches are not
    /// rolled back here; the surrounding transaction boundary belongs to the
    /// caller.
    pub fn load(
        &self,
        source: &PartitionSource,
        source_table: &str,
        dest_table: &str,
        where_clause: Option<&str>,
    ) -> Result<String, LoaderError> {
        info!(
            partition = %source.identity.vname,
            table = source_table,
            dest = dest_table,
            "loading partition table"
        );

        let source_columns = source.columns(source_table)?;
        let dest_columns = self.backend.introspect_columns(dest_table)?;

        if source_columns.len() != dest_columns.len() {
            return Err(LoaderError::ColumnMismatch {
                table: source_table.to_string(),
                src_cols: source_columns.len(),
                dest: dest_columns.len(),
            });
        }

        let dest_names: Vec<String> = dest_columns.iter().map(|c| c.name.clone()).collect();
        let binary: Vec<bool> = dest_columns.iter().map(|c| c.is_binary()).collect();
        let batch_size = self.backend.insert_batch_size();

        let mut copied = 0usize;
        source.for_each_batch::<LoaderError, _>(
            source_table,
            where_clause,
            batch_size,
            |mut batch| {
                if binary.iter().any(|b| *b) {
                    for row in batch.iter_mut() {
                        for (i, value) in row.iter_mut().enumerate() {
                            if binary[i] && matches!(value, SqlValue::Blob(_)) {
                                let taken = std::mem::replace(value, SqlValue::Null);
                                *value = self.backend.marshal_binary(taken);
                            }
                        }
                    }
                }

                copied += batch.len();
                debug!(dest = dest_table, rows = batch.len(), "committing batch");
                self.backend.insert_batch(dest_table, &dest_names, &batch)?;
                Ok(())
            },
        )?;

        info!(dest = dest_table, rows = copied, "load complete");
        Ok(dest_table.to_string())
    }
}
