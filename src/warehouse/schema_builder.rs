//! Lineage and schema synthesis for created objects.
//!
//! After a table, view or mview is (re)created in the database, its registry
//! entry gets a fresh column set built from the live object. Columns whose
//! names carry a `{column_id}_` prefix are traced back to the canonical
//! catalog column and inherit its description, datatype and `derivedfrom`
//! link; columns added by hand in raw SQL get a best-effort entry inferred
//! from the observed value alone.

use tracing::{debug, info};

use crate::backend::{BackendError, DbBackend, SqlValue};
use crate::identity::split_column_name;
use crate::registry::{ColumnRecord, RegistryResult, SchemaRegistry, TableRecord};
use crate::sql::SqlDialect;

/// One live column observed on a created object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedColumn {
    pub name: String,
    /// Value from the sampled row; `None` when the object is empty.
    pub value: Option<SqlValue>,
}

/// Strategy for observing a created object's live columns.
///
/// The default samples a single row, which is fast and usually sufficient; a
/// stricter multi-row strategy can be substituted without touching the
/// executor.
pub trait SchemaInference {
    fn observe(
        &self,
        backend: &dyn DbBackend,
        table: &str,
    ) -> Result<Vec<ObservedColumn>, BackendError>;
}

/// Observe columns from `SELECT * ... LIMIT 1`.
#[derive(Debug, Default)]
pub struct SingleRowInference;

impl SchemaInference for SingleRowInference {
    fn observe(
        &self,
        backend: &dyn DbBackend,
        table: &str,
    ) -> Result<Vec<ObservedColumn>, BackendError> {
        let rows = backend.query_rows(&backend.dialect().dialect().sample_sql(table, 1))?;
        let first = rows.rows.first();

        Ok(rows
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| ObservedColumn {
                name: name.clone(),
                value: first.map(|row| row[i].clone()),
            })
            .collect())
    }
}

/// Builds registry column entries for created objects.
pub struct SchemaBuilder<'w> {
    backend: &'w dyn DbBackend,
    registry: &'w SchemaRegistry,
    inference: &'w dyn SchemaInference,
}

impl<'w> SchemaBuilder<'w> {
    pub fn new(
        backend: &'w dyn DbBackend,
        registry: &'w SchemaRegistry,
        inference: &'w dyn SchemaInference,
    ) -> Self {
        Self {
            backend,
            registry,
            inference,
        }
    }

    /// Rebuild the registered columns of `table` from its live shape.
    pub fn build_schema(&self, table: &TableRecord) -> RegistryResult<()> {
        self.registry.delete_columns(&table.vid)?;

        let observed = match self.inference.observe(self.backend, &table.name) {
            Ok(observed) => observed,
            Err(e) => {
                // An object that cannot be sampled keeps an empty column set.
                info!(table = %table.name, error = %e, "schema introspection failed");
                return Ok(());
            }
        };

        for (i, column) in observed.iter().enumerate() {
            let sequence_id = (i + 1) as i64;
            let record = match self.trace(column)? {
                Some(record) => ColumnRecord {
                    t_vid: table.vid.clone(),
                    sequence_id,
                    ..record
                },
                None => self.synthesize(table, column, sequence_id),
            };
            self.registry.upsert_column(&record)?;
        }

        debug!(table = %table.name, columns = observed.len(), "schema rebuilt");
        Ok(())
    }

    /// Trace an observed column back to its canonical catalog column.
    fn trace(&self, column: &ObservedColumn) -> RegistryResult<Option<ColumnRecord>> {
        let Some((column_id, plain_name)) = split_column_name(&column.name) else {
            return Ok(None);
        };

        let Some(canonical) = self.registry.find_canonical_column(column_id)? else {
            return Ok(None);
        };

        let canonical_table = self.registry.find_table_by_vid(&canonical.t_vid)?;

        let description = match (
            canonical_table.as_ref().and_then(|t| t.description.as_deref()),
            canonical.description.as_deref(),
        ) {
            (Some(t), Some(c)) => Some(format!("{}; {}", t, c)),
            (Some(t), None) => Some(t.to_string()),
            (None, c) => c.map(|s| s.to_string()),
        };

        let datatype = canonical
            .datatype
            .clone()
            .or_else(|| observed_datatype(column));

        Ok(Some(ColumnRecord {
            t_vid: String::new(), // overwritten by the caller
            c_id: None,
            name: column.name.clone(),
            altname: Some(plain_name.to_string()),
            datatype,
            description,
            sequence_id: 0, // overwritten by the caller
            derivedfrom: Some(column_id.to_string()),
        }))
    }

    /// Best-effort entry for a column with no catalog origin.
    fn synthesize(
        &self,
        table: &TableRecord,
        column: &ObservedColumn,
        sequence_id: i64,
    ) -> ColumnRecord {
        ColumnRecord {
            t_vid: table.vid.clone(),
            c_id: None,
            name: column.name.clone(),
            altname: None,
            datatype: observed_datatype(column),
            description: None,
            sequence_id,
            derivedfrom: None,
        }
    }
}

fn observed_datatype(column: &ObservedColumn) -> Option<String> {
    column
        .value
        .as_ref()
        .and_then(|v| v.datatype())
        .map(|s| s.to_string())
}
