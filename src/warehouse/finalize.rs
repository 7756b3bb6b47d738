//! Post-install finalization.
//!
//! Runs once per manifest install, after every command has executed:
//! registers a vid-keyed alias record for each installed base table,
//! accumulates derived names into `installed_names`, caches row samples and
//! counts, and installs the union view that presents all physical copies of
//! a logical table under one name.

use tracing::info;

use super::execute::Executor;
use super::WarehouseError;
use crate::backend::{DbBackend, SqlValue};
use crate::registry::{InstallTable, SchemaRegistry, TableKind, TableRecord};
use crate::sql::SqlDialect;

const SAMPLE_LIMIT: u64 = 20;

/// Finalizes a manifest install.
pub struct Finalizer<'w> {
    backend: &'w dyn DbBackend,
    registry: &'w SchemaRegistry,
    executor: &'w Executor<'w>,
    warehouse_vid: &'w str,
}

impl<'w> Finalizer<'w> {
    pub fn new(
        backend: &'w dyn DbBackend,
        registry: &'w SchemaRegistry,
        executor: &'w Executor<'w>,
        warehouse_vid: &'w str,
    ) -> Self {
        Self {
            backend,
            registry,
            executor,
            warehouse_vid,
        }
    }

    pub fn post_install(&self) -> Result<(), WarehouseError> {
        let base_vids: Vec<String> = self
            .registry
            .tables()?
            .into_iter()
            .filter(|t| Self::is_base_table(t))
            .map(|t| t.vid)
            .collect();

        // Every installed base table gets a stable, version-qualified access
        // name: an alias record keyed by the table vid.
        for vid in &base_vids {
            self.registry.install_table(
                self.warehouse_vid,
                vid,
                InstallTable {
                    kind: Some(TableKind::Alias),
                    proto_vid: Some(vid.clone()),
                    ..Default::default()
                },
            )?;
        }

        // Track every physical copy and alias of each logical table.
        for vid in &base_vids {
            for derived in self.registry.derived_tables(vid)? {
                self.registry.add_installed_name(vid, &derived.name)?;
            }
        }

        // Cache a sample and row count for anything that lacks one.
        for table in self.registry.tables()? {
            let wants_sample = Self::is_base_table(&table)
                || matches!(table.kind, TableKind::View | TableKind::MView);
            if wants_sample && table.data.sample.is_none() {
                self.build_sample(&table)?;
            }
        }

        self.install_unions(&base_vids)?;

        Ok(())
    }

    fn is_base_table(t: &TableRecord) -> bool {
        t.kind == TableKind::Table && t.installed && t.proto_vid.is_none()
    }

    /// Cache a `LIMIT 20` sample (header row first) and a row count.
    fn build_sample(&self, table: &TableRecord) -> Result<(), WarehouseError> {
        // Base tables are logical; sample their first physical copy.
        let name = if Self::is_base_table(table) {
            match table.data.installed_names.first() {
                Some(name) => name.clone(),
                None => return Ok(()),
            }
        } else {
            table.name.clone()
        };

        let dialect = self.backend.dialect().dialect();
        let sample_rows = self
            .backend
            .query_rows(&dialect.sample_sql(&name, SAMPLE_LIMIT))?;

        let mut sample: Vec<Vec<serde_json::Value>> = Vec::with_capacity(sample_rows.rows.len() + 1);
        sample.push(
            sample_rows
                .columns
                .iter()
                .map(|c| serde_json::Value::from(c.clone()))
                .collect(),
        );
        for row in &sample_rows.rows {
            sample.push(row.iter().map(SqlValue::to_json).collect());
        }

        let count_rows = self.backend.query_rows(&dialect.count_sql(&name))?;
        let count = match count_rows.rows.first().and_then(|r| r.first()) {
            Some(SqlValue::Integer(n)) => *n,
            _ => 0,
        };

        let mut data = table.data.clone();
        data.sample = Some(sample);
        data.count = Some(count);
        self.registry.save_table_data(&table.vid, &data)?;

        info!(table = %table.name, rows = count, "cached sample");
        Ok(())
    }

    /// Present all physical copies of each logical table under one view
    /// named by the table vid.
    ///
    /// A single copy is aliased directly; several copies are unioned.
    fn install_unions(&self, base_vids: &[String]) -> Result<(), WarehouseError> {
        let dialect = self.backend.dialect().dialect();

        for vid in base_vids {
            let physical: Vec<String> = self
                .registry
                .derived_tables(vid)?
                .into_iter()
                .filter(|t| t.kind == TableKind::Table && t.installed)
                .map(|t| t.name)
                .collect();

            if physical.is_empty() {
                continue;
            }

            self.executor.install_view(
                vid,
                &dialect.union_sql(&physical),
                TableKind::Alias,
                Some(vid.clone()),
                &physical,
                None,
            )?;
        }

        Ok(())
    }
}
