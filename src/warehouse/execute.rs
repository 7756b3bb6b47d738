//! Command execution.
//!
//! Interprets a digested command list against the live database and the
//! schema registry, strictly in list order. List order is manifest order, so
//! dependency ordering is the manifest author's responsibility. A fatal
//! error aborts the remaining commands; effects of commands already executed
//! stay in place.

use tracing::{error, info};

use super::digest::Command;
use super::lifecycle::RebuildPolicy;
use super::loader::Loader;
use super::schema_builder::{SchemaBuilder, SchemaInference};
use super::WarehouseError;
use crate::backend::DbBackend;
use crate::identity::PartitionRef;
use crate::library::Library;
use crate::registry::{now_millis, InstallTable, SchemaRegistry, TableData, TableKind};
use crate::sql::SqlDialect;

/// What one execution pass installed.
#[derive(Debug, Default)]
pub struct Execution {
    /// Vids of partitions installed by this pass.
    pub partitions: Vec<String>,
    /// Logical names of tables installed by this pass.
    pub tables: Vec<String>,
}

/// Executes command lists against the warehouse.
pub struct Executor<'w> {
    backend: &'w dyn DbBackend,
    registry: &'w SchemaRegistry,
    library: &'w dyn Library,
    inference: &'w dyn SchemaInference,
    warehouse_vid: &'w str,
}

impl<'w> Executor<'w> {
    pub fn new(
        backend: &'w dyn DbBackend,
        registry: &'w SchemaRegistry,
        library: &'w dyn Library,
        inference: &'w dyn SchemaInference,
        warehouse_vid: &'w str,
    ) -> Self {
        Self {
            backend,
            registry,
            library,
            inference,
            warehouse_vid,
        }
    }

    /// Execute commands in order, collecting what got installed.
    pub fn execute(&self, commands: &[Command]) -> Result<Execution, WarehouseError> {
        let mut execution = Execution::default();

        for command in commands {
            match command {
                Command::About { title, summary } => {
                    self.run_about(title.as_deref(), summary.as_deref())?;
                }

                Command::Install {
                    partition,
                    tables,
                    where_clause,
                    force,
                } => match self.install_partition(partition, tables, where_clause.as_deref(), *force)
                {
                    Ok(Some(installed)) => {
                        execution.tables.extend(installed);
                        execution.partitions.push(partition.vid.clone());
                    }
                    Ok(None) => {}
                    Err(WarehouseError::NotFound(reference)) => {
                        // Missing at execution time: skip this command, do not
                        // record an install, keep going.
                        error!(
                            partition = %partition.vname,
                            reference = %reference, "failed to install partition"
                        );
                    }
                    Err(e) => return Err(e),
                },

                Command::Sql { statement } => {
                    self.backend.execute(statement)?;
                }

                Command::Index {
                    name,
                    table,
                    columns,
                } => {
                    self.backend.create_index(name, table, columns)?;
                }

                Command::MView {
                    name,
                    sql,
                    tc_names,
                    summary,
                    force,
                } => {
                    self.install_material_view(name, sql, *force, tc_names, summary.as_deref())?;
                }

                Command::View {
                    name,
                    sql,
                    tc_names,
                    summary,
                } => {
                    self.install_view(
                        name,
                        sql,
                        TableKind::View,
                        None,
                        tc_names,
                        summary.as_deref(),
                    )?;
                }

                Command::Extract {
                    path,
                    manifest_uid,
                    descriptor,
                } => {
                    self.registry
                        .upsert_extract(manifest_uid, path, &descriptor.descriptor())?;
                }
            }
        }

        Ok(execution)
    }

    fn run_about(&self, title: Option<&str>, summary: Option<&str>) -> Result<(), WarehouseError> {
        if let Some(title) = title {
            if self.registry.meta_get("title")?.is_none() {
                self.registry.meta_set("title", title)?;
            }
        }
        if let Some(summary) = summary {
            if self.registry.meta_get("summary")?.is_none() {
                self.registry.meta_set("summary", summary)?;
            }
        }
        Ok(())
    }

    /// Install one partition: a warehouse table per requested source table,
    /// each with its short alias view and lineage records.
    ///
    /// Returns the logical (catalog) names of the tables installed, or
    /// `None` when the partition was already installed and the command is a
    /// no-op. A manifest can list the same partition twice; only the first
    /// occurrence does work.
    fn install_partition(
        &self,
        partition: &PartitionRef,
        tables: &[String],
        where_clause: Option<&str>,
        force: bool,
    ) -> Result<Option<Vec<String>>, WarehouseError> {
        if !force {
            if let Some(record) = self.registry.partition(&partition.vid)? {
                if record.installed {
                    info!(partition = %partition.vname, "already installed");
                    return Ok(None);
                }
            }
        }

        let source = self
            .library
            .open_partition(&partition.vid)
            .map_err(|_| WarehouseError::NotFound(partition.vid.clone()))?;

        self.registry.upsert_partition(partition)?;

        let requested: Vec<String> = if tables.is_empty() {
            partition.tables.clone()
        } else {
            tables.to_vec()
        };

        // A row restriction only applies when the manifest targets a single
        // table.
        let where_clause = if requested.len() == 1 { where_clause } else { None };

        let mut installed = Vec::new();

        for table_name in &requested {
            let Some(catalog) = source.table(table_name) else {
                info!(
                    partition = %partition.vname,
                    table = table_name.as_str(),
                    "source table not present in partition; skipped"
                );
                continue;
            };

            let (dest_name, alias) = partition.augmented_table_name(table_name);
            let dialect = self.backend.dialect().dialect();

            // A forced reload starts from an empty table.
            if force {
                self.backend.drop_table(&dest_name)?;
            }

            // Destination DDL declares the fully-qualified column names in
            // catalog order; the loader copies positionally.
            if !self.backend.has_table(&dest_name)? {
                let columns: Vec<(String, String)> = catalog
                    .columns
                    .iter()
                    .map(|c| (format!("{}_{}", c.id, c.name), c.datatype.clone()))
                    .collect();
                self.backend
                    .execute(&dialect.create_table_sql(&dest_name, &columns))?;
                info!(table = %dest_name, "created warehouse table");
            } else {
                info!(table = %dest_name, "warehouse table exists");
            }

            self.registry
                .install_proto_table(catalog, &partition.dataset_vid)?;

            Loader::new(self.backend).load(&source, table_name, &dest_name, where_clause)?;

            // Record the physical copy and link it to its canonical table.
            self.registry.install_table(
                self.warehouse_vid,
                &dest_name,
                InstallTable {
                    altname: Some(alias.clone()),
                    kind: Some(TableKind::Table),
                    proto_vid: Some(catalog.vid.clone()),
                    data: Some(TableData {
                        source_partition: Some(partition.vid.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )?;

            // The short alias reads through the physical table.
            self.install_view(
                &alias,
                &dialect.select_all_sql(&dest_name),
                TableKind::Alias,
                Some(catalog.vid.clone()),
                &[dest_name.clone()],
                None,
            )?;

            self.registry.mark_table_installed(&catalog.vid, &dest_name)?;
            installed.push(catalog.name.clone());
        }

        self.registry.mark_partition_installed(&partition.vid)?;

        Ok(Some(installed))
    }

    /// Install or refresh a plain view (or alias view).
    ///
    /// Unchanged SQL text is a no-op; otherwise the view object is dropped
    /// and recreated, and its lineage rebuilt.
    pub(super) fn install_view(
        &self,
        name: &str,
        sql: &str,
        kind: TableKind,
        proto_vid: Option<String>,
        tc_names: &[String],
        summary: Option<&str>,
    ) -> Result<(), WarehouseError> {
        if let Some(existing) = self.registry.find_table_by_name(name)? {
            if existing.data.sql.as_deref() == Some(sql) {
                info!(view = name, "skipping view; SQL unchanged");
                return Ok(());
            }
        }
        info!(view = name, "installing view");

        let dialect = self.backend.dialect().dialect();
        for statement in [
            dialect.drop_view_sql(name),
            dialect.create_view_sql(name, sql),
        ] {
            if let Err(e) = self.backend.execute(&statement) {
                error!(view = name, sql = %statement, "failed to install view");
                return Err(e.into());
            }
        }

        let record = self.registry.install_table(
            self.warehouse_vid,
            name,
            InstallTable {
                kind: Some(kind),
                proto_vid,
                description: summary.map(|s| s.to_string()),
                data: Some(TableData {
                    sql: Some(sql.to_string()),
                    updated: Some(now_millis()),
                    tc_names: tc_names.to_vec(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )?;

        // The previous sample no longer matches the recreated object.
        let mut data = record.data.clone();
        data.sample = None;
        data.count = None;
        self.registry.save_table_data(&record.vid, &data)?;

        SchemaBuilder::new(self.backend, self.registry, self.inference)
            .build_schema(&record)?;

        Ok(())
    }

    /// Install or refresh a materialized view as `CREATE TABLE AS`.
    fn install_material_view(
        &self,
        name: &str,
        sql: &str,
        force: bool,
        tc_names: &[String],
        summary: Option<&str>,
    ) -> Result<(), WarehouseError> {
        let rebuild = force || RebuildPolicy::new(self.registry).needs_rebuild(name, sql)?;
        if !rebuild {
            info!(mview = name, "skipping materialized view; update not required");
            return Ok(());
        }
        info!(mview = name, "installing materialized view");

        let dialect = self.backend.dialect().dialect();
        self.backend.drop_table(name)?;

        match self.backend.execute(&dialect.create_table_as_sql(name, sql)) {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                info!(mview = name, "materialized view already exists");
            }
            Err(e) => return Err(e.into()),
        }

        let record = self.registry.install_table(
            self.warehouse_vid,
            name,
            InstallTable {
                kind: Some(TableKind::MView),
                description: summary.map(|s| s.to_string()),
                data: Some(TableData {
                    sql: Some(sql.to_string()),
                    updated: Some(now_millis()),
                    tc_names: tc_names.to_vec(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )?;

        let mut data = record.data.clone();
        data.sample = None;
        data.count = None;
        self.registry.save_table_data(&record.vid, &data)?;

        SchemaBuilder::new(self.backend, self.registry, self.inference)
            .build_schema(&record)?;

        Ok(())
    }
}
