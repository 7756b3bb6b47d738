//! Warehouse manifest installation engine.
//!
//! A warehouse is one relational database plus one schema registry scoped to
//! it. Installing a manifest is a two-phase interpretation: the digester
//! resolves every reference and flattens the manifest into a command list,
//! then the executor runs the commands in declaration order against the live
//! database. A finalizer adds alias views, union views and cached samples
//! afterwards.
//!
//! There is no whole-manifest transaction: a failure partway leaves earlier
//! commands' effects in place, and re-running the same manifest is safe
//! because every step checks "already installed / SQL unchanged" before
//! doing work.

pub mod digest;
pub mod execute;
pub mod finalize;
pub mod lifecycle;
pub mod loader;
pub mod schema_builder;

pub use digest::{Command, Digest, Digester};
pub use execute::{Execution, Executor};
pub use finalize::Finalizer;
pub use lifecycle::RebuildPolicy;
pub use loader::{Loader, LoaderError};
pub use schema_builder::{SchemaBuilder, SchemaInference, SingleRowInference};

use std::collections::HashSet;

use tracing::{error, info};

use crate::backend::{BackendError, DbBackend};
use crate::identity;
use crate::library::{Library, LibraryError};
use crate::registry::{now_millis, PartitionRecord, RegistryError, SchemaRegistry};

/// A manifest reference that could not be resolved to the right kind of
/// catalog identity.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("library has no object for reference: {0}")]
    Unresolved(String),

    #[error("reference resolves to a dataset, not a partition: {0}")]
    NotAPartition(String),
}

/// Errors from warehouse installation.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

/// Outcome of one manifest install.
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Vids of partitions this run installed.
    pub partitions: Vec<String>,
    /// Logical names of tables this run installed.
    pub tables: Vec<String>,
    /// References that failed to resolve during digestion.
    pub unresolved: Vec<ResolutionError>,
}

/// One relational database plus the schema registry scoped to it.
///
/// A warehouse serves exactly one in-flight install at a time; callers
/// serialize concurrent installs.
pub struct Warehouse {
    backend: Box<dyn DbBackend>,
    registry: SchemaRegistry,
    library: Box<dyn Library>,
    inference: Box<dyn SchemaInference>,
    vid: String,
}

impl Warehouse {
    /// Open a warehouse over its database, registry and catalog, creating
    /// the registry identity rows on first open.
    pub fn open(
        backend: Box<dyn DbBackend>,
        registry: SchemaRegistry,
        library: Box<dyn Library>,
    ) -> Result<Self, WarehouseError> {
        Self::open_with_inference(backend, registry, library, Box::new(SingleRowInference))
    }

    /// Open with a substitute schema-inference strategy.
    pub fn open_with_inference(
        backend: Box<dyn DbBackend>,
        registry: SchemaRegistry,
        library: Box<dyn Library>,
        inference: Box<dyn SchemaInference>,
    ) -> Result<Self, WarehouseError> {
        let vid = identity::warehouse_vid(backend.dsn());

        let warehouse = Self {
            backend,
            registry,
            library,
            inference,
            vid,
        };
        warehouse.create()?;
        Ok(warehouse)
    }

    /// Record the warehouse identity in its registry.
    fn create(&self) -> Result<(), WarehouseError> {
        if self.registry.meta_get("uid")?.is_none() {
            self.registry.meta_set("uid", &self.vid)?;
            self.registry.meta_set("dsn", self.backend.dsn())?;
            self.registry
                .meta_set("created", &now_millis().to_string())?;
        }
        Ok(())
    }

    /// Stable versioned id of this warehouse, derived from its DSN.
    pub fn vid(&self) -> &str {
        &self.vid
    }

    pub fn dsn(&self) -> &str {
        self.backend.dsn()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &dyn DbBackend {
        self.backend.as_ref()
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn title(&self) -> Result<Option<String>, WarehouseError> {
        Ok(self.registry.meta_get("title")?)
    }

    pub fn set_title(&self, title: &str) -> Result<(), WarehouseError> {
        Ok(self.registry.meta_set("title", title)?)
    }

    pub fn summary(&self) -> Result<Option<String>, WarehouseError> {
        Ok(self.registry.meta_get("summary")?)
    }

    pub fn set_summary(&self, summary: &str) -> Result<(), WarehouseError> {
        Ok(self.registry.meta_set("summary", summary)?)
    }

    pub fn name(&self) -> Result<Option<String>, WarehouseError> {
        Ok(self.registry.meta_get("name")?)
    }

    pub fn set_name(&self, name: &str) -> Result<(), WarehouseError> {
        Ok(self.registry.meta_set("name", name)?)
    }

    pub fn url(&self) -> Result<Option<String>, WarehouseError> {
        Ok(self.registry.meta_get("url")?)
    }

    pub fn set_url(&self, url: &str) -> Result<(), WarehouseError> {
        Ok(self.registry.meta_set("url", url)?)
    }

    // =========================================================================
    // Installation
    // =========================================================================

    /// Digest a manifest without touching the database, for dry-run
    /// validation.
    pub fn digest_manifest(&self, manifest: &crate::manifest::Manifest, force: bool) -> Digest {
        Digester::new(&self.registry, self.library.as_ref(), self.backend.dialect())
            .digest(manifest, force)
    }

    /// Install the partitions and derived SQL objects a manifest describes.
    pub fn install_manifest(
        &self,
        manifest: &crate::manifest::Manifest,
        force: bool,
    ) -> Result<InstallReport, WarehouseError> {
        info!(manifest = %manifest.uid, "installing manifest");

        // Snapshot the extract paths currently linked to this manifest; any
        // not re-emitted by this run are swept afterwards.
        let previously_linked: HashSet<String> =
            self.registry.extract_paths(&manifest.uid)?.into_iter().collect();

        self.registry.upsert_manifest(
            &manifest.uid,
            manifest.title.as_deref(),
            manifest.summary.as_deref(),
        )?;

        let digest = self.digest_manifest(manifest, force);
        for unresolved in &digest.unresolved {
            error!(manifest = %manifest.uid, error = %unresolved, "reference did not resolve");
        }

        let executor = Executor::new(
            self.backend.as_ref(),
            &self.registry,
            self.library.as_ref(),
            self.inference.as_ref(),
            &self.vid,
        );
        let execution = executor.execute(&digest.commands)?;

        // Link everything this run installed back to the manifest.
        for p_vid in &execution.partitions {
            self.registry.link_manifest_partition(&manifest.uid, p_vid)?;
        }
        for table_name in &execution.tables {
            if let Some(table) = self.registry.find_table_by_name(table_name)? {
                self.registry.link_manifest_table(&manifest.uid, &table.vid)?;
            }
        }

        // Sweep extract records the manifest no longer declares: the
        // difference between what was linked before and what this digestion
        // emitted.
        let emitted: HashSet<String> = digest
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::Extract { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect();
        for stale in previously_linked.difference(&emitted) {
            self.registry.delete_extract(&manifest.uid, stale)?;
            info!(manifest = %manifest.uid, path = stale.as_str(), "swept stale extract");
        }

        self.registry
            .meta_set(&format!("installed:{}", manifest.uid), &now_millis().to_string())?;

        Finalizer::new(self.backend.as_ref(), &self.registry, &executor, &self.vid)
            .post_install()?;

        Ok(InstallReport {
            partitions: execution.partitions,
            tables: execution.tables,
            unresolved: digest.unresolved,
        })
    }

    // =========================================================================
    // Removal and listing
    // =========================================================================

    /// Drop a partition's installed tables, or every partition of a dataset.
    pub fn remove(&self, reference: &str) -> Result<(), WarehouseError> {
        let Some(resolved) = self.library.resolve(reference) else {
            error!(reference, "failed to find partition or dataset by reference");
            return Err(WarehouseError::NotFound(reference.to_string()));
        };

        match resolved.partition {
            Some(partition) => {
                info!(partition = %partition.vname, "dropping installed tables");
                for table_name in &partition.tables {
                    let (dest_name, alias) = partition.augmented_table_name(table_name);

                    self.backend.drop_table(&dest_name)?;
                    self.backend.drop_view(&alias)?;
                    info!(table = %dest_name, "dropped table");

                    for name in [dest_name, alias] {
                        if let Some(record) = self.registry.find_table_by_name(&name)? {
                            self.registry.remove_table(&record.vid)?;
                        }
                    }
                }
                self.registry.remove_partition(&partition.vid)?;
            }
            None => {
                // Dataset reference: remove each of its partitions in turn.
                for record in self.registry.dataset_partitions(&resolved.dataset_vid)? {
                    self.remove(&record.vid)?;
                }
            }
        }

        Ok(())
    }

    /// Identities of every partition installed in this warehouse.
    pub fn list(&self) -> Result<Vec<PartitionRecord>, WarehouseError> {
        Ok(self.registry.installed_partitions()?)
    }
}
