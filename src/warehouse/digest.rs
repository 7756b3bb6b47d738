//! Manifest digestion.
//!
//! Digestion walks a manifest's sections in file order and produces a linear
//! command list, resolving every catalog reference eagerly so execution
//! never blocks on resolution. No database writes happen here; a digested
//! manifest can be inspected as a dry run before any mutation.

use tracing::{info, warn};

use super::ResolutionError;
use crate::identity::PartitionRef;
use crate::library::Library;
use crate::manifest::{ExtractDecl, Manifest, Section, SectionContent, SectionTag};
use crate::registry::SchemaRegistry;
use crate::sql::{Dialect, SqlDialect};

/// One executable installation step.
///
/// Commands are transient: they exist only to decouple reference resolution
/// from execution and are never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Record manifest title/summary on the warehouse.
    About {
        title: Option<String>,
        summary: Option<String>,
    },
    /// Copy a resolved partition's tables into the warehouse.
    Install {
        partition: PartitionRef,
        tables: Vec<String>,
        where_clause: Option<String>,
        /// Reload even when the partition is already marked installed.
        force: bool,
    },
    /// Execute one raw statement.
    Sql { statement: String },
    /// Create an index.
    Index {
        name: String,
        table: String,
        columns: Vec<String>,
    },
    /// Install or refresh a plain view.
    View {
        name: String,
        sql: String,
        tc_names: Vec<String>,
        summary: Option<String>,
    },
    /// Install or refresh a materialized view.
    MView {
        name: String,
        sql: String,
        tc_names: Vec<String>,
        summary: Option<String>,
        force: bool,
    },
    /// Register an extract job for downstream documentation tooling.
    Extract {
        path: String,
        manifest_uid: String,
        descriptor: ExtractDecl,
    },
}

/// Result of digesting one manifest.
#[derive(Debug, Default)]
pub struct Digest {
    pub commands: Vec<Command>,
    /// References that failed to resolve; their commands were dropped,
    /// digestion of the rest continued.
    pub unresolved: Vec<ResolutionError>,
}

/// Turns manifests into command lists.
pub struct Digester<'w> {
    registry: &'w SchemaRegistry,
    library: &'w dyn Library,
    dialect: Dialect,
}

impl<'w> Digester<'w> {
    pub fn new(registry: &'w SchemaRegistry, library: &'w dyn Library, dialect: Dialect) -> Self {
        Self {
            registry,
            library,
            dialect,
        }
    }

    /// Digest a manifest into commands, in section order.
    ///
    /// With `force`, already-installed partitions are re-emitted and mviews
    /// rebuild unconditionally.
    pub fn digest(&self, manifest: &Manifest, force: bool) -> Digest {
        let mut digest = Digest::default();

        digest.commands.push(Command::About {
            title: manifest.title.clone(),
            summary: manifest.summary.clone(),
        });

        for section in &manifest.sections {
            self.digest_section(manifest, section, force, &mut digest);
        }

        digest
    }

    fn digest_section(
        &self,
        manifest: &Manifest,
        section: &Section,
        force: bool,
        digest: &mut Digest,
    ) {
        match (section.tag, &section.content) {
            (SectionTag::Partitions, SectionContent::Partitions(decls)) => {
                info!(
                    manifest = %manifest.uid,
                    line = section.linenumber,
                    "processing partitions section"
                );
                for decl in decls {
                    match self.digest_partition(decl, force) {
                        Ok(Some(command)) => digest.commands.push(command),
                        Ok(None) => {}
                        Err(e) => {
                            digest.unresolved.push(e);
                        }
                    }
                }
            }

            (SectionTag::Sql, SectionContent::Sql(variants)) => {
                // Only the configured backend's variant survives digestion.
                if let Some(statement) = variants.get(self.dialect.name()) {
                    digest.commands.push(Command::Sql {
                        statement: statement.clone(),
                    });
                }
            }

            (SectionTag::Index, SectionContent::Index(decl)) => {
                digest.commands.push(Command::Index {
                    name: decl.name.clone(),
                    table: decl.table.clone(),
                    columns: decl.columns.clone(),
                });
            }

            (SectionTag::View, SectionContent::View(body)) => {
                digest.commands.push(Command::View {
                    name: section.args.first().cloned().unwrap_or_default(),
                    sql: body.text.clone(),
                    tc_names: body.tc_names.clone(),
                    summary: section.doc.clone(),
                });
            }

            (SectionTag::MView, SectionContent::MView(body)) => {
                digest.commands.push(Command::MView {
                    name: section.args.first().cloned().unwrap_or_default(),
                    sql: body.text.clone(),
                    tc_names: body.tc_names.clone(),
                    summary: section.doc.clone(),
                    force,
                });
            }

            (SectionTag::Extract, SectionContent::Extract(decl)) => {
                digest.commands.push(Command::Extract {
                    path: format!("extracts/{}", decl.rpath),
                    manifest_uid: manifest.uid.clone(),
                    descriptor: decl.clone(),
                });
            }

            (SectionTag::Include, SectionContent::Include(included)) => {
                // Splice the included manifest's commands in place, minus its
                // own About header.
                let inner = self.digest(included, force);
                digest
                    .commands
                    .extend(inner.commands.into_iter().filter(|c| !matches!(c, Command::About { .. })));
                digest.unresolved.extend(inner.unresolved);
            }

            (tag, _) => {
                warn!(
                    tag = tag.as_str(),
                    line = section.linenumber,
                    "section content does not match its tag; skipped"
                );
            }
        }
    }

    fn digest_partition(
        &self,
        decl: &crate::manifest::PartitionDecl,
        force: bool,
    ) -> Result<Option<Command>, ResolutionError> {
        let resolved = self
            .library
            .resolve(&decl.partition)
            .ok_or_else(|| ResolutionError::Unresolved(decl.partition.clone()))?;

        let partition = resolved
            .partition
            .ok_or_else(|| ResolutionError::NotAPartition(decl.partition.clone()))?;

        if !partition.format.is_installable() {
            warn!(
                partition = %partition.vname,
                format = partition.format.as_str(),
                "skipping partition; uninstallable format"
            );
            return Ok(None);
        }

        // Idempotent skip: a partition already marked installed emits nothing
        // unless the caller demands force.
        if !force {
            if let Ok(Some(record)) = self.registry.partition(&partition.vid) {
                if record.installed {
                    info!(partition = %record.vname, "skipping; already installed");
                    return Ok(None);
                }
            }
        }

        Ok(Some(Command::Install {
            partition,
            tables: decl.tables.clone(),
            where_clause: decl.where_clause.clone(),
            force,
        }))
    }
}
