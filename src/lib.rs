//! # Granary
//!
//! Packages versioned tabular datasets and assembles them into queryable
//! relational warehouses.
//!
//! ## Architecture
//!
//! Installing a manifest is a two-phase interpretation over a small command
//! language:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Manifest (sections, in file order)            │
//! │  (partitions, sql, index, view, mview, extract, include) │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [digester: resolves references eagerly]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Command list                            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [executor: strict declaration order]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Warehouse database + Schema Registry              │
//! │   (loaded partitions, views, mviews, lineage records)    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [finalizer]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Alias views, union views, cached samples/counts      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Execution is single-threaded and synchronous; commands run in manifest
//! declaration order, and dependency ordering between views is the manifest
//! author's contract. Partial installs are intentional: a failing command
//! leaves the effects of earlier commands in place, and re-running a
//! manifest is safe because every step checks for existing work first.

pub mod backend;
pub mod config;
pub mod identity;
pub mod library;
pub mod manifest;
pub mod registry;
pub mod sql;
pub mod warehouse;

// Re-export SQL submodules at crate level for convenience
pub use sql::dialect;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::backend::{DbBackend, SqliteBackend, SqlValue};
    pub use crate::config::{BackendConfig, Driver, Settings};
    pub use crate::identity::{PartitionFormat, PartitionRef, ResolvedRef};
    pub use crate::library::{
        CatalogColumn, CatalogTable, Library, MemoryLibrary, MemoryPartition,
    };
    pub use crate::manifest::{Manifest, PartitionDecl, Section, SectionTag};
    pub use crate::registry::{SchemaRegistry, TableKind};
    pub use crate::sql::{Dialect, SqlDialect};
    pub use crate::warehouse::{
        Digester, Executor, Finalizer, InstallReport, RebuildPolicy, Warehouse, WarehouseError,
    };
}

// Also export at crate root for convenience
pub use manifest::Manifest;
pub use registry::SchemaRegistry;
pub use warehouse::{Warehouse, WarehouseError};
