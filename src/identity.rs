//! Versioned object identities.
//!
//! Every object the warehouse touches carries a short prefixed id: datasets
//! (`d`), partitions (`p`), tables (`t`) and columns (`c`). A *vid* is an id
//! with a two-digit revision suffix, so `d3f9a2c4e1` at revision 1 is
//! `d3f9a2c4e101`. Column ids never contain an underscore, which lets
//! installed column names of the form `{column_id}_{plain_name}` be split
//! unambiguously on the first `_`.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Format a partition's installability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionFormat {
    /// Relational data, installable.
    Db,
    /// Geographic data, installable.
    Geo,
    /// Comma-separated source files, not installable.
    Csv,
    /// HDF5 source files, not installable.
    Hdf,
}

impl PartitionFormat {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "db" => Some(PartitionFormat::Db),
            "geo" => Some(PartitionFormat::Geo),
            "csv" => Some(PartitionFormat::Csv),
            "hdf" => Some(PartitionFormat::Hdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionFormat::Db => "db",
            PartitionFormat::Geo => "geo",
            PartitionFormat::Csv => "csv",
            PartitionFormat::Hdf => "hdf",
        }
    }

    /// Only `db` and `geo` partitions can be copied into a warehouse.
    pub fn is_installable(&self) -> bool {
        matches!(self, PartitionFormat::Db | PartitionFormat::Geo)
    }
}

/// A resolved reference: the owning dataset, plus the partition when the
/// reference named one.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRef {
    pub dataset_vid: String,
    pub dataset_id: String,
    pub partition: Option<PartitionRef>,
}

/// Identity of one partition as resolved by the external catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRef {
    /// Versioned partition id.
    pub vid: String,
    /// Unversioned partition id.
    pub id: String,
    /// Human-readable versioned name.
    pub vname: String,
    pub format: PartitionFormat,
    /// Aggregation-level qualifier, e.g. `county`.
    pub grain: Option<String>,
    pub dataset_vid: String,
    pub dataset_id: String,
    /// Source table names this partition carries.
    pub tables: Vec<String>,
}

impl PartitionRef {
    /// Installation name for one of this partition's tables, plus the shorter
    /// unversioned alias.
    ///
    /// The name is `{dataset_vid}_{table}` and the alias `{dataset_id}_{table}`,
    /// each suffixed with the grain when the partition has one.
    pub fn augmented_table_name(&self, table: &str) -> (String, String) {
        let mut name = format!("{}_{}", self.dataset_vid, table);
        let mut alias = format!("{}_{}", self.dataset_id, table);

        if let Some(grain) = &self.grain {
            name = format!("{}_{}", name, grain);
            alias = format!("{}_{}", alias, grain);
        }

        (name, alias)
    }
}

/// Derive the stable versioned id of a warehouse from its connection string.
///
/// The same DSN always yields the same vid, so re-opening a warehouse finds
/// its existing registry rows.
pub fn warehouse_vid(dsn: &str) -> String {
    format!("d{}01", short_hash(dsn))
}

/// Deterministic vid for a registry table record created by the warehouse
/// itself (views, mviews, aliases, installed copies). Derived from the owning
/// warehouse vid and the object name so re-installs converge on the same vid.
pub fn table_vid(d_vid: &str, name: &str) -> String {
    format!("t{}01", short_hash(&format!("{}:{}", d_vid, name)))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest.iter().take(5).map(|b| format!("{:02x}", b)).collect();
    hex
}

static COLUMN_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^c[0-9a-f]+$").expect("valid regex"));

/// Whether `s` has the shape of a column id (`c` followed by hex, no
/// underscore).
pub fn is_column_id(s: &str) -> bool {
    COLUMN_ID.is_match(s)
}

/// Split an installed column name into `(column_id, plain_name)`.
///
/// Returns `None` when the prefix before the first underscore is not a column
/// id, which is the case for columns added by hand in raw SQL.
pub fn split_column_name(name: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = name.split_once('_')?;
    if is_column_id(prefix) {
        Some((prefix, rest))
    } else {
        None
    }
}
