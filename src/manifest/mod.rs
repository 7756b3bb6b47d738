//! Manifest documents.
//!
//! A manifest is an ordered sequence of tagged sections describing what to
//! install into a warehouse and which derived SQL objects to build. Section
//! order is semantically significant: objects must be declared after the
//! tables and views they read, and the installer executes in declaration
//! order without inferring a dependency graph.
//!
//! The text parser that produces [`Section`] values from a manifest file is
//! an external collaborator; this module only models the parsed stream.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Tag of one manifest section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionTag {
    Partitions,
    Sql,
    Index,
    View,
    MView,
    Extract,
    Include,
}

impl SectionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionTag::Partitions => "partitions",
            SectionTag::Sql => "sql",
            SectionTag::Index => "index",
            SectionTag::View => "view",
            SectionTag::MView => "mview",
            SectionTag::Extract => "extract",
            SectionTag::Include => "include",
        }
    }
}

/// One partition line of a `partitions` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionDecl {
    /// Reference to resolve against the catalog.
    pub partition: String,
    /// Source tables to install; empty means every table the partition has.
    pub tables: Vec<String>,
    /// Optional row restriction, applied when a single table is named.
    pub where_clause: Option<String>,
}

impl PartitionDecl {
    pub fn new(partition: &str) -> Self {
        Self {
            partition: partition.to_string(),
            tables: Vec::new(),
            where_clause: None,
        }
    }

    pub fn with_tables(mut self, tables: &[&str]) -> Self {
        self.tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_where(mut self, clause: &str) -> Self {
        self.where_clause = Some(clause.to_string());
        self
    }
}

/// An `index` section body.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDecl {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

/// A `view`/`mview` section body: the SELECT text plus the table and view
/// names it references.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewBody {
    pub text: String,
    pub tc_names: Vec<String>,
}

impl ViewBody {
    /// Build a view body, extracting referenced names from the SQL text.
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            tc_names: table_refs(text),
        }
    }
}

/// An `extract` section body.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractDecl {
    /// Table or view to extract.
    pub table: String,
    /// Output format, e.g. `csv`.
    pub format: String,
    /// Output path relative to the extract root.
    pub rpath: String,
}

impl ExtractDecl {
    pub fn descriptor(&self) -> serde_json::Value {
        serde_json::json!({
            "table": self.table,
            "format": self.format,
            "rpath": self.rpath,
        })
    }
}

/// Body of one section, tagged by section kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionContent {
    Partitions(Vec<PartitionDecl>),
    /// Statement variants keyed by dialect name; only the configured
    /// backend's variant is executed.
    Sql(HashMap<String, String>),
    Index(IndexDecl),
    View(ViewBody),
    MView(ViewBody),
    Extract(ExtractDecl),
    Include(Box<Manifest>),
}

/// One parsed manifest section.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub tag: SectionTag,
    /// Positional arguments from the section header, e.g. a view name.
    pub args: Vec<String>,
    pub content: SectionContent,
    /// Free-text documentation attached to the section.
    pub doc: Option<String>,
    /// Line the section started on, for diagnostics.
    pub linenumber: usize,
}

impl Section {
    pub fn partitions(decls: Vec<PartitionDecl>) -> Self {
        Self {
            tag: SectionTag::Partitions,
            args: Vec::new(),
            content: SectionContent::Partitions(decls),
            doc: None,
            linenumber: 0,
        }
    }

    pub fn sql(variants: &[(&str, &str)]) -> Self {
        Self {
            tag: SectionTag::Sql,
            args: Vec::new(),
            content: SectionContent::Sql(
                variants
                    .iter()
                    .map(|(d, s)| (d.to_string(), s.to_string()))
                    .collect(),
            ),
            doc: None,
            linenumber: 0,
        }
    }

    pub fn index(name: &str, table: &str, columns: &[&str]) -> Self {
        Self {
            tag: SectionTag::Index,
            args: vec![name.to_string()],
            content: SectionContent::Index(IndexDecl {
                name: name.to_string(),
                table: table.to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
            }),
            doc: None,
            linenumber: 0,
        }
    }

    pub fn view(name: &str, sql: &str) -> Self {
        Self {
            tag: SectionTag::View,
            args: vec![name.to_string()],
            content: SectionContent::View(ViewBody::new(sql)),
            doc: None,
            linenumber: 0,
        }
    }

    pub fn mview(name: &str, sql: &str) -> Self {
        Self {
            tag: SectionTag::MView,
            args: vec![name.to_string()],
            content: SectionContent::MView(ViewBody::new(sql)),
            doc: None,
            linenumber: 0,
        }
    }

    pub fn extract(table: &str, format: &str, rpath: &str) -> Self {
        Self {
            tag: SectionTag::Extract,
            args: vec![table.to_string()],
            content: SectionContent::Extract(ExtractDecl {
                table: table.to_string(),
                format: format.to_string(),
                rpath: rpath.to_string(),
            }),
            doc: None,
            linenumber: 0,
        }
    }

    pub fn include(manifest: Manifest) -> Self {
        Self {
            tag: SectionTag::Include,
            args: Vec::new(),
            content: SectionContent::Include(Box::new(manifest)),
            doc: None,
            linenumber: 0,
        }
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }

    pub fn at_line(mut self, linenumber: usize) -> Self {
        self.linenumber = linenumber;
        self
    }
}

/// A parsed manifest document.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Stable identity; links installed objects back to this manifest.
    pub uid: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub sections: Vec<Section>,
}

impl Manifest {
    /// Build a manifest with a fresh uid.
    pub fn new(sections: Vec<Section>) -> Self {
        Self {
            uid: uuid::Uuid::new_v4().to_string(),
            title: None,
            summary: None,
            sections,
        }
    }

    /// Build a manifest with a caller-supplied uid, for re-installs.
    pub fn with_uid(uid: &str, sections: Vec<Section>) -> Self {
        Self {
            uid: uid.to_string(),
            title: None,
            summary: None,
            sections,
        }
    }

    pub fn titled(mut self, title: &str, summary: &str) -> Self {
        self.title = Some(title.to_string());
        self.summary = Some(summary.to_string());
        self
    }
}

static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+["']?([A-Za-z_][A-Za-z0-9_.]*)["']?"#)
        .expect("valid regex")
});

/// Extract the table and view names a SQL body textually references.
///
/// This is a lexical scan of FROM/JOIN targets, not a SQL parse; it exists to
/// seed freshness propagation, so false negatives only cost a skipped
/// rebuild signal.
pub fn table_refs(sql: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for capture in TABLE_REF.captures_iter(sql) {
        let name = capture[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_refs_from_and_join() {
        let refs = table_refs(
            "SELECT a.x, b.y FROM sales a JOIN regions b ON a.r = b.id WHERE a.x > 0",
        );
        assert_eq!(refs, vec!["sales", "regions"]);
    }

    #[test]
    fn test_table_refs_quoted_and_deduplicated() {
        let refs = table_refs("SELECT * FROM \"d01_sales\" UNION SELECT * FROM \"d01_sales\"");
        assert_eq!(refs, vec!["d01_sales"]);
    }

    #[test]
    fn test_table_refs_none() {
        assert!(table_refs("SELECT 1").is_empty());
    }

    #[test]
    fn test_view_body_captures_tc_names() {
        let body = ViewBody::new("SELECT * FROM sales");
        assert_eq!(body.tc_names, vec!["sales"]);
    }

    #[test]
    fn test_manifest_uid_defaults_to_fresh() {
        let a = Manifest::new(vec![]);
        let b = Manifest::new(vec![]);
        assert_ne!(a.uid, b.uid);

        let c = Manifest::with_uid("m01", vec![]);
        assert_eq!(c.uid, "m01");
    }

    #[test]
    fn test_section_builders() {
        let s = Section::view("v1", "SELECT * FROM sales").with_doc("Totals").at_line(12);
        assert_eq!(s.tag, SectionTag::View);
        assert_eq!(s.args, vec!["v1"]);
        assert_eq!(s.linenumber, 12);
        assert_eq!(s.doc.as_deref(), Some("Totals"));
    }
}
