#[cfg(test)]
mod tests {
    use granary::backend::{DbBackend, SqlValue, SqliteBackend};
    use granary::identity::{PartitionFormat, PartitionRef};
    use granary::library::{CatalogColumn, CatalogTable, MemoryLibrary, MemoryPartition};
    use granary::manifest::{Manifest, PartitionDecl, Section};
    use granary::registry::{SchemaRegistry, TableKind};
    use granary::warehouse::Warehouse;

    const DATASET_VID: &str = "d0b0101";
    const DATASET_ID: &str = "d0b01";
    const TABLE_VID: &str = "t0b0201";
    const PARTITION_VID: &str = "p0b010101";

    fn sales_table() -> CatalogTable {
        CatalogTable {
            vid: TABLE_VID.to_string(),
            name: "sales".to_string(),
            description: Some("Sales totals".to_string()),
            columns: vec![
                CatalogColumn {
                    id: "c0b1".to_string(),
                    name: "id".to_string(),
                    datatype: "integer".to_string(),
                    description: None,
                    sequence_id: 1,
                },
                CatalogColumn {
                    id: "c0b2".to_string(),
                    name: "total".to_string(),
                    datatype: "real".to_string(),
                    description: Some("Sale total".to_string()),
                    sequence_id: 2,
                },
            ],
        }
    }

    fn sales_partition() -> MemoryPartition {
        let identity = PartitionRef {
            vid: PARTITION_VID.to_string(),
            id: "p0b0101".to_string(),
            vname: "example.com-sales-0.1.0".to_string(),
            format: PartitionFormat::Db,
            grain: None,
            dataset_vid: DATASET_VID.to_string(),
            dataset_id: DATASET_ID.to_string(),
            tables: vec!["sales".to_string()],
        };
        MemoryPartition::new(identity, vec![sales_table()]).with_rows(
            "sales",
            vec![
                vec![SqlValue::Integer(1), SqlValue::Real(10.0)],
                vec![SqlValue::Integer(2), SqlValue::Real(20.0)],
                vec![SqlValue::Integer(3), SqlValue::Real(30.0)],
            ],
        )
    }

    fn warehouse() -> Warehouse {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let backend = SqliteBackend::open_in_memory().unwrap();
        let registry = SchemaRegistry::open_in_memory().unwrap();
        let library = MemoryLibrary::new().with_partition(sales_partition());
        Warehouse::open(Box::new(backend), registry, Box::new(library)).unwrap()
    }

    fn count(w: &Warehouse, name: &str) -> i64 {
        let rows = w
            .backend()
            .query_rows(&format!("SELECT count(*) FROM \"{}\"", name))
            .unwrap();
        match rows.rows[0][0] {
            SqlValue::Integer(n) => n,
            _ => panic!("count did not return an integer"),
        }
    }

    fn sales_manifest(uid: &str) -> Manifest {
        Manifest::with_uid(
            uid,
            vec![
                Section::partitions(vec![
                    PartitionDecl::new(PARTITION_VID).with_tables(&["sales"])
                ]),
                Section::view("v1", "SELECT * FROM d0b01_sales"),
            ],
        )
    }

    #[test]
    fn test_install_partition_and_view() {
        let w = warehouse();
        let report = w.install_manifest(&sales_manifest("m01"), false).unwrap();

        assert_eq!(report.partitions, vec![PARTITION_VID]);
        assert_eq!(report.tables, vec!["sales"]);
        assert!(report.unresolved.is_empty());

        // Physical copy, loaded.
        assert_eq!(count(&w, "d0b0101_sales"), 3);
        // Short alias view reads the same rows.
        assert_eq!(count(&w, "d0b01_sales"), 3);
        // The view built over the alias.
        assert_eq!(count(&w, "v1"), 3);
        // Vid-keyed union view from post-install.
        assert_eq!(count(&w, TABLE_VID), 3);

        let registry = w.registry();

        let base = registry.find_table_by_name("sales").unwrap().unwrap();
        assert_eq!(base.kind, TableKind::Table);
        assert!(base.installed);
        assert!(base.proto_vid.is_none());
        assert!(base
            .data
            .installed_names
            .contains(&"d0b0101_sales".to_string()));

        let physical = registry.find_table_by_name("d0b0101_sales").unwrap().unwrap();
        assert_eq!(physical.kind, TableKind::Table);
        assert_eq!(physical.proto_vid.as_deref(), Some(TABLE_VID));
        assert_eq!(physical.altname.as_deref(), Some("d0b01_sales"));

        let alias = registry.find_table_by_name("d0b01_sales").unwrap().unwrap();
        assert_eq!(alias.kind, TableKind::Alias);
        assert_eq!(alias.proto_vid.as_deref(), Some(TABLE_VID));

        let view = registry.find_table_by_name("v1").unwrap().unwrap();
        assert_eq!(view.kind, TableKind::View);
        assert_eq!(view.data.sql.as_deref(), Some("SELECT * FROM d0b01_sales"));
        assert_eq!(view.data.tc_names, vec!["d0b01_sales"]);
        assert!(view.data.updated.is_some());

        // Lineage: view columns trace back to the catalog columns.
        let columns = registry.columns(&view.vid).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].derivedfrom.as_deref(), Some("c0b1"));
        assert_eq!(columns[1].derivedfrom.as_deref(), Some("c0b2"));
    }

    #[test]
    fn test_reinstall_is_idempotent() {
        let w = warehouse();
        let manifest = sales_manifest("m01");

        w.install_manifest(&manifest, false).unwrap();
        let tables_before = w.registry().tables().unwrap();
        let view_vid = w.registry().find_table_by_name("v1").unwrap().unwrap().vid;
        let columns_before = w.registry().columns(&view_vid).unwrap();

        let report = w.install_manifest(&manifest, false).unwrap();

        // Nothing new installed, no duplicate rows, no duplicate records.
        assert!(report.partitions.is_empty());
        assert!(report.tables.is_empty());
        assert_eq!(count(&w, "d0b0101_sales"), 3);

        let tables_after = w.registry().tables().unwrap();
        assert_eq!(tables_before.len(), tables_after.len());
        assert_eq!(columns_before, w.registry().columns(&view_vid).unwrap());
    }

    #[test]
    fn test_duplicate_partition_listing_is_noop() {
        let w = warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![Section::partitions(vec![
                PartitionDecl::new(PARTITION_VID),
                PartitionDecl::new(PARTITION_VID),
            ])],
        );

        let report = w.install_manifest(&manifest, false).unwrap();
        assert_eq!(report.partitions, vec![PARTITION_VID]);
        assert_eq!(count(&w, "d0b0101_sales"), 3);
    }

    #[test]
    fn test_force_reload_does_not_duplicate_rows() {
        let w = warehouse();
        let manifest = sales_manifest("m01");

        w.install_manifest(&manifest, false).unwrap();
        w.install_manifest(&manifest, true).unwrap();

        assert_eq!(count(&w, "d0b0101_sales"), 3);
    }

    #[test]
    fn test_where_clause_restricts_install() {
        let w = warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![Section::partitions(vec![PartitionDecl::new(PARTITION_VID)
                .with_tables(&["sales"])
                .with_where("total > 15")])],
        );

        w.install_manifest(&manifest, false).unwrap();
        assert_eq!(count(&w, "d0b0101_sales"), 2);
    }

    #[test]
    fn test_sql_section_runs_matching_dialect() {
        let w = warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![Section::sql(&[
                (
                    "sqlite",
                    "CREATE TABLE scratch (n INTEGER); INSERT INTO scratch VALUES (1);",
                ),
                ("postgres", "CREATE TABLE scratch (n BIGINT)"),
            ])],
        );

        w.install_manifest(&manifest, false).unwrap();
        assert_eq!(count(&w, "scratch"), 1);
    }

    #[test]
    fn test_index_section_is_idempotent() {
        let w = warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![
                Section::partitions(vec![PartitionDecl::new(PARTITION_VID)]),
                Section::index("idx_sales_id", "d0b0101_sales", &["c0b1_id"]),
            ],
        );

        w.install_manifest(&manifest, false).unwrap();
        // Index already exists on the second run; still succeeds.
        w.install_manifest(&manifest, false).unwrap();
    }

    #[test]
    fn test_extract_mark_and_sweep() {
        let w = warehouse();

        let both = Manifest::with_uid(
            "m01",
            vec![
                Section::extract("v1", "csv", "v1.csv"),
                Section::extract("v1", "json", "v1.json"),
            ],
        );
        w.install_manifest(&both, false).unwrap();
        assert_eq!(
            w.registry().extract_paths("m01").unwrap(),
            vec!["extracts/v1.csv", "extracts/v1.json"]
        );

        // The re-installed manifest no longer declares the json extract.
        let one = Manifest::with_uid("m01", vec![Section::extract("v1", "csv", "v1.csv")]);
        w.install_manifest(&one, false).unwrap();
        assert_eq!(
            w.registry().extract_paths("m01").unwrap(),
            vec!["extracts/v1.csv"]
        );
    }

    #[test]
    fn test_partial_failure_keeps_earlier_effects() {
        let w = warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![
                Section::partitions(vec![PartitionDecl::new(PARTITION_VID)]),
                Section::sql(&[("sqlite", "THIS IS NOT SQL")]),
                Section::view("v1", "SELECT * FROM d0b01_sales"),
            ],
        );

        assert!(w.install_manifest(&manifest, false).is_err());

        // The partition install before the failing command survives.
        assert_eq!(count(&w, "d0b0101_sales"), 3);
        // The view after the failing command never ran.
        assert!(w.registry().find_table_by_name("v1").unwrap().is_none());
    }

    #[test]
    fn test_unresolved_reference_is_reported_not_fatal() {
        let w = warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![Section::partitions(vec![
                PartitionDecl::new("no-such-partition"),
                PartitionDecl::new(PARTITION_VID),
            ])],
        );

        let report = w.install_manifest(&manifest, false).unwrap();
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.partitions, vec![PARTITION_VID]);
    }

    #[test]
    fn test_about_sets_title_first_writer_wins() {
        let w = warehouse();
        let first = sales_manifest("m01").titled("Sales warehouse", "All sales data");
        w.install_manifest(&first, false).unwrap();
        assert_eq!(w.title().unwrap().as_deref(), Some("Sales warehouse"));

        let second = Manifest::with_uid("m02", vec![]).titled("Other title", "Other");
        w.install_manifest(&second, false).unwrap();
        assert_eq!(w.title().unwrap().as_deref(), Some("Sales warehouse"));
    }

    #[test]
    fn test_manifest_links_recorded() {
        let w = warehouse();
        w.install_manifest(&sales_manifest("m01"), false).unwrap();

        let registry = w.registry();
        assert_eq!(
            registry.manifest_links("m01", "partition").unwrap(),
            vec![PARTITION_VID]
        );
        assert_eq!(
            registry.manifest_links("m01", "table").unwrap(),
            vec![TABLE_VID]
        );
    }

    #[test]
    fn test_remove_partition_drops_tables() {
        let w = warehouse();
        w.install_manifest(&sales_manifest("m01"), false).unwrap();
        assert_eq!(w.list().unwrap().len(), 1);

        w.remove(PARTITION_VID).unwrap();

        assert!(!w.backend().has_table("d0b0101_sales").unwrap());
        assert!(!w.backend().has_table("d0b01_sales").unwrap());
        assert!(w.list().unwrap().is_empty());
        assert!(w
            .registry()
            .find_table_by_name("d0b0101_sales")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_dry_run_digest_writes_nothing() {
        let w = warehouse();
        let digest = w.digest_manifest(&sales_manifest("m01"), false);

        assert_eq!(digest.commands.len(), 3); // About, Install, View
        assert!(!w.backend().has_table("d0b0101_sales").unwrap());
        assert!(w.registry().tables().unwrap().is_empty());
    }
}
