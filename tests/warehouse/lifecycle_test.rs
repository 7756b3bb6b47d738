#[cfg(test)]
mod tests {
    use granary::backend::{DbBackend, SqlValue, SqliteBackend};
    use granary::identity::{PartitionFormat, PartitionRef};
    use granary::library::{CatalogColumn, CatalogTable, MemoryLibrary, MemoryPartition};
    use granary::manifest::{Manifest, PartitionDecl, Section};
    use granary::registry::{SchemaRegistry, TableKind};
    use granary::warehouse::{RebuildPolicy, Warehouse};

    const PARTITION_VID: &str = "p0c010101";

    fn sales_partition() -> MemoryPartition {
        let identity = PartitionRef {
            vid: PARTITION_VID.to_string(),
            id: "p0c0101".to_string(),
            vname: "example.com-sales-0.1.0".to_string(),
            format: PartitionFormat::Db,
            grain: None,
            dataset_vid: "d0c0101".to_string(),
            dataset_id: "d0c01".to_string(),
            tables: vec!["sales".to_string()],
        };
        let table = CatalogTable {
            vid: "t0c0201".to_string(),
            name: "sales".to_string(),
            description: None,
            columns: vec![
                CatalogColumn {
                    id: "c0c1".to_string(),
                    name: "id".to_string(),
                    datatype: "integer".to_string(),
                    description: None,
                    sequence_id: 1,
                },
                CatalogColumn {
                    id: "c0c2".to_string(),
                    name: "total".to_string(),
                    datatype: "real".to_string(),
                    description: None,
                    sequence_id: 2,
                },
            ],
        };
        MemoryPartition::new(identity, vec![table]).with_rows(
            "sales",
            vec![
                vec![SqlValue::Integer(1), SqlValue::Real(10.0)],
                vec![SqlValue::Integer(2), SqlValue::Real(20.0)],
                vec![SqlValue::Integer(3), SqlValue::Real(30.0)],
            ],
        )
    }

    fn warehouse() -> Warehouse {
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

    const MV_SQL: &str = "SELECT c0c1_id, c0c2_total FROM d0c0101_sales";

    fn mview_manifest(uid: &str, mv_sql: &str) -> Manifest {
        Manifest::with_uid(
            uid,
            vec![
                Section::partitions(vec![PartitionDecl::new(PARTITION_VID)]),
                Section::mview("mv1", mv_sql),
            ],
        )
    }

    #[test]
    fn test_mview_is_materialized_as_table() {
        let w = warehouse();
        w.install_manifest(&mview_manifest("m01", MV_SQL), false).unwrap();

        assert_eq!(count(&w, "mv1"), 3);
        let record = w.registry().find_table_by_name("mv1").unwrap().unwrap();
        assert_eq!(record.kind, TableKind::MView);
        assert_eq!(record.data.sql.as_deref(), Some(MV_SQL));
        assert_eq!(record.data.tc_names, vec!["d0c0101_sales"]);
        assert!(record.data.updated.is_some());
    }

    #[test]
    fn test_unchanged_mview_is_not_rebuilt() {
        let w = warehouse();
        let manifest = mview_manifest("m01", MV_SQL);
        w.install_manifest(&manifest, false).unwrap();

        // Scribble on the materialized table; a rebuild would erase this.
        w.backend()
            .execute("INSERT INTO mv1 VALUES (99, 0.0)")
            .unwrap();

        w.install_manifest(&manifest, false).unwrap();
        assert_eq!(count(&w, "mv1"), 4);
    }

    #[test]
    fn test_edited_sql_rebuilds_mview() {
        let w = warehouse();
        w.install_manifest(&mview_manifest("m01", MV_SQL), false).unwrap();
        let before = w
            .registry()
            .find_table_by_name("mv1")
            .unwrap()
            .unwrap()
            .data
            .updated
            .unwrap();

        let edited = format!("{} WHERE c0c2_total > 15", MV_SQL);
        w.install_manifest(&mview_manifest("m01", &edited), false).unwrap();

        // Old table dropped and recreated from the new SELECT.
        assert_eq!(count(&w, "mv1"), 2);
        let record = w.registry().find_table_by_name("mv1").unwrap().unwrap();
        assert_eq!(record.data.sql.as_deref(), Some(edited.as_str()));
        assert!(record.data.updated.unwrap() >= before);
    }

    #[test]
    fn test_force_rebuilds_unchanged_mview() {
        let w = warehouse();
        let manifest = mview_manifest("m01", MV_SQL);
        w.install_manifest(&manifest, false).unwrap();

        w.backend()
            .execute("INSERT INTO mv1 VALUES (99, 0.0)")
            .unwrap();

        // Forced install rebuilds from the source rows.
        w.install_manifest(&manifest, true).unwrap();
        assert_eq!(count(&w, "mv1"), 3);
    }

    #[test]
    fn test_stale_upstream_triggers_rebuild() {
        let w = warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![
                Section::partitions(vec![PartitionDecl::new(PARTITION_VID)]),
                Section::mview("mv_base", MV_SQL),
                Section::mview("mv_dep", "SELECT * FROM mv_base"),
            ],
        );
        w.install_manifest(&manifest, false).unwrap();

        let registry = w.registry();
        let policy = RebuildPolicy::new(registry);
        assert!(!policy.needs_rebuild("mv_dep", "SELECT * FROM mv_base").unwrap());

        // Advance the upstream's build stamp past the dependent's.
        let base = registry.find_table_by_name("mv_base").unwrap().unwrap();
        let mut data = base.data.clone();
        data.updated = Some(data.updated.unwrap() + 60_000);
        registry.save_table_data(&base.vid, &data).unwrap();

        assert!(policy.needs_rebuild("mv_dep", "SELECT * FROM mv_base").unwrap());
    }

    #[test]
    fn test_view_with_unchanged_sql_is_noop() {
        let w = warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![
                Section::partitions(vec![PartitionDecl::new(PARTITION_VID)]),
                Section::view("v1", "SELECT * FROM d0c01_sales"),
            ],
        );
        w.install_manifest(&manifest, false).unwrap();
        let before = w.registry().find_table_by_name("v1").unwrap().unwrap();

        w.install_manifest(&manifest, false).unwrap();
        let after = w.registry().find_table_by_name("v1").unwrap().unwrap();

        assert_eq!(before.data.updated, after.data.updated);
        // Sample cached by the first post-install survives the no-op.
        assert!(after.data.sample.is_some());
    }

    #[test]
    fn test_view_redefinition_drops_and_recreates() {
        let w = warehouse();
        w.install_manifest(
            &Manifest::with_uid(
                "m01",
                vec![
                    Section::partitions(vec![PartitionDecl::new(PARTITION_VID)]),
                    Section::view("v1", "SELECT * FROM d0c01_sales"),
                ],
            ),
            false,
        )
        .unwrap();
        assert_eq!(count(&w, "v1"), 3);

        w.install_manifest(
            &Manifest::with_uid(
                "m01",
                vec![
                    Section::partitions(vec![PartitionDecl::new(PARTITION_VID)]),
                    Section::view("v1", "SELECT * FROM d0c01_sales WHERE c0c2_total > 15"),
                ],
            ),
            false,
        )
        .unwrap();

        assert_eq!(count(&w, "v1"), 2);
    }
}
