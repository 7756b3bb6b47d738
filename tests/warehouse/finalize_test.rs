#[cfg(test)]
mod tests {
    use granary::backend::{DbBackend, SqlValue, SqliteBackend};
    use granary::identity::{PartitionFormat, PartitionRef};
    use granary::library::{CatalogColumn, CatalogTable, MemoryLibrary, MemoryPartition};
    use granary::manifest::{Manifest, PartitionDecl, Section};
    use granary::registry::{SchemaRegistry, TableKind};
    use granary::warehouse::Warehouse;

    const DATASET_VID: &str = "d0d0101";
    const DATASET_ID: &str = "d0d01";
    const TABLE_VID: &str = "t0d0201";

    fn sales_table() -> CatalogTable {
        CatalogTable {
            vid: TABLE_VID.to_string(),
            name: "sales".to_string(),
            description: None,
            columns: vec![
                CatalogColumn {
                    id: "c0d1".to_string(),
                    name: "id".to_string(),
                    datatype: "integer".to_string(),
                    description: None,
                    sequence_id: 1,
                },
                CatalogColumn {
                    id: "c0d2".to_string(),
                    name: "total".to_string(),
                    datatype: "real".to_string(),
                    description: None,
                    sequence_id: 2,
                },
            ],
        }
    }

    fn partition(vid: &str, grain: &str, rows: Vec<Vec<SqlValue>>) -> MemoryPartition {
        let identity = PartitionRef {
            vid: vid.to_string(),
            id: vid.trim_end_matches("01").to_string(),
            vname: format!("example.com-sales-0.1.0-{}", grain),
            format: PartitionFormat::Db,
            grain: Some(grain.to_string()),
            dataset_vid: DATASET_VID.to_string(),
            dataset_id: DATASET_ID.to_string(),
            tables: vec!["sales".to_string()],
        };
        MemoryPartition::new(identity, vec![sales_table()]).with_rows("sales", rows)
    }

    fn county_rows() -> Vec<Vec<SqlValue>> {
        vec![
            vec![SqlValue::Integer(1), SqlValue::Real(10.0)],
            vec![SqlValue::Integer(2), SqlValue::Real(20.0)],
        ]
    }

    fn state_rows() -> Vec<Vec<SqlValue>> {
        vec![
            vec![SqlValue::Integer(3), SqlValue::Real(30.0)],
            vec![SqlValue::Integer(4), SqlValue::Real(40.0)],
            vec![SqlValue::Integer(5), SqlValue::Real(50.0)],
        ]
    }

    fn two_grain_warehouse() -> Warehouse {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let registry = SchemaRegistry::open_in_memory().unwrap();
        let library = MemoryLibrary::new()
            .with_partition(partition("p0d010101", "county", county_rows()))
            .with_partition(partition("p0d010201", "state", state_rows()));
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

    #[test]
    fn test_union_of_two_physical_copies() {
        let w = two_grain_warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![Section::partitions(vec![
                PartitionDecl::new("p0d010101"),
                PartitionDecl::new("p0d010201"),
            ])],
        );
        w.install_manifest(&manifest, false).unwrap();

        assert_eq!(count(&w, "d0d0101_sales_county"), 2);
        assert_eq!(count(&w, "d0d0101_sales_state"), 3);

        // The union view presents both copies under the canonical vid.
        assert_eq!(count(&w, TABLE_VID), 5);

        let union = w.registry().find_table_by_name(TABLE_VID).unwrap().unwrap();
        assert_eq!(union.kind, TableKind::Alias);
        assert!(union.data.sql.as_deref().unwrap().contains("UNION"));
    }

    #[test]
    fn test_single_copy_is_passthrough_alias() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let registry = SchemaRegistry::open_in_memory().unwrap();
        let library =
            MemoryLibrary::new().with_partition(partition("p0d010101", "county", county_rows()));
        let w = Warehouse::open(Box::new(backend), registry, Box::new(library)).unwrap();

        let manifest = Manifest::with_uid(
            "m01",
            vec![Section::partitions(vec![PartitionDecl::new("p0d010101")])],
        );
        w.install_manifest(&manifest, false).unwrap();

        assert_eq!(count(&w, TABLE_VID), 2);

        let union = w.registry().find_table_by_name(TABLE_VID).unwrap().unwrap();
        let sql = union.data.sql.unwrap();
        assert!(!sql.contains("UNION"));
        assert_eq!(sql, "SELECT * FROM \"d0d0101_sales_county\"");
    }

    #[test]
    fn test_exactly_one_vid_keyed_alias_per_base_table() {
        let w = two_grain_warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![Section::partitions(vec![
                PartitionDecl::new("p0d010101"),
                PartitionDecl::new("p0d010201"),
            ])],
        );
        w.install_manifest(&manifest, false).unwrap();

        let vid_aliases: Vec<_> = w
            .registry()
            .tables()
            .unwrap()
            .into_iter()
            .filter(|t| {
                t.kind == TableKind::Alias
                    && t.name == TABLE_VID
                    && t.proto_vid.as_deref() == Some(TABLE_VID)
            })
            .collect();
        assert_eq!(vid_aliases.len(), 1);
    }

    #[test]
    fn test_installed_names_accumulate_derived_objects() {
        let w = two_grain_warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![Section::partitions(vec![
                PartitionDecl::new("p0d010101"),
                PartitionDecl::new("p0d010201"),
            ])],
        );
        w.install_manifest(&manifest, false).unwrap();

        let base = w.registry().find_table_by_name("sales").unwrap().unwrap();
        for name in [
            "d0d0101_sales_county",
            "d0d0101_sales_state",
            "d0d01_sales_county",
            "d0d01_sales_state",
        ] {
            assert!(
                base.data.installed_names.contains(&name.to_string()),
                "missing installed name {}",
                name
            );
        }
    }

    #[test]
    fn test_samples_and_counts_cached() {
        let w = two_grain_warehouse();
        let manifest = Manifest::with_uid(
            "m01",
            vec![
                Section::partitions(vec![PartitionDecl::new("p0d010101")]),
                Section::view("v1", "SELECT * FROM d0d01_sales_county"),
            ],
        );
        w.install_manifest(&manifest, false).unwrap();

        let view = w.registry().find_table_by_name("v1").unwrap().unwrap();
        let sample = view.data.sample.unwrap();
        // Header row first, then one row per sampled record.
        assert_eq!(
            sample[0],
            vec![
                serde_json::Value::from("c0d1_id"),
                serde_json::Value::from("c0d2_total")
            ]
        );
        assert_eq!(sample.len(), 3);
        assert_eq!(view.data.count, Some(2));

        let base = w.registry().find_table_by_name("sales").unwrap().unwrap();
        assert!(base.data.sample.is_some());
        assert_eq!(base.data.count, Some(2));
    }

    #[test]
    fn test_second_partition_extends_existing_union() {
        let w = two_grain_warehouse();

        let first = Manifest::with_uid(
            "m01",
            vec![Section::partitions(vec![PartitionDecl::new("p0d010101")])],
        );
        w.install_manifest(&first, false).unwrap();
        assert_eq!(count(&w, TABLE_VID), 2);

        // A later manifest adds the second grain; the union is rebuilt to
        // cover both.
        let second = Manifest::with_uid(
            "m02",
            vec![Section::partitions(vec![PartitionDecl::new("p0d010201")])],
        );
        w.install_manifest(&second, false).unwrap();
        assert_eq!(count(&w, TABLE_VID), 5);
    }
}
