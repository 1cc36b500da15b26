//! # Integration Tests for InkDB SQL Operations
//!
//! End-to-end tests through the public `Database` API, organized by
//! feature area. Expected values are computed from the dialect's rules,
//! not from running the code: each test states the behavior the engine
//! must show from the caller's side, including the error kind when a
//! statement must fail.

use inkdb::{
    Database, Engine, Error, ExecuteResult, FieldBuffer, KvTransaction, MemoryEngine, Params,
    Value,
};
use std::ops::Bound;

fn doc(pairs: &[(&str, Value)]) -> FieldBuffer {
    let mut fb = FieldBuffer::new();
    for (name, value) in pairs {
        fb.add_field(*name, value.clone()).unwrap();
    }
    fb
}

fn rows(db: &Database, sql: &str) -> Vec<FieldBuffer> {
    db.query(sql).unwrap().collect().unwrap()
}

fn kind_of(err: &eyre::Report) -> &Error {
    err.downcast_ref::<Error>().expect("every failure carries its kind")
}

mod ddl_tests {
    use super::*;

    #[test]
    fn create_table_twice_fails_unless_if_not_exists() {
        let db = Database::memory().unwrap();
        assert_eq!(
            db.execute("CREATE TABLE t").unwrap(),
            ExecuteResult::CreateTable { created: true }
        );

        let err = db.execute("CREATE TABLE t").unwrap_err();
        assert!(
            matches!(kind_of(&err), Error::AlreadyExists { kind: "table", .. }),
            "duplicate CREATE TABLE SHOULD fail with AlreadyExists"
        );

        assert_eq!(
            db.execute("CREATE TABLE IF NOT EXISTS t").unwrap(),
            ExecuteResult::CreateTable { created: false }
        );
    }

    #[test]
    fn drop_table_removes_data_and_honors_if_exists() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1)").unwrap();

        assert_eq!(
            db.execute("DROP TABLE t").unwrap(),
            ExecuteResult::DropTable { dropped: true }
        );
        let err = db.query("SELECT * FROM t").unwrap_err();
        assert!(matches!(kind_of(&err), Error::NotFound { kind: "table", .. }));

        assert_eq!(
            db.execute("DROP TABLE IF EXISTS t").unwrap(),
            ExecuteResult::DropTable { dropped: false }
        );
        let err = db.execute("DROP TABLE t").unwrap_err();
        assert!(matches!(kind_of(&err), Error::NotFound { kind: "table", .. }));
    }

    #[test]
    fn composite_indexes_are_rejected_at_parse_time() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        let err = db.execute("CREATE INDEX ix ON t(a, b)").unwrap_err();
        assert!(matches!(kind_of(&err), Error::Parse(_)));
    }

    #[test]
    fn create_index_backfills_existing_records() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (3), (1), (2)").unwrap();
        db.execute("CREATE INDEX ix_a ON t(a)").unwrap();

        // the index now drives an ordered range scan
        let got = rows(&db, "SELECT * FROM t WHERE a >= 1");
        assert_eq!(
            got,
            vec![
                doc(&[("a", Value::Int64(1))]),
                doc(&[("a", Value::Int64(2))]),
                doc(&[("a", Value::Int64(3))]),
            ],
            "index scan SHOULD return records in index order"
        );
    }

    #[test]
    fn unique_backfill_failure_rolls_the_index_back() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1), (1)").unwrap();

        let err = db.execute("CREATE UNIQUE INDEX ux ON t(a)").unwrap_err();
        assert!(matches!(kind_of(&err), Error::ConstraintViolation(_)));

        // the failed DDL left nothing behind: the name is reusable once
        // the duplicates are gone
        db.execute("DELETE FROM t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1)").unwrap();
        db.execute("CREATE UNIQUE INDEX ux ON t(a)").unwrap();
    }

    #[test]
    fn reindex_rebuilds_consistent_entries() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("CREATE INDEX ix_a ON t(a)").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1), (2)").unwrap();

        assert_eq!(
            db.execute("REINDEX t").unwrap(),
            ExecuteResult::Reindex { rebuilt: 1 }
        );
        assert_eq!(rows(&db, "SELECT * FROM t WHERE a = 2").len(), 1);

        assert_eq!(
            db.execute("REINDEX").unwrap(),
            ExecuteResult::Reindex { rebuilt: 1 }
        );
    }
}

mod insert_tests {
    use super::*;

    #[test]
    fn schemaless_tables_require_a_field_list() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        let err = db.execute("INSERT INTO t VALUES (1)").unwrap_err();
        assert!(
            matches!(kind_of(&err), Error::Type(_)),
            "VALUES without fields on a schemaless table SHOULD fail"
        );
    }

    #[test]
    fn schemaful_insert_without_fields_takes_schema_order() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE s (a INT, b TEXT)").unwrap();
        db.execute("INSERT INTO s VALUES (1, 'x')").unwrap();
        assert_eq!(
            rows(&db, "SELECT * FROM s"),
            vec![doc(&[("a", Value::Int64(1)), ("b", Value::Text("x".into()))])]
        );

        let err = db.execute("INSERT INTO s VALUES (1)").unwrap_err();
        assert!(matches!(kind_of(&err), Error::Type(_)), "arity mismatch SHOULD fail");
    }

    #[test]
    fn missing_schemaful_fields_are_zero_filled() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE s (a INT, b TEXT, c BOOL)").unwrap();
        db.execute("INSERT INTO s (a) VALUES (7)").unwrap();
        assert_eq!(
            rows(&db, "SELECT * FROM s"),
            vec![doc(&[
                ("a", Value::Int64(7)),
                ("b", Value::Text(String::new())),
                ("c", Value::Bool(false)),
            ])]
        );
    }

    #[test]
    fn schemaful_type_enforcement_fails_with_type_error() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE s (a INT, b TEXT)").unwrap();

        let err = db.execute("INSERT INTO s (a) VALUES ('nope')").unwrap_err();
        assert!(
            matches!(kind_of(&err), Error::Type(_)),
            "text into INT SHOULD fail with Type"
        );

        let err = db.execute("INSERT INTO s (b) VALUES (1)").unwrap_err();
        assert!(matches!(kind_of(&err), Error::Type(_)), "int into TEXT SHOULD fail with Type");

        let err = db.execute("INSERT INTO s (a) VALUES (1.5)").unwrap_err();
        assert!(matches!(kind_of(&err), Error::Type(_)), "float into INT SHOULD fail with Type");
    }

    #[test]
    fn records_form_accepts_documents_and_parameters() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();

        let record = doc(&[("a", Value::Int64(3)), ("b", Value::Text("x".into()))]);
        let params = Params::new().positional(Value::Document(record.clone()));
        db.execute_with("INSERT INTO t RECORDS (a: 1), {a: 2}, ?", params)
            .unwrap();

        let got = rows(&db, "SELECT * FROM t");
        assert_eq!(
            got,
            vec![doc(&[("a", Value::Int64(1))]), doc(&[("a", Value::Int64(2))]), record]
        );
    }

    #[test]
    fn null_fields_are_not_materialized_on_schemaless_tables() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a, b) VALUES (null, 1)").unwrap();
        assert_eq!(rows(&db, "SELECT * FROM t"), vec![doc(&[("b", Value::Int64(1))])]);
    }
}

mod select_tests {
    use super::*;

    #[test]
    fn primary_key_range_scan_returns_matching_records() {
        // S1
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE foo (a INTEGER PRIMARY KEY)").unwrap();
        db.execute("INSERT INTO foo (a) VALUES (1), (2)").unwrap();
        assert_eq!(
            rows(&db, "SELECT * FROM foo WHERE a >= 2"),
            vec![doc(&[("a", Value::Int64(2))])]
        );
    }

    #[test]
    fn unknown_projected_fields_are_null() {
        // S2
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE foo").unwrap();
        db.execute("INSERT INTO foo (c) VALUES (3)").unwrap();
        assert_eq!(rows(&db, "SELECT z FROM foo"), vec![doc(&[("z", Value::Null)])]);
    }

    #[test]
    fn order_by_sorts_nulls_first_ascending_and_inverts_descending() {
        // S3
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (0), (null), (true)").unwrap();

        let ascending = rows(&db, "SELECT * FROM t ORDER BY a");
        assert_eq!(
            ascending,
            vec![
                doc(&[]),
                doc(&[("a", Value::Int64(0))]),
                doc(&[("a", Value::Bool(true))]),
            ],
            "nulls SHOULD sort before non-null values ascending"
        );

        let descending = rows(&db, "SELECT * FROM t ORDER BY a DESC");
        assert_eq!(
            descending,
            vec![
                doc(&[("a", Value::Bool(true))]),
                doc(&[("a", Value::Int64(0))]),
                doc(&[]),
            ],
            "descending SHOULD invert the ascending order"
        );
    }

    #[test]
    fn limit_offset_window_is_exact_for_every_combination() {
        let total: i64 = 10;
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t (n INT PRIMARY KEY)").unwrap();
        for n in 0..total {
            db.execute_with("INSERT INTO t (n) VALUES (?)", Params::new().positional(n))
                .unwrap();
        }

        for offset in 0..=(total + 2) {
            for limit in 0..=(total + 2) {
                let got = rows(
                    &db,
                    &format!("SELECT * FROM t LIMIT {} OFFSET {}", limit, offset),
                );
                let expected = limit.min((total - offset).max(0)) as usize;
                assert_eq!(
                    got.len(),
                    expected,
                    "LIMIT {} OFFSET {} over {} records",
                    limit,
                    offset,
                    total
                );
                if expected > 0 {
                    assert_eq!(
                        got[0],
                        doc(&[("n", Value::Int64(offset))]),
                        "window SHOULD start at index {}",
                        offset
                    );
                }
            }
        }
    }

    #[test]
    fn distinct_deduplicates_projected_rows() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a, b) VALUES (1, 1), (1, 2), (2, 1)").unwrap();
        assert_eq!(
            rows(&db, "SELECT DISTINCT a FROM t"),
            vec![doc(&[("a", Value::Int64(1))]), doc(&[("a", Value::Int64(2))])]
        );
    }

    #[test]
    fn group_by_emits_one_record_per_group() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (g, v) VALUES ('b', 1), ('a', 2), ('b', 3)").unwrap();
        let got = rows(&db, "SELECT g FROM t GROUP BY g");
        assert_eq!(
            got,
            vec![
                doc(&[("g", Value::Text("a".into()))]),
                doc(&[("g", Value::Text("b".into()))]),
            ]
        );
    }

    #[test]
    fn where_filters_with_three_valued_logic() {
        // S6
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1), (2)").unwrap();

        let got = db
            .query_with(
                "SELECT * FROM t WHERE a = $x",
                Params::new().named("x", Value::Null),
            )
            .unwrap()
            .collect()
            .unwrap();
        assert!(got.is_empty(), "comparison with NULL SHOULD match nothing");
    }

    #[test]
    fn index_and_filter_paths_agree_on_heterogeneous_fields() {
        let seed = |db: &Database| {
            db.execute("CREATE TABLE t").unwrap();
            db.execute("INSERT INTO t (a) VALUES (1), (2.5), ('x'), (true), (null), (10)")
                .unwrap();
        };

        let plain = Database::memory().unwrap();
        seed(&plain);

        let indexed = Database::memory().unwrap();
        seed(&indexed);
        indexed.execute("CREATE INDEX ix_a ON t(a)").unwrap();

        for predicate in ["a >= 2", "a = 1", "a < 10", "a > 0 AND a <= 2.5", "a = 'x'"] {
            let sql = format!("SELECT * FROM t WHERE {}", predicate);
            let mut expected = rows(&plain, &sql);
            let mut got = rows(&indexed, &sql);
            // the index path may return a different order; compare as sets
            let key = |fb: &FieldBuffer| format!("{:?}", fb);
            expected.sort_by_key(&key);
            got.sort_by_key(&key);
            assert_eq!(got, expected, "index and filter SHOULD agree on {:?}", predicate);
        }
    }

    #[test]
    fn like_and_regex_operators_match_case_sensitively() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (s) VALUES ('alpha'), ('Alpha'), ('beta')").unwrap();

        assert_eq!(
            rows(&db, "SELECT * FROM t WHERE s LIKE 'a%'"),
            vec![doc(&[("s", Value::Text("alpha".into()))])]
        );
        assert_eq!(
            rows(&db, "SELECT * FROM t WHERE s =~ '^[ab]'"),
            vec![
                doc(&[("s", Value::Text("alpha".into()))]),
                doc(&[("s", Value::Text("beta".into()))]),
            ]
        );
        assert_eq!(rows(&db, "SELECT * FROM t WHERE s !~ 'a'").len(), 1);
    }
}

mod update_delete_tests {
    use super::*;

    #[test]
    fn update_rewrites_matching_records_and_their_index_entries() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("CREATE INDEX ix_a ON t(a)").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1), (2)").unwrap();

        assert_eq!(
            db.execute("UPDATE t SET a = a + 10 WHERE a = 2").unwrap(),
            ExecuteResult::Update { updated: 1 }
        );
        assert!(rows(&db, "SELECT * FROM t WHERE a = 2").is_empty());
        assert_eq!(
            rows(&db, "SELECT * FROM t WHERE a = 12"),
            vec![doc(&[("a", Value::Int64(12))])]
        );
    }

    #[test]
    fn update_enforces_schemaful_types() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE s (a INT, b TEXT)").unwrap();
        db.execute("INSERT INTO s (a, b) VALUES (1, 'x')").unwrap();

        let err = db.execute("UPDATE s SET a = 'oops'").unwrap_err();
        assert!(matches!(kind_of(&err), Error::Type(_)));
        assert_eq!(
            rows(&db, "SELECT * FROM s"),
            vec![doc(&[("a", Value::Int64(1)), ("b", Value::Text("x".into()))])],
            "failed update SHOULD leave the record untouched"
        );
    }

    #[test]
    fn delete_removes_matching_records_only() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1), (2), (3)").unwrap();

        assert_eq!(
            db.execute("DELETE FROM t WHERE a >= 2").unwrap(),
            ExecuteResult::Delete { deleted: 2 }
        );
        assert_eq!(rows(&db, "SELECT * FROM t"), vec![doc(&[("a", Value::Int64(1))])]);
    }
}

mod constraint_tests {
    use super::*;

    #[test]
    fn unique_index_rejects_duplicate_values() {
        // S4
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("CREATE UNIQUE INDEX ux ON t(a)").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1)").unwrap();

        let err = db.execute("INSERT INTO t (a) VALUES (1)").unwrap_err();
        assert!(
            matches!(kind_of(&err), Error::ConstraintViolation(_)),
            "duplicate unique value SHOULD fail with ConstraintViolation"
        );
    }

    #[test]
    fn duplicate_primary_keys_are_rejected() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t (id INT PRIMARY KEY)").unwrap();
        db.execute("INSERT INTO t (id) VALUES (1)").unwrap();
        let err = db.execute("INSERT INTO t (id) VALUES (1)").unwrap_err();
        assert!(matches!(kind_of(&err), Error::ConstraintViolation(_)));
    }

    #[test]
    fn null_primary_keys_are_rejected() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t (id INT PRIMARY KEY)").unwrap();
        let err = db.execute("INSERT INTO t (id) VALUES (null)").unwrap_err();
        assert!(matches!(kind_of(&err), Error::ConstraintViolation(_)));
    }
}

mod index_consistency_tests {
    use super::*;

    /// Counts the entries of one index bucket through a fresh engine
    /// snapshot.
    fn index_entries(engine: &MemoryEngine, bucket: &str) -> usize {
        let txn = engine.begin(false).unwrap();
        let mut cursor = txn
            .cursor(bucket, Bound::Unbounded, Bound::Unbounded, false)
            .unwrap();
        let mut count = 0;
        while cursor.next().is_some() {
            count += 1;
        }
        count
    }

    #[test]
    fn every_indexed_field_value_has_exactly_one_entry() {
        let engine = MemoryEngine::new();
        let db = Database::new(Box::new(engine.clone())).unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("CREATE INDEX ix_a ON t(a)").unwrap();

        db.execute("INSERT INTO t (a) VALUES (1), (2), (3)").unwrap();
        assert_eq!(index_entries(&engine, "i:t:ix_a"), 3);

        db.execute("UPDATE t SET a = a + 1 WHERE a = 2").unwrap();
        assert_eq!(index_entries(&engine, "i:t:ix_a"), 3, "update SHOULD not leak entries");

        db.execute("DELETE FROM t WHERE a = 1").unwrap();
        assert_eq!(index_entries(&engine, "i:t:ix_a"), 2);

        // records without the indexed field contribute no entries
        db.execute("INSERT INTO t (b) VALUES (9)").unwrap();
        assert_eq!(index_entries(&engine, "i:t:ix_a"), 2);
    }

    #[test]
    fn drop_index_removes_the_bucket() {
        let engine = MemoryEngine::new();
        let db = Database::new(Box::new(engine.clone())).unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("CREATE INDEX ix_a ON t(a)").unwrap();
        db.execute("DROP INDEX ix_a").unwrap();

        let txn = engine.begin(false).unwrap();
        assert!(
            !txn.bucket_exists("i:t:ix_a"),
            "DROP INDEX SHOULD remove the index bucket"
        );
    }
}

mod transaction_tests {
    use super::*;

    #[test]
    fn rolled_back_writes_are_invisible() {
        // S5
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();

        db.execute("BEGIN").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1)").unwrap();
        db.execute("ROLLBACK").unwrap();

        assert!(
            rows(&db, "SELECT * FROM t").is_empty(),
            "rolled back insert SHOULD be invisible"
        );
    }

    #[test]
    fn committed_writes_are_visible() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();

        db.execute("BEGIN WRITE").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1)").unwrap();
        db.execute("COMMIT").unwrap();

        assert_eq!(rows(&db, "SELECT * FROM t").len(), 1);
    }

    #[test]
    fn lazy_results_read_a_snapshot_taken_at_query_time() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1)").unwrap();

        let mut result = db.query("SELECT * FROM t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (2)").unwrap();

        assert_eq!(
            result.collect().unwrap().len(),
            1,
            "a reader begun before the write SHOULD not observe it"
        );
        assert_eq!(rows(&db, "SELECT * FROM t").len(), 2);
    }

    #[test]
    fn ddl_is_transactional_too() {
        let db = Database::memory().unwrap();
        db.execute("BEGIN").unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1)").unwrap();
        db.execute("ROLLBACK").unwrap();

        let err = db.query("SELECT * FROM t").unwrap_err();
        assert!(
            matches!(kind_of(&err), Error::NotFound { kind: "table", .. }),
            "rolled back CREATE TABLE SHOULD leave no table behind"
        );
    }
}

mod parameter_tests {
    use super::*;

    #[test]
    fn positional_parameters_bind_in_order() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute_with(
            "INSERT INTO t (a, b) VALUES (?, ?)",
            Params::new().positional(1i64).positional("x"),
        )
        .unwrap();
        assert_eq!(
            rows(&db, "SELECT * FROM t"),
            vec![doc(&[("a", Value::Int64(1)), ("b", Value::Text("x".into()))])]
        );
    }

    #[test]
    fn named_parameters_bind_by_name() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        db.execute("INSERT INTO t (a) VALUES (1), (2)").unwrap();

        let got = db
            .query_with(
                "SELECT * FROM t WHERE a = $wanted",
                Params::new().named("wanted", 2i64),
            )
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(got, vec![doc(&[("a", Value::Int64(2))])]);
    }

    #[test]
    fn missing_positional_parameter_is_bad_parameter() {
        let db = Database::memory().unwrap();
        db.execute("CREATE TABLE t").unwrap();
        let err = db.execute("INSERT INTO t (a) VALUES (?)").unwrap_err();
        assert!(matches!(kind_of(&err), Error::BadParameter(_)));
    }

    #[test]
    fn parse_errors_surface_position_and_expectations() {
        let db = Database::memory().unwrap();
        let err = db.execute("CREATE banana").unwrap_err();
        let Error::Parse(parse_err) = kind_of(&err) else {
            panic!("expected a parse error");
        };
        assert_eq!(parse_err.found, "banana");
        assert!(!parse_err.expected.is_empty());
    }
}
