// Property tests for export/restore
// Any table contents survive export followed by restore into a fresh handle

use proptest::prelude::*;
use serde_json::json;
use sqlbridge_engine::{BundledSqlite, EngineAdapter, EngineLoader};
use sqlbridge_store::{MemoryKv, SnapshotStore};
use std::sync::Arc;

fn adapter() -> EngineAdapter {
    EngineAdapter::new(
        BundledSqlite.load().unwrap(),
        SnapshotStore::new(Arc::new(MemoryKv::new()), "keyvaluepairs"),
        "sqlite_db_data",
    )
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn row_strategy() -> impl Strategy<Value = (i64, String, Option<Vec<u8>>)> {
    (
        any::<i64>(),
        "[a-zA-Z0-9 _-]{0,24}",
        proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_restore_of_export_preserves_rows(
        rows in proptest::collection::vec(row_strategy(), 0..40)
    ) {
        let (expected, actual) = run(async {
            let mut source = adapter();
            source.init().await.unwrap();
            source.exec("CREATE TABLE t(n INTEGER, s TEXT, b BLOB)", None).unwrap();
            for (n, s, b) in &rows {
                source
                    .exec("INSERT INTO t VALUES (?, ?, ?)", Some(&json!([n, s, b])))
                    .unwrap();
            }
            let query = "SELECT n, s, b FROM t ORDER BY rowid";
            let expected = source.exec(query, None).unwrap();
            let image = source.export().unwrap();

            let mut target = adapter();
            target.init().await.unwrap();
            target.restore(&image).unwrap();
            (expected, target.exec(query, None).unwrap())
        });

        prop_assert_eq!(expected.rows.len(), rows.len());
        prop_assert_eq!(expected.rows, actual.rows);
    }
}
