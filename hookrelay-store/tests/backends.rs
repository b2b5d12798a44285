//! Behaviour shared by every backend

use hookrelay_store::{MemoryStore, OrderedStore, SqliteStore, WriteBatch};

fn backends() -> Vec<(&'static str, Box<dyn OrderedStore>)> {
    vec![
        ("memory", Box::new(MemoryStore::new())),
        ("sqlite", Box::new(SqliteStore::in_memory().unwrap())),
    ]
}

fn keys(pairs: Vec<(String, String)>) -> Vec<String> {
    pairs.into_iter().map(|(k, _)| k).collect()
}

#[test]
fn test_scan_is_sorted_by_bytes() {
    for (name, store) in backends() {
        store
            .apply(
                WriteBatch::new()
                    .put("b.Secret", "1")
                    .put("a.Secret", "2")
                    .put("B.Secret", "3")
                    .put("a.CreatedAt", "4"),
            )
            .unwrap();

        assert_eq!(
            keys(store.scan().unwrap()),
            vec!["B.Secret", "a.CreatedAt", "a.Secret", "b.Secret"],
            "backend {name}"
        );
    }
}

#[test]
fn test_delete_prefix_respects_boundary() {
    for (name, store) in backends() {
        store
            .apply(
                WriteBatch::new()
                    .put("acme.Secret", "s1")
                    .put("acme.Hooks.orders.UUID", "u1")
                    .put("acme2.Secret", "s2")
                    .put("acme2.Hooks.orders.UUID", "u2"),
            )
            .unwrap();

        store.apply(WriteBatch::new().delete_prefix("acme.")).unwrap();

        assert_eq!(
            keys(store.scan().unwrap()),
            vec!["acme2.Hooks.orders.UUID", "acme2.Secret"],
            "backend {name}"
        );
    }
}

#[test]
fn test_batch_operations_apply_in_order() {
    for (name, store) in backends() {
        store
            .apply(
                WriteBatch::new()
                    .put("acme.Hooks.old.UUID", "u-old")
                    .put("acme.Hooks.keep.UUID", "u-keep"),
            )
            .unwrap();

        store
            .apply(
                WriteBatch::new()
                    .delete_prefix("acme.Hooks.")
                    .put("acme.Hooks.keep.UUID", "u-keep")
                    .delete("acme.Missing"),
            )
            .unwrap();

        assert_eq!(
            store.scan().unwrap(),
            vec![("acme.Hooks.keep.UUID".to_string(), "u-keep".to_string())],
            "backend {name}"
        );
    }
}

#[test]
fn test_scan_prefix() {
    for (name, store) in backends() {
        store
            .apply(
                WriteBatch::new()
                    .put("acme.Secret", "1")
                    .put("acme.Hooks.x.URL", "2")
                    .put("acmex.Secret", "3")
                    .put("zed.Secret", "4"),
            )
            .unwrap();

        assert_eq!(
            keys(store.scan_prefix("acme.").unwrap()),
            vec!["acme.Hooks.x.URL", "acme.Secret"],
            "backend {name}"
        );
        assert!(store.scan_prefix("nobody.").unwrap().is_empty());
    }
}

#[test]
fn test_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hooks.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store
            .apply(WriteBatch::new().put("acme.Secret", "digest"))
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(
        store.scan().unwrap(),
        vec![("acme.Secret".to_string(), "digest".to_string())]
    );
}

#[test]
fn test_sqlite_failed_batch_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hooks.db");
    let store = SqliteStore::open(&path).unwrap();
    store.apply(WriteBatch::new().put("a", "1")).unwrap();

    // A trigger makes the second op of the batch fail.
    {
        let conn = rusqlite_conn(&path);
        conn.execute_batch(
            "CREATE TRIGGER reject_b BEFORE INSERT ON kv WHEN NEW.key = 'b'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();
    }

    let result = store.apply(WriteBatch::new().delete("a").put("b", "2"));
    assert!(result.is_err());
    assert_eq!(store.scan().unwrap(), vec![("a".to_string(), "1".to_string())]);
}

fn rusqlite_conn(path: &std::path::Path) -> rusqlite::Connection {
    rusqlite::Connection::open(path).unwrap()
}
