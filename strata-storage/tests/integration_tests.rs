//! # Integration Tests
//!
//! End-to-end engine behavior: the write/flush/compact/read cycle,
//! tombstone shadowing across runs, configuration rejection, and the
//! full "orders" scenario.

use tempfile::TempDir;

use strata_storage::{
    CompressionAlgorithm, Database, FamilyOptions, MemtableKind,
};

#[tokio::test]
async fn orders_scenario_end_to_end() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).await.unwrap();

    db.create_family(
        "orders",
        FamilyOptions {
            flush_threshold: 1024,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    for i in 1..=100u32 {
        db.put("orders", format!("k{}", i), format!("v{}", i), None)
            .await
            .unwrap();
    }

    db.flush("orders").await.unwrap();
    db.compact("orders", 4).await.unwrap();

    assert_eq!(
        db.get("orders", "k57").await.unwrap().unwrap().as_ref(),
        b"v57"
    );

    db.delete("orders", "k57").await.unwrap();
    assert!(db.get("orders", "k57").await.unwrap().is_none());

    // Full cursor pass: 99 keys, ascending, k57 absent.
    let mut cursor = db.cursor("orders").await.unwrap();
    let mut keys = Vec::new();
    if let Some((key, _)) = cursor.get() {
        keys.push(key.to_vec());
        while cursor.next().unwrap() {
            keys.push(cursor.get().unwrap().0.to_vec());
        }
    }

    assert_eq!(keys.len(), 99);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    assert!(!keys.contains(&b"k57".to_vec()));
}

#[tokio::test]
async fn get_after_put_regardless_of_flushes_and_compactions() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).await.unwrap();
    db.create_family(
        "cf",
        FamilyOptions {
            flush_threshold: 512,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    for i in 0..300u32 {
        db.put("cf", format!("key-{:04}", i), format!("value-{}", i), None)
            .await
            .unwrap();
        if i % 100 == 50 {
            db.compact("cf", 2).await.unwrap();
        }
    }
    db.flush("cf").await.unwrap();
    db.compact("cf", 3).await.unwrap();

    for i in 0..300u32 {
        let value = db.get("cf", format!("key-{:04}", i)).await.unwrap();
        assert_eq!(
            value.unwrap().as_ref(),
            format!("value-{}", i).as_bytes(),
            "key-{:04}",
            i
        );
    }
}

#[tokio::test]
async fn delete_shadows_older_runs() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).await.unwrap();
    db.create_family("cf", FamilyOptions::default()).await.unwrap();

    db.put("cf", "key", "value", None).await.unwrap();
    db.flush("cf").await.unwrap();

    db.delete("cf", "key").await.unwrap();
    db.flush("cf").await.unwrap();

    // The key still physically exists in the older run; the tombstone
    // in the newer run must shadow it.
    assert!(db.get("cf", "key").await.unwrap().is_none());

    // And a rewrite resurrects it.
    db.put("cf", "key", "reborn", None).await.unwrap();
    assert_eq!(db.get("cf", "key").await.unwrap().unwrap().as_ref(), b"reborn");
}

#[tokio::test]
async fn hash_memtable_family_behaves_identically() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).await.unwrap();
    db.create_family(
        "hashed",
        FamilyOptions {
            flush_threshold: 512,
            memtable: MemtableKind::HashTable,
            compression: CompressionAlgorithm::Snappy,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    for i in 0..80u32 {
        db.put("hashed", format!("key-{:03}", i), format!("v{}", i), None)
            .await
            .unwrap();
    }
    db.flush("hashed").await.unwrap();
    db.compact("hashed", 2).await.unwrap();

    for i in 0..80u32 {
        let value = db.get("hashed", format!("key-{:03}", i)).await.unwrap();
        assert_eq!(value.unwrap().as_ref(), format!("v{}", i).as_bytes());
    }

    // Cursor order must be sorted even though the memtable is a hash table.
    let mut cursor = db.cursor("hashed").await.unwrap();
    let mut keys = Vec::new();
    if let Some((key, _)) = cursor.get() {
        keys.push(key.to_vec());
        while cursor.next().unwrap() {
            keys.push(cursor.get().unwrap().0.to_vec());
        }
    }
    assert_eq!(keys.len(), 80);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn configuration_errors_reject_synchronously() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).await.unwrap();

    // Bad parameters: no state change.
    let err = db
        .create_family(
            "bad",
            FamilyOptions {
                flush_threshold: 0,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");
    assert!(db.families().is_empty());

    let err = db
        .create_family(
            "bad",
            FamilyOptions {
                memtable: MemtableKind::SkipList {
                    max_level: 0,
                    probability: 0.25,
                },
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");

    let err = db
        .create_family("a/b", FamilyOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");

    // Duplicates and unknowns are distinct errors.
    db.create_family("cf", FamilyOptions::default()).await.unwrap();
    let err = db
        .create_family("cf", FamilyOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "FAMILY_EXISTS");

    let err = db.drop_family("missing").await.unwrap_err();
    assert_eq!(err.error_code(), "FAMILY_NOT_FOUND");

    let err = db.get("missing", "k").await.unwrap_err();
    assert_eq!(err.error_code(), "FAMILY_NOT_FOUND");
}

#[tokio::test]
async fn families_are_isolated_keyspaces() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).await.unwrap();
    db.create_family("one", FamilyOptions::default()).await.unwrap();
    db.create_family("two", FamilyOptions::default()).await.unwrap();

    db.put("one", "shared-key", "from-one", None).await.unwrap();
    db.put("two", "shared-key", "from-two", None).await.unwrap();
    db.delete("one", "shared-key").await.unwrap();

    assert!(db.get("one", "shared-key").await.unwrap().is_none());
    assert_eq!(
        db.get("two", "shared-key").await.unwrap().unwrap().as_ref(),
        b"from-two"
    );
}

#[tokio::test]
async fn independent_databases_coexist() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let db_a = Database::open(dir_a.path()).await.unwrap();
    let db_b = Database::open(dir_b.path()).await.unwrap();

    db_a.create_family("cf", FamilyOptions::default()).await.unwrap();
    db_b.create_family("cf", FamilyOptions::default()).await.unwrap();

    db_a.put("cf", "k", "a", None).await.unwrap();
    db_b.put("cf", "k", "b", None).await.unwrap();

    assert_eq!(db_a.get("cf", "k").await.unwrap().unwrap().as_ref(), b"a");
    assert_eq!(db_b.get("cf", "k").await.unwrap().unwrap().as_ref(), b"b");
}

#[tokio::test]
async fn concurrent_writers_and_readers() {
    use std::sync::Arc;

    let dir = TempDir::new().unwrap();
    let db = Arc::new(Database::open(dir.path()).await.unwrap());
    db.create_family(
        "cf",
        FamilyOptions {
            flush_threshold: 4 * 1024,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let mut tasks = Vec::new();
    for writer in 0..4u32 {
        let db = Arc::clone(&db);
        tasks.push(tokio::spawn(async move {
            for i in 0..100u32 {
                db.put(
                    "cf",
                    format!("w{}-key-{:03}", writer, i),
                    format!("value-{}", i),
                    None,
                )
                .await
                .unwrap();
            }
        }));
    }
    for reader in 0..2u32 {
        let db = Arc::clone(&db);
        tasks.push(tokio::spawn(async move {
            for i in 0..100u32 {
                // Interleaved reads must never error, found or not.
                let _ = db
                    .get("cf", format!("w{}-key-{:03}", reader, i))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for writer in 0..4u32 {
        for i in 0..100u32 {
            let key = format!("w{}-key-{:03}", writer, i);
            assert!(db.get("cf", key).await.unwrap().is_some());
        }
    }
}
