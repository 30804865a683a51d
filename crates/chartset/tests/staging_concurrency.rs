//! Concurrency tests for the shared id-set staging store
//!
//! Sessions are per-thread; the store (and its usage registry) is the shared
//! piece. These tests run real connections against one database file.

use std::sync::Arc;
use std::thread;

use chartset::{IdSet, IdSetStore, STAGING_TABLE, Session, staging_key};

fn staged_rows(session: &Session, key: i64) -> i64 {
    session
        .connection()
        .query_row(
            &format!("SELECT count(*) FROM {STAGING_TABLE} WHERE staging_key = ?1"),
            [key],
            |row| row.get(0),
        )
        .unwrap()
}

#[test]
fn overlapping_holders_share_one_staged_copy() {
    let db = tempfile::NamedTempFile::new().unwrap();
    let store = Arc::new(IdSetStore::new());
    let first = Session::open(db.path(), store.clone()).unwrap();
    let second = Session::open(db.path(), store.clone()).unwrap();

    let ids: IdSet = (0..2_000).collect();
    let key = store.acquire(first.connection(), &ids).unwrap();
    assert_eq!(store.acquire(second.connection(), &ids).unwrap(), key);
    assert_eq!(staged_rows(&first, key), 2_000);

    // first holder releases; the second still holds a reference
    store.release(first.connection(), key).unwrap();
    assert_eq!(staged_rows(&second, key), 2_000);
    assert!(store.currently_used_keys().contains(&key));

    store.release(second.connection(), key).unwrap();
    assert_eq!(staged_rows(&second, key), 0);
    assert!(store.currently_used_keys().is_empty());
}

#[test]
fn concurrent_stagers_of_distinct_content_never_cross_delete() {
    let db = tempfile::NamedTempFile::new().unwrap();
    let store = Arc::new(IdSetStore::new());
    // create the schema before the threads race to open sessions
    Session::open(db.path(), store.clone()).unwrap();

    let sets: Vec<IdSet> = (0..4u32)
        .map(|n| (n * 1_000..n * 1_000 + 500).collect())
        .collect();

    thread::scope(|scope| {
        for ids in &sets {
            let store = store.clone();
            let path = db.path();
            scope.spawn(move || {
                let session = Session::open(path, store.clone()).unwrap();
                for _ in 0..20 {
                    let key = store.acquire(session.connection(), ids).unwrap();
                    assert_eq!(staged_rows(&session, key), 500);
                    store.release(session.connection(), key).unwrap();
                }
            });
        }
    });

    let session = Session::open(db.path(), store.clone()).unwrap();
    for ids in &sets {
        assert_eq!(staged_rows(&session, staging_key(ids)), 0);
    }
    assert!(store.currently_used_keys().is_empty());
}

#[test]
fn concurrent_stagers_of_identical_content_converge() {
    let db = tempfile::NamedTempFile::new().unwrap();
    let store = Arc::new(IdSetStore::new());
    Session::open(db.path(), store.clone()).unwrap();

    let ids: IdSet = (0..3_000).collect();
    let key = staging_key(&ids);

    thread::scope(|scope| {
        for _ in 0..4 {
            let store = store.clone();
            let ids = ids.clone();
            let path = db.path();
            scope.spawn(move || {
                let session = Session::open(path, store.clone()).unwrap();
                let acquired = store.acquire(session.connection(), &ids).unwrap();
                assert_eq!(acquired, key);
                // every holder sees one complete copy, never a partial one
                assert_eq!(staged_rows(&session, key), 3_000);
                store.release(session.connection(), acquired).unwrap();
            });
        }
    });

    let session = Session::open(db.path(), store).unwrap();
    assert_eq!(staged_rows(&session, key), 0);
}
