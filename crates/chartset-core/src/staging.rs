//! Id-set staging store
//!
//! Testing `entity_id IN (...)` against thousands of inline literals is slow
//! and runs into bind-parameter limits. The store materializes an [`IdSet`]
//! once into a shared table keyed by a content-derived key, so any number of
//! downstream queries can join against it, and reference counting lets
//! overlapping evaluations share one staged copy safely.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use log::debug;
use parking_lot::Mutex;
use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::error::QueryResult;
use crate::idset::IdSet;

/// Key identifying a staged id set; equal content yields an equal key
pub type StagingKey = i64;

/// Name of the shared staging table
pub const STAGING_TABLE: &str = "idset_staging";

/// Rows per INSERT statement when materializing members
const INSERT_CHUNK_ROWS: usize = 500;

/// Derive the staging key for an id set.
///
/// Truncated SHA-256 over the sorted little-endian member encoding, masked
/// non-negative. Deterministic across processes and defined for the empty set.
pub fn staging_key(ids: &IdSet) -> StagingKey {
    let mut hasher = Sha256::new();
    for id in ids.iter() {
        hasher.update(id.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(prefix) & (i64::MAX as u64)) as i64
}

/// Shared, reference-counted cache of materialized id sets.
///
/// The usage registry is owned exclusively by the store and mutated only by
/// [`acquire`](IdSetStore::acquire) and [`release`](IdSetStore::release).
/// Callers supply their own connection to the shared database; the store
/// itself is cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct IdSetStore {
    in_use: Mutex<HashMap<StagingKey, usize>>,
}

impl IdSetStore {
    /// Create a store with an empty usage registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the staging table if it does not exist
    pub fn ensure_schema(&self, conn: &Connection) -> QueryResult<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {STAGING_TABLE} (
                staging_key INTEGER NOT NULL,
                member_id INTEGER NOT NULL,
                PRIMARY KEY (staging_key, member_id)
            ) WITHOUT ROWID;"
        ))?;
        Ok(())
    }

    /// The staging key for the given id set
    pub fn key_for(&self, ids: &IdSet) -> StagingKey {
        staging_key(ids)
    }

    /// Whether rows for the given key exist in the staging table
    pub fn is_staged(&self, conn: &Connection, key: StagingKey) -> QueryResult<bool> {
        Ok(self.row_count(conn, key)? > 0)
    }

    /// Materialize the id set if it is not already staged.
    ///
    /// Returns the key and whether any rows were newly inserted. Serialized
    /// through the store mutex, so concurrent stagers of identical content
    /// converge to one staged copy.
    pub fn stage(&self, conn: &Connection, ids: &IdSet) -> QueryResult<(StagingKey, bool)> {
        let key = staging_key(ids);
        let _registry = self.in_use.lock();
        let newly_staged = self.stage_rows(conn, key, ids)?;
        Ok((key, newly_staged))
    }

    /// Take a reference on the id set, staging it first if needed.
    ///
    /// The reference must be returned with [`release`](IdSetStore::release)
    /// once the evaluation holding it completes.
    pub fn acquire(&self, conn: &Connection, ids: &IdSet) -> QueryResult<StagingKey> {
        let key = staging_key(ids);
        let mut registry = self.in_use.lock();
        let current = registry.get(&key).copied().unwrap_or(0);
        if current == 0 {
            self.stage_rows(conn, key, ids)?;
        }
        registry.insert(key, current + 1);
        debug!("acquired id set {key}; references: {}", current + 1);
        Ok(key)
    }

    /// Return a reference on the key; the last release deletes the staged rows.
    ///
    /// Releasing a key with no outstanding references is a safe no-op.
    pub fn release(&self, conn: &Connection, key: StagingKey) -> QueryResult<()> {
        let mut registry = self.in_use.lock();
        let Some(current) = registry.get(&key).copied() else {
            debug!("release of unreferenced id set {key} ignored");
            return Ok(());
        };
        if current > 1 {
            registry.insert(key, current - 1);
            debug!("released id set {key}; references: {}", current - 1);
            return Ok(());
        }
        // Delete before dropping the registry entry so a failed delete can be
        // retried with the reference still held.
        self.delete_rows(conn, key)?;
        registry.remove(&key);
        debug!("released and deleted id set {key}");
        Ok(())
    }

    /// Keys with outstanding references, for diagnostics
    pub fn currently_used_keys(&self) -> BTreeSet<StagingKey> {
        self.in_use.lock().keys().copied().collect()
    }

    /// Insert member rows for the key unless rows already exist.
    ///
    /// Caller must hold the registry mutex. Literal multi-row VALUES chunks
    /// inside one transaction: no bind-parameter limit, and no half-populated
    /// state is ever visible outside the transaction.
    fn stage_rows(&self, conn: &Connection, key: StagingKey, ids: &IdSet) -> QueryResult<bool> {
        if self.row_count(conn, key)? > 0 {
            debug!("id set {key} already staged; reusing existing rows");
            return Ok(false);
        }
        if ids.is_empty() {
            return Ok(false);
        }
        let tx = conn.unchecked_transaction()?;
        let mut members = ids.iter().peekable();
        while members.peek().is_some() {
            let mut sql =
                format!("INSERT OR IGNORE INTO {STAGING_TABLE} (staging_key, member_id) VALUES ");
            for (i, id) in members.by_ref().take(INSERT_CHUNK_ROWS).enumerate() {
                if i > 0 {
                    sql.push(',');
                }
                let _ = write!(sql, "({key},{id})");
            }
            tx.execute_batch(&sql)?;
        }
        tx.commit()?;
        debug!("staged id set {key}; members: {}", ids.len());
        Ok(true)
    }

    fn delete_rows(&self, conn: &Connection, key: StagingKey) -> QueryResult<()> {
        let deleted = conn.execute(
            &format!("DELETE FROM {STAGING_TABLE} WHERE staging_key = ?1"),
            [key],
        )?;
        debug!("deleted {deleted} staged rows for id set {key}");
        Ok(())
    }

    fn row_count(&self, conn: &Connection, key: StagingKey) -> QueryResult<i64> {
        let count = conn.query_row(
            &format!("SELECT count(*) FROM {STAGING_TABLE} WHERE staging_key = ?1"),
            [key],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store_and_conn() -> (IdSetStore, Connection) {
        let conn = Connection::open_in_memory().unwrap();
        let store = IdSetStore::new();
        store.ensure_schema(&conn).unwrap();
        (store, conn)
    }

    #[test]
    fn key_depends_only_on_content() {
        let a: IdSet = [5, 1, 9].into();
        let b: IdSet = vec![9u32, 5, 1].into_iter().collect();
        assert_eq!(staging_key(&a), staging_key(&b));
        assert_ne!(staging_key(&a), staging_key(&[5, 1].into()));
    }

    #[test]
    fn key_is_defined_for_the_empty_set() {
        assert!(staging_key(&IdSet::new()) >= 0);
    }

    #[test]
    fn no_collisions_across_many_small_sets() {
        let mut keys = BTreeSet::new();
        for start in 0..1000u32 {
            let ids: IdSet = (start..start + 50).collect();
            assert!(keys.insert(staging_key(&ids)));
        }
    }

    #[test]
    fn stage_inserts_once_and_reuses() {
        let (store, conn) = store_and_conn();
        let ids: IdSet = [1, 2, 3].into();
        let (key, newly) = store.stage(&conn, &ids).unwrap();
        assert!(newly);
        assert!(store.is_staged(&conn, key).unwrap());
        let (again, newly) = store.stage(&conn, &ids).unwrap();
        assert_eq!(again, key);
        assert!(!newly);
    }

    #[test]
    fn release_of_unreferenced_key_is_a_noop() {
        let (store, conn) = store_and_conn();
        store.release(&conn, 12345).unwrap();
        assert!(store.currently_used_keys().is_empty());
    }

    #[test]
    fn acquire_twice_release_once_keeps_rows() {
        let (store, conn) = store_and_conn();
        let ids: IdSet = [10, 20, 30].into();
        let key = store.acquire(&conn, &ids).unwrap();
        assert_eq!(store.acquire(&conn, &ids).unwrap(), key);

        store.release(&conn, key).unwrap();
        assert!(store.is_staged(&conn, key).unwrap());
        assert!(store.currently_used_keys().contains(&key));

        store.release(&conn, key).unwrap();
        assert!(!store.is_staged(&conn, key).unwrap());
        assert!(store.currently_used_keys().is_empty());
    }

    #[test]
    fn staging_a_large_set_crosses_chunk_boundaries() {
        let (store, conn) = store_and_conn();
        let ids: IdSet = (0..1501).collect();
        let (key, newly) = store.stage(&conn, &ids).unwrap();
        assert!(newly);
        let count: i64 = conn
            .query_row(
                &format!("SELECT count(*) FROM {STAGING_TABLE} WHERE staging_key = ?1"),
                [key],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1501);
    }

    #[test]
    fn empty_set_stages_no_rows() {
        let (store, conn) = store_and_conn();
        let key = store.acquire(&conn, &IdSet::new()).unwrap();
        assert!(!store.is_staged(&conn, key).unwrap());
        assert!(store.currently_used_keys().contains(&key));
        store.release(&conn, key).unwrap();
        assert!(store.currently_used_keys().is_empty());
    }
}
