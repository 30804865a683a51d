//! Query session: a connection to the record store plus the shared staging store

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use rusqlite::Connection;

use chartset_core::{IdSetStore, QueryColumn, QueryResult, RowSet};

/// Contract shared by the query backends: registered output columns and
/// execution against a session
pub trait QueryBuilder {
    /// The registered output columns, in order
    fn columns(&self) -> &[QueryColumn];

    /// Stage registered id sets, run the query, release what was acquired
    fn execute(&self, session: &Session) -> QueryResult<RowSet>;
}

/// One consumer's handle on the record store.
///
/// Sessions are per-thread; the [`IdSetStore`] behind the `Arc` is the shared
/// piece, and many sessions against the same database may share it.
pub struct Session {
    conn: Connection,
    store: Arc<IdSetStore>,
}

impl Session {
    /// Wrap an existing connection, ensuring the staging schema exists
    pub fn new(conn: Connection, store: Arc<IdSetStore>) -> QueryResult<Self> {
        store.ensure_schema(&conn)?;
        Ok(Self { conn, store })
    }

    /// Open a session against a database file
    pub fn open(path: impl AsRef<Path>, store: Arc<IdSetStore>) -> QueryResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::new(conn, store)
    }

    /// Open a session against a private in-memory database
    pub fn open_in_memory(store: Arc<IdSetStore>) -> QueryResult<Self> {
        Self::new(Connection::open_in_memory()?, store)
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The shared staging store
    pub fn store(&self) -> &IdSetStore {
        &self.store
    }

    /// Execute a built query, logging elapsed time
    pub fn evaluate(&self, query: &dyn QueryBuilder) -> QueryResult<RowSet> {
        let started = Instant::now();
        let result = query.execute(self);
        debug!("primary query executed in {:?}", started.elapsed());
        result
    }
}
