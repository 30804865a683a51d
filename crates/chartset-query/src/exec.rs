//! Shared execution protocol for the query backends
//!
//! Every id set registered on a builder is acquired before the query runs and
//! released afterwards, on success and failure alike. Ownership rule: an
//! execution releases exactly the references it acquired, never a staged copy
//! a concurrent sibling is still joining against.

use log::{debug, warn};

use chartset_core::{IdSet, QueryColumn, QueryError, QueryResult, RowSet, StagingKey, Value};

use crate::session::Session;

/// Acquire `id_sets`, run `query`, then release what was acquired.
///
/// A cleanup failure after success becomes the failure; a cleanup failure
/// after a primary failure is reported alongside it.
pub(crate) fn with_staged_id_sets(
    session: &Session,
    id_sets: &[IdSet],
    query: impl FnOnce(&Session) -> QueryResult<RowSet>,
) -> QueryResult<RowSet> {
    let mut acquired: Vec<StagingKey> = Vec::with_capacity(id_sets.len());
    let mut primary: Option<QueryError> = None;
    for ids in id_sets {
        match session.store().acquire(session.connection(), ids) {
            Ok(key) => acquired.push(key),
            Err(e) => {
                primary = Some(e);
                break;
            }
        }
    }

    let mut result = match primary {
        Some(e) => Err(e),
        None => query(session),
    };

    let mut cleanup: Option<QueryError> = None;
    for key in acquired {
        if let Err(e) = session.store().release(session.connection(), key) {
            warn!("failed to release staged id set {key}: {e}");
            cleanup.get_or_insert(e);
        }
    }
    if let Some(cleanup) = cleanup {
        result = match result {
            Ok(_) => Err(cleanup),
            Err(primary) => Err(QueryError::cleanup_after_failure(primary, cleanup)),
        };
    }
    result
}

/// Run a rendered SQL query and decode rows per the declared column types
pub(crate) fn run_query(
    session: &Session,
    sql: &str,
    params: &[Value],
    columns: &[QueryColumn],
) -> QueryResult<RowSet> {
    debug!("executing query: {sql}");
    let mut stmt = session.connection().prepare(sql)?;
    let mut raw_rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut result = RowSet::new(columns.to_vec());
    while let Some(row) = raw_rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            values.push(Value::decode(row.get_ref(i)?, column.datatype)?);
        }
        result.add_row(values)?;
    }
    Ok(result)
}
