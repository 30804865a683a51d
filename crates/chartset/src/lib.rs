//! Tabular dataset generation over clinical record stores
//!
//! Re-exports the public API of the chartset crates:
//!
//! - `chartset-core`: id sets, the staging store, scalar values, and the
//!   [`RowSet`] result holder
//! - `chartset-query`: the [`CriteriaQuery`] and [`SqlQuery`] builders, the
//!   entity [`ModelRegistry`], and the [`Session`] they execute against
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chartset::{CriteriaQuery, IdSet, IdSetStore, ModelRegistry, Session};
//!
//! # fn main() -> Result<(), chartset::QueryError> {
//! let store = Arc::new(IdSetStore::new());
//! let registry = ModelRegistry::from_json_file("models.json")?;
//! let session = Session::open("records.db", store)?;
//!
//! let cohort: IdSet = [101, 205, 307].into();
//! let result = session.evaluate(
//!     &CriteriaQuery::new(&registry, "Encounter")?
//!         .select_columns(["encounter_id", "visit_date"])
//!         .where_id_in("patient_id", &cohort),
//! )?;
//! let encounter_ids: Vec<i64> = result.value_list("encounter_id")?;
//! # Ok(())
//! # }
//! ```

pub use chartset_core::{
    Cohort, ColumnType, FromValue, IdSet, IdSetStore, QueryColumn, QueryError, QueryResult,
    RowSet, STAGING_TABLE, StagingKey, Value, staging_key,
};
pub use chartset_query::{
    CriteriaQuery, Direction, EntityModel, JoinKind, ModelRegistry, Operand, QueryBuilder,
    Session, SqlQuery,
};
