//! Core types for clinical dataset generation
//!
//! This crate provides:
//! - Id sets and cohorts (membership filtering units)
//! - The id-set staging store (shared, reference-counted cache of
//!   materialized id sets, joinable from SQL)
//! - Scalar values and typed row decoding
//! - The tabular [`RowSet`] result holder

pub mod error;
pub mod idset;
pub mod result;
pub mod staging;
pub mod value;

pub use error::{QueryError, QueryResult};
pub use idset::{Cohort, IdSet};
pub use result::{QueryColumn, RowSet};
pub use staging::{IdSetStore, STAGING_TABLE, StagingKey, staging_key};
pub use value::{ColumnType, FromValue, Value};
