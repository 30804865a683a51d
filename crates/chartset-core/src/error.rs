//! Error types shared across the chartset crates

use thiserror::Error;

/// Result type for query and staging operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors that can occur while staging id sets, building queries, or reading results
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// A caller-supplied argument was rejected
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A query was configured incorrectly (unknown entity, undeclared join alias, missing FROM)
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The backing store failed; never retried, always surfaced
    #[error("data access failure: {message}")]
    DataAccess { message: String },

    /// A query failed and releasing its staged id sets failed as well
    #[error("{primary}; releasing staged id sets also failed: {cleanup}")]
    CleanupAfterFailure {
        primary: Box<QueryError>,
        cleanup: Box<QueryError>,
    },
}

impl QueryError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a data access error
    pub fn data_access(message: impl Into<String>) -> Self {
        Self::DataAccess {
            message: message.into(),
        }
    }

    /// Combine a primary failure with a failure from the cleanup path
    pub fn cleanup_after_failure(primary: QueryError, cleanup: QueryError) -> Self {
        Self::CleanupAfterFailure {
            primary: Box::new(primary),
            cleanup: Box::new(cleanup),
        }
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::DataAccess {
            message: e.to_string(),
        }
    }
}
