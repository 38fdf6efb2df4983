//! Mapping from `sqlx` errors to the partition error taxonomy.

use pgpart_core::{DbError, PartitionError};

/// Keep the SQLSTATE when the server reported one, so callers can tell an
/// overlapping bound from a duplicate name from a dropped connection.
pub fn db_error(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Database(db) => {
            DbError::new(db.code().map(|code| code.into_owned()), db.message())
        }
        other => DbError::other(other.to_string()),
    }
}

pub(crate) fn catalog_error(err: sqlx::Error) -> PartitionError {
    PartitionError::Catalog(db_error(err))
}

pub(crate) fn definition_error(err: sqlx::Error) -> PartitionError {
    PartitionError::Definition(db_error(err))
}

pub(crate) fn query_error(err: sqlx::Error) -> PartitionError {
    PartitionError::Query(db_error(err))
}
