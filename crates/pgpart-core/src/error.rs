//! Typed errors for partition routing and partition lifecycle.

use std::fmt;

use thiserror::Error;

/// Broad class of a database-reported failure, derived from its SQLSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// `23514`: a row's partition key falls outside every partition bound.
    CheckViolation,
    /// `42P17`: invalid partition bound, including overlap with a sibling.
    InvalidObjectDefinition,
    /// `42P07`: a relation with the requested name already exists.
    DuplicateTable,
    /// `23505`
    UniqueViolation,
    /// `42P01`
    UndefinedTable,
    /// Connection, protocol, or any other statement failure.
    Other,
}

impl DbErrorKind {
    /// Classify a SQLSTATE code.
    pub fn from_sqlstate(code: &str) -> Self {
        match code {
            "23514" => DbErrorKind::CheckViolation,
            "42P17" => DbErrorKind::InvalidObjectDefinition,
            "42P07" => DbErrorKind::DuplicateTable,
            "23505" => DbErrorKind::UniqueViolation,
            "42P01" => DbErrorKind::UndefinedTable,
            _ => DbErrorKind::Other,
        }
    }
}

impl fmt::Display for DbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DbErrorKind::CheckViolation => "check violation",
            DbErrorKind::InvalidObjectDefinition => "invalid object definition",
            DbErrorKind::DuplicateTable => "duplicate table",
            DbErrorKind::UniqueViolation => "unique violation",
            DbErrorKind::UndefinedTable => "undefined table",
            DbErrorKind::Other => "statement failed",
        };
        f.write_str(label)
    }
}

/// A failure reported by the database driver, kept close to what the driver said.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}: {message}", sqlstate_suffix(.sqlstate))]
pub struct DbError {
    pub kind: DbErrorKind,
    pub sqlstate: Option<String>,
    pub message: String,
}

fn sqlstate_suffix(sqlstate: &Option<String>) -> String {
    sqlstate
        .as_deref()
        .map(|code| format!(" ({code})"))
        .unwrap_or_default()
}

impl DbError {
    pub fn new(sqlstate: Option<String>, message: impl Into<String>) -> Self {
        let kind = sqlstate
            .as_deref()
            .map(DbErrorKind::from_sqlstate)
            .unwrap_or(DbErrorKind::Other);
        Self {
            kind,
            sqlstate,
            message: message.into(),
        }
    }

    /// A failure with no SQLSTATE, e.g. a dropped connection.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

/// Errors surfaced by partition-aware operations.
///
/// Database failures are never retried or swallowed; they are wrapped in the
/// variant naming the stage that issued the statement.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// A simple-key shorthand was called on an entity with a complex key.
    #[error("{operation} not available for complex partition keys")]
    ComplexKeyUnsupported { operation: &'static str },

    /// A query against the system catalog failed.
    #[error("catalog query failed: {0}")]
    Catalog(#[source] DbError),

    /// The database rejected a create-partition statement.
    #[error("partition definition rejected: {0}")]
    Definition(#[source] DbError),

    /// A data query or statement failed.
    #[error("query failed: {0}")]
    Query(#[source] DbError),
}

impl PartitionError {
    /// The underlying database error, if this failure came from the database.
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            PartitionError::ComplexKeyUnsupported { .. } => None,
            PartitionError::Catalog(e) | PartitionError::Definition(e) | PartitionError::Query(e) => {
                Some(e)
            }
        }
    }

    /// Shorthand for `db_error().map(|e| e.kind)`.
    pub fn db_kind(&self) -> Option<DbErrorKind> {
        self.db_error().map(|e| e.kind)
    }
}

pub type Result<T> = std::result::Result<T, PartitionError>;
