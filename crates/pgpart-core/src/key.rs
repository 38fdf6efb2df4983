//! Partition key classification.

use crate::value::quote_ident;

/// The column or expression that decides which partition a row lands in.
///
/// The variant is fixed when the entity is declared; predicate building
/// branches on it and never re-derives it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionKey {
    /// A single plain column.
    Simple(String),
    /// An ordered tuple of SQL expressions, already rendered
    /// (quoted identifiers or arbitrary deterministic expressions).
    Complex(Vec<String>),
}

impl PartitionKey {
    pub fn simple(column: impl Into<String>) -> Self {
        PartitionKey::Simple(column.into())
    }

    /// Key made of plain columns. One column is a simple key, more is a tuple.
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cols: Vec<String> = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
        if cols.len() == 1 {
            PartitionKey::Simple(cols.remove(0))
        } else {
            PartitionKey::Complex(cols.iter().map(|c| quote_ident(c)).collect())
        }
    }

    /// Key made of raw SQL expressions, e.g. `EXTRACT(YEAR FROM created_at)::int`.
    /// Always complex, even with a single expression.
    pub fn expression<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PartitionKey::Complex(parts.into_iter().map(Into::into).collect())
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, PartitionKey::Complex(_))
    }

    /// Render for use inside SQL. Complex keys come without the surrounding
    /// parentheses; callers wrap them.
    pub fn to_sql(&self) -> String {
        match self {
            PartitionKey::Simple(col) => quote_ident(col),
            PartitionKey::Complex(parts) => parts.join(", "),
        }
    }
}
