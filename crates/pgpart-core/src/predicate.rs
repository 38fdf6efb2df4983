//! Partition-key predicates.
//!
//! A simple key compares its column directly. A complex key (tuple or
//! expression) is compared as a row value inside a subquery over the parent
//! table, and the outer query filters on primary-key membership in that
//! subquery.

use crate::entity::{Entity, TableTarget};
use crate::error::{PartitionError, Result};
use crate::key::PartitionKey;
use crate::value::{flatten, join_sql, quote_ident, SqlValue};

pub const COLUMN_EQ_OPERATION: &str = "partition_key_column_eq";
pub const COLUMN_IN_OPERATION: &str = "partition_key_column_in";

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`
    Eq { column: String, value: SqlValue },
    /// `column >= start AND column < end`
    Range {
        column: String,
        start: SqlValue,
        end: SqlValue,
    },
    /// `column IN (values)`
    In { column: String, values: Vec<SqlValue> },
    /// `(key) = (value)` for a rendered tuple/expression key.
    TupleEq { key: String, value: SqlValue },
    /// `(key) >= (start) AND (key) < (end)`
    TupleRange {
        key: String,
        start: SqlValue,
        end: SqlValue,
    },
    /// `(key) IN (values)`
    TupleIn { key: String, values: Vec<SqlValue> },
    /// `column IN (subquery)`
    InSubquery { column: String, subquery: String },
    And(Vec<Predicate>),
    Raw(String),
}

impl Predicate {
    pub fn to_sql(&self) -> String {
        match self {
            Predicate::Eq { column, value } => match value {
                SqlValue::Null => format!("{} IS NULL", quote_ident(column)),
                v => format!("{} = {}", quote_ident(column), v.to_sql()),
            },
            Predicate::Range { column, start, end } => {
                let col = quote_ident(column);
                format!(
                    "({} >= {} AND {} < {})",
                    col,
                    start.to_sql(),
                    col,
                    end.to_sql()
                )
            }
            Predicate::In { column, values } => {
                if values.is_empty() {
                    return "1=0".to_string();
                }
                format!("{} IN ({})", quote_ident(column), join_sql(values))
            }
            Predicate::TupleEq { key, value } => {
                format!("({}) = ({})", key, value.to_sql_bare())
            }
            Predicate::TupleRange { key, start, end } => format!(
                "(({}) >= ({}) AND ({}) < ({}))",
                key,
                start.to_sql_bare(),
                key,
                end.to_sql_bare()
            ),
            Predicate::TupleIn { key, values } => {
                if values.is_empty() {
                    return "1=0".to_string();
                }
                format!("({}) IN ({})", key, join_sql(values))
            }
            Predicate::InSubquery { column, subquery } => {
                format!("{} IN ({})", quote_ident(column), subquery)
            }
            Predicate::And(parts) => {
                if parts.is_empty() {
                    return "1=1".to_string();
                }
                let joined = parts
                    .iter()
                    .map(Predicate::to_sql)
                    .collect::<Vec<_>>()
                    .join(" AND ");
                format!("({})", joined)
            }
            Predicate::Raw(sql) => sql.clone(),
        }
    }
}

/// Join predicates into a ` WHERE ...` clause. Empty input yields an empty string.
pub fn where_clause(predicates: &[Predicate]) -> String {
    if predicates.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = predicates.iter().map(Predicate::to_sql).collect();
    format!(" WHERE {}", parts.join(" AND "))
}

/// Builds partition-key predicates for one entity.
pub struct PredicateBuilder<'a> {
    entity: &'a Entity,
    primary_key: String,
}

impl<'a> PredicateBuilder<'a> {
    /// Complex-key subqueries select the entity's declared primary key.
    pub fn new(entity: &'a Entity) -> Self {
        Self {
            entity,
            primary_key: entity.primary_key().to_string(),
        }
    }

    /// Select `primary_key` in complex-key subqueries instead.
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Partition key equals `value`. For a complex key, `value` is usually a
    /// [`SqlValue::Tuple`].
    pub fn eq(&self, value: SqlValue) -> Predicate {
        match self.entity.partition_key() {
            PartitionKey::Simple(column) => Predicate::Eq {
                column: column.clone(),
                value,
            },
            key @ PartitionKey::Complex(_) => self.via_subquery(Predicate::TupleEq {
                key: key.to_sql(),
                value,
            }),
        }
    }

    /// Partition key in the half-open range `[start, end)`.
    pub fn range(&self, start: SqlValue, end: SqlValue) -> Predicate {
        match self.entity.partition_key() {
            PartitionKey::Simple(column) => Predicate::Range {
                column: column.clone(),
                start,
                end,
            },
            key @ PartitionKey::Complex(_) => self.via_subquery(Predicate::TupleRange {
                key: key.to_sql(),
                start,
                end,
            }),
        }
    }

    /// Partition key is one of `values`, after flattening nested lists.
    pub fn list(&self, values: &[SqlValue]) -> Predicate {
        let values = flatten(values);
        match self.entity.partition_key() {
            PartitionKey::Simple(column) => Predicate::In {
                column: column.clone(),
                values,
            },
            key @ PartitionKey::Complex(_) => self.via_subquery(Predicate::TupleIn {
                key: key.to_sql(),
                values,
            }),
        }
    }

    /// Column equality shorthand, only for simple keys.
    pub fn column_eq(&self, value: SqlValue) -> Result<Predicate> {
        self.require_simple(COLUMN_EQ_OPERATION)?;
        Ok(self.eq(value))
    }

    /// Two-bound range shorthand, only for simple keys. A pair of scalars
    /// cannot describe a tuple bound unambiguously.
    pub fn column_range(&self, start: SqlValue, end: SqlValue) -> Result<Predicate> {
        self.require_simple(COLUMN_IN_OPERATION)?;
        Ok(self.range(start, end))
    }

    fn require_simple(&self, operation: &'static str) -> Result<()> {
        if self.entity.partition_key().is_complex() {
            return Err(PartitionError::ComplexKeyUnsupported { operation });
        }
        Ok(())
    }

    /// `pk IN (SELECT pk FROM parent WHERE <inner>)`
    fn via_subquery(&self, inner: Predicate) -> Predicate {
        let pk = &self.primary_key;
        let subquery = format!(
            "SELECT {} FROM {} WHERE {}",
            quote_ident(pk),
            quote_ident(self.entity.table_name()),
            inner.to_sql()
        );
        Predicate::InSubquery {
            column: pk.clone(),
            subquery,
        }
    }
}
