//! SQL values used in partition predicates and partition bounds.
//!
//! A value is either a literal, quoted on rendering, or a [`SqlValue::Raw`]
//! fragment that is spliced in verbatim. Keeping the two apart lets bound
//! keywords such as `MINVALUE` pass through without being turned into strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    /// One value of a composite key, e.g. `(2023, 5)`.
    Tuple(Vec<SqlValue>),
    /// A group of values, expanded by [`flatten`].
    List(Vec<SqlValue>),
    /// Trusted SQL fragment, never quoted.
    Raw(String),
}

impl SqlValue {
    pub fn raw(sql: impl Into<String>) -> Self {
        SqlValue::Raw(sql.into())
    }

    pub fn tuple<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        SqlValue::Tuple(values.into_iter().map(Into::into).collect())
    }

    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        SqlValue::List(values.into_iter().map(Into::into).collect())
    }

    /// Render as a SQL literal. Tuples keep their parentheses.
    pub fn to_sql(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => format_number(*f),
            SqlValue::Text(s) => quote_literal(s),
            SqlValue::Date(d) => quote_literal(&d.format("%Y-%m-%d").to_string()),
            SqlValue::Timestamp(ts) => {
                quote_literal(&ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
            SqlValue::TimestampTz(ts) => quote_literal(&ts.to_rfc3339()),
            SqlValue::Tuple(_) => format!("({})", self.to_sql_bare()),
            SqlValue::List(_) => self.to_sql_bare(),
            SqlValue::Raw(sql) => sql.clone(),
        }
    }

    /// Render without the outer parentheses of a tuple, for positions that
    /// already supply them: `(k1, k2) = (v1, v2)`, `FROM (v1, v2)`.
    pub fn to_sql_bare(&self) -> String {
        match self {
            SqlValue::Tuple(items) => join_sql(items),
            SqlValue::List(items) => join_sql(&flatten(items)),
            other => other.to_sql(),
        }
    }
}

/// Expand nested [`SqlValue::List`] groups into a single flat sequence.
/// Tuples are values in their own right and are left intact.
pub fn flatten(values: &[SqlValue]) -> Vec<SqlValue> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            SqlValue::List(inner) => out.extend(flatten(inner)),
            other => out.push(other.clone()),
        }
    }
    out
}

/// Comma-join rendered values.
pub fn join_sql(values: &[SqlValue]) -> String {
    values
        .iter()
        .map(SqlValue::to_sql)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "'NaN'".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "'Infinity'" } else { "'-Infinity'" }).to_string()
    } else if n == n.floor() && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::TimestampTz(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}
