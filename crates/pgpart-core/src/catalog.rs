//! Interfaces to the database: catalog introspection and partition DDL.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::value::{flatten, join_sql, SqlValue};

/// Read-only view of the database catalog. No caching happens here.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Child tables of `table_name`, in the order the catalog reports them.
    /// An unknown table has no partitions.
    async fn partitions_of(&self, table_name: &str) -> Result<Vec<String>>;

    async fn table_exists(&self, table_name: &str) -> Result<bool>;

    /// Primary-key columns of `table_name`, in key order. Empty if none.
    async fn primary_key_of(&self, table_name: &str) -> Result<Vec<String>>;
}

/// Issues create-partition statements.
#[async_trait]
pub trait PartitionDdl: Send + Sync {
    /// Create a child partition of `parent_table_name` and return its name.
    /// Either every statement takes effect or none does.
    async fn create_partition(
        &self,
        parent_table_name: &str,
        bound: &PartitionBound,
        options: &PartitionOptions,
    ) -> Result<String>;
}

/// The key values a new partition accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionBound {
    /// Half-open `[start, end)`.
    Range { start: SqlValue, end: SqlValue },
    List { values: Vec<SqlValue> },
}

impl PartitionBound {
    /// The `FOR VALUES ...` clause of `CREATE TABLE ... PARTITION OF`.
    pub fn to_sql(&self) -> String {
        match self {
            PartitionBound::Range { start, end } => format!(
                "FOR VALUES FROM ({}) TO ({})",
                start.to_sql_bare(),
                end.to_sql_bare()
            ),
            PartitionBound::List { values } => {
                format!("FOR VALUES IN ({})", join_sql(&flatten(values)))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PartitionBound::Range { .. } => "range",
            PartitionBound::List { .. } => "list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionOptions {
    /// Child table name. Derived from the parent name when absent.
    pub name: Option<String>,
    /// Primary key to add to the child if it did not inherit one.
    pub primary_key: Option<String>,
    pub add_primary_key: bool,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            name: None,
            primary_key: None,
            add_primary_key: true,
        }
    }
}

impl PartitionOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn without_primary_key(mut self) -> Self {
        self.add_primary_key = false;
        self
    }
}
