//! Transactional partition creation.

use async_trait::async_trait;
use pgpart_core::value::quote_ident;
use pgpart_core::{PartitionBound, PartitionDdl, PartitionError, PartitionOptions, Result};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::primary_key_columns;
use crate::error::{db_error, definition_error, query_error};

/// [`PartitionDdl`] that runs every statement of one creation in a single
/// transaction: the child table, then its primary key if it has none.
#[derive(Debug, Clone)]
pub struct PgPartitionDdl {
    pool: PgPool,
}

impl PgPartitionDdl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PartitionDdl for PgPartitionDdl {
    async fn create_partition(
        &self,
        parent_table_name: &str,
        bound: &PartitionBound,
        options: &PartitionOptions,
    ) -> Result<String> {
        let child = options
            .name
            .clone()
            .unwrap_or_else(|| derive_child_name(parent_table_name));

        let mut tx = self.pool.begin().await.map_err(query_error)?;
        match create_in_transaction(&mut tx, parent_table_name, &child, bound, options).await {
            Ok(()) => {
                tx.commit().await.map_err(definition_error)?;
                Ok(child)
            }
            Err(e) => {
                warn!(
                    "Rolling back creation of partition '{}' of '{}': {}",
                    child, parent_table_name, e
                );
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback of '{}' failed: {}", child, rollback_err);
                }
                Err(PartitionError::Definition(db_error(e)))
            }
        }
    }
}

async fn create_in_transaction(
    tx: &mut Transaction<'_, Postgres>,
    parent: &str,
    child: &str,
    bound: &PartitionBound,
    options: &PartitionOptions,
) -> std::result::Result<(), sqlx::Error> {
    let create = create_partition_sql(parent, child, bound);
    debug!("Partition DDL: {}", create);
    sqlx::query(&create).execute(&mut **tx).await?;

    if !options.add_primary_key {
        return Ok(());
    }
    let Some(primary_key) = options.primary_key.as_deref() else {
        return Ok(());
    };
    // Children of a parent with a primary key already carry it.
    if !primary_key_columns(&mut **tx, child).await?.is_empty() {
        return Ok(());
    }
    let alter = add_primary_key_sql(child, primary_key);
    debug!("Partition DDL: {}", alter);
    sqlx::query(&alter).execute(&mut **tx).await?;
    Ok(())
}

pub fn create_partition_sql(parent: &str, child: &str, bound: &PartitionBound) -> String {
    format!(
        "CREATE TABLE {} PARTITION OF {} {}",
        quote_ident(child),
        quote_ident(parent),
        bound.to_sql()
    )
}

pub fn add_primary_key_sql(child: &str, primary_key: &str) -> String {
    format!(
        "ALTER TABLE {} ADD PRIMARY KEY ({})",
        quote_ident(child),
        quote_ident(primary_key)
    )
}

/// `<parent>_<7 hex chars>` for callers that do not name the child.
pub fn derive_child_name(parent: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", parent, &suffix[..7])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgpart_core::SqlValue;

    #[test]
    fn test_create_range_partition_sql() {
        let bound = PartitionBound::Range {
            start: SqlValue::from("2023-03-01"),
            end: SqlValue::from("2023-04-01"),
        };
        assert_eq!(
            create_partition_sql("events", "events_c", &bound),
            "CREATE TABLE \"events_c\" PARTITION OF \"events\" \
             FOR VALUES FROM ('2023-03-01') TO ('2023-04-01')"
        );
    }

    #[test]
    fn test_create_list_partition_sql() {
        let bound = PartitionBound::List {
            values: vec![SqlValue::from(1), SqlValue::from(2)],
        };
        assert_eq!(
            create_partition_sql("accounts", "accounts_a", &bound),
            "CREATE TABLE \"accounts_a\" PARTITION OF \"accounts\" FOR VALUES IN (1, 2)"
        );
    }

    #[test]
    fn test_add_primary_key_sql() {
        assert_eq!(
            add_primary_key_sql("events_c", "id"),
            "ALTER TABLE \"events_c\" ADD PRIMARY KEY (\"id\")"
        );
    }

    #[test]
    fn test_derived_child_name() {
        let a = derive_child_name("events");
        let b = derive_child_name("events");
        assert!(a.starts_with("events_"));
        assert_eq!(a.len(), "events_".len() + 7);
        assert!(a["events_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
