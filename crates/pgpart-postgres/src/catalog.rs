//! Catalog introspection through `pg_inherits`, `pg_class` and `pg_index`.
//!
//! Table names are matched exactly against `pg_class.relname` among
//! relations visible on the current `search_path`.

use async_trait::async_trait;
use pgpart_core::{Catalog, Result};
use sqlx::postgres::PgExecutor;
use sqlx::PgPool;
use tracing::debug;

use crate::error::catalog_error;

const PARTITIONS_SQL: &str = r#"
    SELECT child.relname::text
    FROM pg_inherits
    INNER JOIN pg_class parent ON parent.oid = pg_inherits.inhparent
    INNER JOIN pg_class child ON child.oid = pg_inherits.inhrelid
    WHERE parent.relname = $1
      AND pg_table_is_visible(parent.oid)
"#;

const TABLE_EXISTS_SQL: &str = r#"
    SELECT EXISTS (
        SELECT 1
        FROM pg_class
        WHERE relname = $1
          AND relkind IN ('r', 'p')
          AND pg_table_is_visible(oid)
    )
"#;

const PRIMARY_KEY_SQL: &str = r#"
    SELECT attr.attname::text
    FROM pg_index idx
    INNER JOIN pg_class rel ON rel.oid = idx.indrelid
    INNER JOIN pg_attribute attr
        ON attr.attrelid = rel.oid AND attr.attnum = ANY(idx.indkey)
    WHERE rel.relname = $1
      AND pg_table_is_visible(rel.oid)
      AND idx.indisprimary
    ORDER BY array_position(idx.indkey::int2[], attr.attnum)
"#;

/// [`Catalog`] backed by a Postgres pool. Every call is one round trip.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn partitions_of(&self, table_name: &str) -> Result<Vec<String>> {
        debug!("Listing partitions of '{}'", table_name);
        sqlx::query_scalar::<_, String>(PARTITIONS_SQL)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await
            .map_err(catalog_error)
    }

    async fn table_exists(&self, table_name: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(TABLE_EXISTS_SQL)
            .bind(table_name)
            .fetch_one(&self.pool)
            .await
            .map_err(catalog_error)
    }

    async fn primary_key_of(&self, table_name: &str) -> Result<Vec<String>> {
        primary_key_columns(&self.pool, table_name)
            .await
            .map_err(catalog_error)
    }
}

/// Primary-key columns of `table_name` in key order, on any executor so the
/// DDL path can ask inside its own transaction.
pub(crate) async fn primary_key_columns<'e, E>(
    executor: E,
    table_name: &str,
) -> std::result::Result<Vec<String>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, String>(PRIMARY_KEY_SQL)
        .bind(table_name.to_string())
        .fetch_all(executor)
        .await
}
