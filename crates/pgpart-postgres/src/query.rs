//! Run entity-targeted statements against a pool.
//!
//! These are thin: SQL comes from [`TableTarget`] and [`NewRow`], execution
//! from `sqlx`, and every failure is returned as [`PartitionError::Query`].
//!
//! [`PartitionError::Query`]: pgpart_core::PartitionError::Query

use pgpart_core::{NewRow, Predicate, Result, SqlValue, TableTarget};
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use tracing::debug;

use crate::error::query_error;

pub async fn fetch_all(
    pool: &PgPool,
    target: &dyn TableTarget,
    predicates: &[Predicate],
) -> Result<Vec<PgRow>> {
    let sql = target.select_sql(predicates);
    debug!("{}: {}", target.name(), sql);
    sqlx::query(&sql).fetch_all(pool).await.map_err(query_error)
}

pub async fn count(
    pool: &PgPool,
    target: &dyn TableTarget,
    predicates: &[Predicate],
) -> Result<i64> {
    let sql = target.count_sql(predicates);
    debug!("{}: {}", target.name(), sql);
    sqlx::query_scalar::<_, i64>(&sql)
        .fetch_one(pool)
        .await
        .map_err(query_error)
}

/// Insert through the parent table. Returns the row carrying the new primary key.
pub async fn insert(pool: &PgPool, row: &NewRow<'_>) -> Result<PgRow> {
    let sql = row.insert_sql();
    debug!("{}: {}", row.entity().name(), sql);
    sqlx::query(&sql).fetch_one(pool).await.map_err(query_error)
}

/// Returns the number of rows updated.
pub async fn update(
    pool: &PgPool,
    target: &dyn TableTarget,
    assignments: &[(String, SqlValue)],
    predicates: &[Predicate],
) -> Result<u64> {
    let sql = target.update_sql(assignments, predicates);
    debug!("{}: {}", target.name(), sql);
    let done = sqlx::query(&sql).execute(pool).await.map_err(query_error)?;
    Ok(done.rows_affected())
}

pub async fn delete(
    pool: &PgPool,
    target: &dyn TableTarget,
    predicates: &[Predicate],
) -> Result<u64> {
    let sql = target.delete_sql(predicates);
    debug!("{}: {}", target.name(), sql);
    let done = sqlx::query(&sql).execute(pool).await.map_err(query_error)?;
    Ok(done.rows_affected())
}
