//! pgpart Postgres - catalog and DDL collaborators over `sqlx`
//!
//! This crate provides:
//! - [`PgCatalog`]: partition discovery, table existence and primary keys
//! - [`PgPartitionDdl`]: all-or-nothing partition creation
//! - [`query`]: execution helpers for parent and scoped entities

pub mod catalog;
pub mod ddl;
pub mod error;
pub mod query;

pub use catalog::PgCatalog;
pub use ddl::PgPartitionDdl;
pub use error::db_error;

use std::sync::Arc;

use pgpart_core::value::quote_ident;
use pgpart_core::{Entity, PartitionedEntity};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Open a pool. When `search_path` is set every connection switches to that
/// schema first, so unqualified table names resolve there.
pub async fn connect(
    url: &str,
    max_connections: u32,
    search_path: Option<String>,
) -> Result<PgPool, sqlx::Error> {
    let mut options = PgPoolOptions::new().max_connections(max_connections);
    if let Some(schema) = search_path {
        let statement = format!("SET search_path TO {}", quote_ident(&schema));
        options = options.after_connect(move |conn, _meta| {
            let statement = statement.clone();
            Box::pin(async move {
                conn.execute(statement.as_str()).await?;
                Ok(())
            })
        });
    }
    let pool = options.connect(url).await?;
    info!("Connected to database (max_connections={})", max_connections);
    Ok(pool)
}

/// Decorate `entity` with Postgres-backed catalog and DDL, sharing the
/// process-wide partition cache.
pub fn decorate(pool: &PgPool, entity: Entity) -> PartitionedEntity {
    PartitionedEntity::new(
        entity,
        Arc::new(PgCatalog::new(pool.clone())),
        Arc::new(PgPartitionDdl::new(pool.clone())),
    )
}
