//! Partition-aware operations on a declaratively partitioned entity.
//!
//! `PartitionedEntity` wraps an [`Entity`] and answers the questions an
//! application asks of a partitioned table: which children exist, which
//! child to read from, how to filter by partition key, and how to add a new
//! partition.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::PartitionCache;
use crate::catalog::{Catalog, PartitionBound, PartitionDdl, PartitionOptions};
use crate::entity::{Entity, ScopedEntity, TableTarget};
use crate::error::Result;
use crate::predicate::{Predicate, PredicateBuilder};
use crate::value::SqlValue;

pub struct PartitionedEntity {
    entity: Arc<Entity>,
    catalog: Arc<dyn Catalog>,
    ddl: Arc<dyn PartitionDdl>,
    cache: Arc<PartitionCache>,
}

impl fmt::Debug for PartitionedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedEntity")
            .field("entity", &self.entity)
            .field("cached_partitions", &self.cache.cached_partitions(self.cache_key()))
            .finish()
    }
}

impl PartitionedEntity {
    /// Decorate `entity`, memoizing through the process-wide cache.
    pub fn new(entity: Entity, catalog: Arc<dyn Catalog>, ddl: Arc<dyn PartitionDdl>) -> Self {
        Self {
            entity: Arc::new(entity),
            catalog,
            ddl,
            cache: PartitionCache::global(),
        }
    }

    /// Use a private cache instead of the process-wide one.
    pub fn with_cache(mut self, cache: Arc<PartitionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    fn cache_key(&self) -> &str {
        self.entity.table_name()
    }

    /// Resolve the primary key column, once per entity descriptor.
    ///
    /// The catalog key of the first partition wins, then the parent's own
    /// catalog key. When the catalog does not report exactly one column the
    /// declared key is used. Scoped entities, rows inserted through them and
    /// complex-key subqueries all use this same key.
    pub async fn primary_key(&self) -> Result<String> {
        self.cache
            .fetch_primary_key(&self.entity, || self.resolve_primary_key())
            .await
    }

    async fn resolve_primary_key(&self) -> Result<String> {
        let table = match self.partitions().await?.into_iter().next() {
            Some(child) => child,
            None => self.entity.table_name().to_string(),
        };
        let mut columns = self.catalog.primary_key_of(&table).await?;
        if columns.len() == 1 {
            return Ok(columns.remove(0));
        }
        debug!(
            "Catalog reports {} primary key columns for '{}', using declared '{}'",
            columns.len(),
            table,
            self.entity.primary_key()
        );
        Ok(self.entity.primary_key().to_string())
    }

    /// Whether the first partition exists, or the parent when there are none.
    pub async fn partition_table_exists(&self) -> Result<bool> {
        let partitions = self.partitions().await?;
        let target = partitions
            .first()
            .map(String::as_str)
            .unwrap_or_else(|| self.entity.table_name());
        self.catalog.table_exists(target).await
    }

    /// The cached view of this entity bound to `child_table_name`, carrying
    /// the resolved primary key.
    pub async fn scoped_entity(&self, child_table_name: &str) -> Result<Arc<ScopedEntity>> {
        let primary_key = self.primary_key().await?;
        Ok(self
            .cache
            .fetch_scoped(&self.entity, child_table_name, || {
                ScopedEntity::new(self.entity.clone(), child_table_name)
                    .with_primary_key(primary_key)
            }))
    }

    /// Predicate builder for this entity. Only a complex key needs the
    /// resolved primary key, so only a complex key touches the catalog.
    pub async fn predicates(&self) -> Result<PredicateBuilder<'_>> {
        let builder = PredicateBuilder::new(&self.entity);
        if !self.entity.partition_key().is_complex() {
            return Ok(builder);
        }
        Ok(builder.with_primary_key(self.primary_key().await?))
    }

    pub async fn partition_key_eq(&self, value: impl Into<SqlValue>) -> Result<Predicate> {
        let value = value.into();
        Ok(self.predicates().await?.eq(value))
    }

    /// Half-open `[start, end)`.
    pub async fn range_partition_key_in(
        &self,
        start: impl Into<SqlValue>,
        end: impl Into<SqlValue>,
    ) -> Result<Predicate> {
        let (start, end) = (start.into(), end.into());
        Ok(self.predicates().await?.range(start, end))
    }

    pub async fn list_partition_key_in(&self, values: &[SqlValue]) -> Result<Predicate> {
        Ok(self.predicates().await?.list(values))
    }

    /// Like [`partition_key_eq`](Self::partition_key_eq) but refuses complex
    /// keys, before any catalog access.
    pub fn partition_key_column_eq(&self, value: impl Into<SqlValue>) -> Result<Predicate> {
        PredicateBuilder::new(&self.entity).column_eq(value.into())
    }

    /// Like [`range_partition_key_in`](Self::range_partition_key_in) but refuses complex keys.
    pub fn partition_key_column_in(
        &self,
        start: impl Into<SqlValue>,
        end: impl Into<SqlValue>,
    ) -> Result<Predicate> {
        PredicateBuilder::new(&self.entity).column_range(start.into(), end.into())
    }

    /// Child table names, loaded from the catalog once and then memoized.
    pub async fn partitions(&self) -> Result<Vec<String>> {
        let table = self.entity.table_name();
        self.cache
            .fetch_partitions(self.cache_key(), || async move {
                let names = self.catalog.partitions_of(table).await?;
                info!("Discovered {} partitions of '{}'", names.len(), table);
                Ok(names)
            })
            .await
    }

    pub async fn create_range_partition(
        &self,
        start: impl Into<SqlValue>,
        end: impl Into<SqlValue>,
        options: PartitionOptions,
    ) -> Result<String> {
        let bound = PartitionBound::Range {
            start: start.into(),
            end: end.into(),
        };
        self.create_partition(bound, options).await
    }

    pub async fn create_list_partition(
        &self,
        values: Vec<SqlValue>,
        options: PartitionOptions,
    ) -> Result<String> {
        self.create_partition(PartitionBound::List { values }, options)
            .await
    }

    async fn create_partition(
        &self,
        bound: PartitionBound,
        mut options: PartitionOptions,
    ) -> Result<String> {
        options.primary_key = Some(self.primary_key().await?);
        let parent = self.entity.table_name();
        let child = self.ddl.create_partition(parent, &bound, &options).await?;
        self.cache.record_partition(self.cache_key(), &child);
        info!(
            "Created {} partition '{}' of '{}' ({})",
            bound.kind(),
            child,
            parent,
            bound.to_sql()
        );
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DbError, DbErrorKind, PartitionError};
    use crate::key::PartitionKey;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory stand-in for a database with range partitions over integers.
    #[derive(Default)]
    struct FakeDb {
        children: Mutex<HashMap<String, Vec<(String, PartitionBound)>>>,
        primary_keys: Mutex<HashMap<String, Vec<String>>>,
        received_options: Mutex<Vec<PartitionOptions>>,
        catalog_queries: AtomicUsize,
    }

    impl FakeDb {
        fn with_children(parent: &str, children: &[(&str, i64, i64)]) -> Arc<Self> {
            let db = FakeDb::default();
            db.children.lock().unwrap().insert(
                parent.to_string(),
                children
                    .iter()
                    .map(|(name, s, e)| {
                        (
                            name.to_string(),
                            PartitionBound::Range {
                                start: SqlValue::Int(*s),
                                end: SqlValue::Int(*e),
                            },
                        )
                    })
                    .collect(),
            );
            Arc::new(db)
        }

        fn set_primary_key(&self, table: &str, cols: &[&str]) {
            self.primary_keys
                .lock()
                .unwrap()
                .insert(table.to_string(), cols.iter().map(|c| c.to_string()).collect());
        }

        fn all_tables(&self) -> Vec<String> {
            let children = self.children.lock().unwrap();
            children
                .iter()
                .flat_map(|(parent, kids)| {
                    std::iter::once(parent.clone()).chain(kids.iter().map(|(n, _)| n.clone()))
                })
                .collect()
        }
    }

    fn int_range(bound: &PartitionBound) -> Option<(i64, i64)> {
        match bound {
            PartitionBound::Range {
                start: SqlValue::Int(s),
                end: SqlValue::Int(e),
            } => Some((*s, *e)),
            _ => None,
        }
    }

    #[async_trait]
    impl Catalog for FakeDb {
        async fn partitions_of(&self, table_name: &str) -> Result<Vec<String>> {
            self.catalog_queries.fetch_add(1, Ordering::SeqCst);
            let children = self.children.lock().unwrap();
            Ok(children
                .get(table_name)
                .map(|kids| kids.iter().map(|(n, _)| n.clone()).collect())
                .unwrap_or_default())
        }

        async fn table_exists(&self, table_name: &str) -> Result<bool> {
            Ok(self.all_tables().iter().any(|t| t == table_name))
        }

        async fn primary_key_of(&self, table_name: &str) -> Result<Vec<String>> {
            Ok(self
                .primary_keys
                .lock()
                .unwrap()
                .get(table_name)
                .cloned()
                .unwrap_or_default())
        }
    }

    #[async_trait]
    impl PartitionDdl for FakeDb {
        async fn create_partition(
            &self,
            parent_table_name: &str,
            bound: &PartitionBound,
            options: &PartitionOptions,
        ) -> Result<String> {
            self.received_options.lock().unwrap().push(options.clone());
            let name = options
                .name
                .clone()
                .unwrap_or_else(|| format!("{}_generated", parent_table_name));
            if self.all_tables().contains(&name) {
                return Err(PartitionError::Definition(DbError::new(
                    Some("42P07".to_string()),
                    format!("relation \"{}\" already exists", name),
                )));
            }
            let mut children = self.children.lock().unwrap();
            let kids = children.entry(parent_table_name.to_string()).or_default();
            if let Some((s, e)) = int_range(bound) {
                for (other, other_bound) in kids.iter() {
                    if let Some((os, oe)) = int_range(other_bound) {
                        if s < oe && os < e {
                            return Err(PartitionError::Definition(DbError::new(
                                Some("42P17".to_string()),
                                format!("partition \"{}\" would overlap partition \"{}\"", name, other),
                            )));
                        }
                    }
                }
            }
            kids.push((name.clone(), bound.clone()));
            Ok(name)
        }
    }

    fn decorate(db: &Arc<FakeDb>, entity: Entity) -> PartitionedEntity {
        PartitionedEntity::new(entity, db.clone(), db.clone())
            .with_cache(Arc::new(PartitionCache::new()))
    }

    fn events() -> Entity {
        Entity::new("events", PartitionKey::simple("day")).with_name("Event")
    }

    fn events_db() -> Arc<FakeDb> {
        FakeDb::with_children("events", &[("events_a", 0, 31), ("events_b", 31, 59)])
    }

    #[tokio::test]
    async fn test_partitions_memoized() {
        let db = events_db();
        let entity = decorate(&db, events());
        let first = entity.partitions().await.unwrap();
        let second = entity.partitions().await.unwrap();
        assert_eq!(first, vec!["events_a", "events_b"]);
        assert_eq!(first, second);
        assert_eq!(db.catalog_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unpartitioned_parent_has_no_partitions() {
        let db = Arc::new(FakeDb::default());
        let entity = decorate(&db, events());
        assert!(entity.partitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_primary_key_from_first_partition() {
        let db = events_db();
        db.set_primary_key("events_a", &["event_id"]);
        db.set_primary_key("events", &["parent_id"]);
        let entity = decorate(&db, events());
        assert_eq!(entity.primary_key().await.unwrap(), "event_id");
    }

    #[tokio::test]
    async fn test_primary_key_from_parent_without_partitions() {
        let db = Arc::new(FakeDb::default());
        db.set_primary_key("events", &["parent_id"]);
        let entity = decorate(&db, events());
        assert_eq!(entity.primary_key().await.unwrap(), "parent_id");
    }

    #[tokio::test]
    async fn test_primary_key_falls_back_to_declared() {
        let db = events_db();
        db.set_primary_key("events_a", &["id", "day"]);
        let entity = decorate(&db, events().with_primary_key("event_id"));
        assert_eq!(entity.primary_key().await.unwrap(), "event_id");
    }

    #[tokio::test]
    async fn test_scoped_and_predicates_share_resolved_primary_key() {
        let db = events_db();
        db.set_primary_key("events_a", &["event_id"]);
        let entity = decorate(&db, events());
        assert_eq!(entity.primary_key().await.unwrap(), "event_id");

        let scoped = entity.scoped_entity("events_b").await.unwrap();
        assert_eq!(scoped.primary_key(), "event_id");
        assert_eq!(
            scoped.new_row().set("day", 40).insert_sql(),
            "INSERT INTO \"events\" (\"day\") VALUES (40) RETURNING \"event_id\""
        );

        let complex = decorate(
            &db,
            Entity::new("events", PartitionKey::columns(["y", "m"])),
        );
        assert_eq!(
            complex
                .partition_key_eq(SqlValue::tuple([2023, 5]))
                .await
                .unwrap()
                .to_sql(),
            "\"event_id\" IN (SELECT \"event_id\" FROM \"events\" WHERE (\"y\", \"m\") = (2023, 5))"
        );
    }

    #[tokio::test]
    async fn test_primary_key_resolved_once() {
        let db = events_db();
        db.set_primary_key("events_a", &["event_id"]);
        let entity = decorate(&db, events());
        entity.primary_key().await.unwrap();
        db.set_primary_key("events_a", &["renamed"]);
        assert_eq!(entity.primary_key().await.unwrap(), "event_id");
        assert_eq!(
            entity.scoped_entity("events_a").await.unwrap().primary_key(),
            "event_id"
        );
    }

    #[tokio::test]
    async fn test_descriptors_over_one_table_get_their_own_scoped_view() {
        let db = events_db();
        let cache = Arc::new(PartitionCache::new());
        let event = PartitionedEntity::new(events(), db.clone(), db.clone()).with_cache(cache.clone());
        let audit = PartitionedEntity::new(
            events().with_name("AuditEvent").with_primary_key("audit_id"),
            db.clone(),
            db.clone(),
        )
        .with_cache(cache.clone());

        let a = event.scoped_entity("events_a").await.unwrap();
        let b = audit.scoped_entity("events_a").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "Event");
        assert_eq!(b.name(), "AuditEvent");
        assert_eq!(b.primary_key(), "audit_id");
        assert!(Arc::ptr_eq(b.parent(), audit.entity()));
        // The partition list is still shared per table.
        assert_eq!(db.catalog_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partition_table_exists() {
        let db = events_db();
        let entity = decorate(&db, events());
        assert!(entity.partition_table_exists().await.unwrap());

        let db = Arc::new(FakeDb::default());
        let entity = decorate(&db, Entity::new("missing", PartitionKey::simple("day")));
        assert!(!entity.partition_table_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_scoped_entity_cached_and_named_after_parent() {
        let db = events_db();
        let entity = decorate(&db, events());
        let a1 = entity.scoped_entity("events_a").await.unwrap();
        let a2 = entity.scoped_entity("events_a").await.unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(a1.table_name(), "events_a");
        assert_eq!(a1.name(), "Event");
        assert!(Arc::ptr_eq(a1.parent(), entity.entity()));
        assert_eq!(
            a1.new_row().set("day", 3).insert_sql(),
            "INSERT INTO \"events\" (\"day\") VALUES (3) RETURNING \"id\""
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scoped_entity_concurrent_callers() {
        let db = events_db();
        let entity = Arc::new(decorate(&db, events()));
        let tasks = (0..32).map(|_| {
            let entity = entity.clone();
            tokio::spawn(async move { entity.scoped_entity("events_b").await.unwrap() })
        });
        let scoped: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert!(scoped.iter().all(|s| Arc::ptr_eq(s, &scoped[0])));
    }

    #[tokio::test]
    async fn test_create_range_partition_appends() {
        let db = events_db();
        db.set_primary_key("events_a", &["id"]);
        let entity = decorate(&db, events());
        entity.partitions().await.unwrap();

        let child = entity
            .create_range_partition(59, 90, PartitionOptions::named("events_c"))
            .await
            .unwrap();
        assert_eq!(child, "events_c");
        assert_eq!(
            entity.partitions().await.unwrap(),
            vec!["events_a", "events_b", "events_c"]
        );
        assert_eq!(db.catalog_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_partition_merges_resolved_primary_key() {
        let db = events_db();
        db.set_primary_key("events_a", &["event_id"]);
        let entity = decorate(&db, events());
        let mut options = PartitionOptions::named("events_c");
        options.primary_key = Some("caller_supplied".to_string());
        entity.create_range_partition(59, 90, options).await.unwrap();

        let received = db.received_options.lock().unwrap();
        assert_eq!(received[0].primary_key.as_deref(), Some("event_id"));
        assert_eq!(received[0].name.as_deref(), Some("events_c"));
    }

    #[tokio::test]
    async fn test_overlapping_partition_rejected_and_absent() {
        let db = events_db();
        let entity = decorate(&db, events());
        entity.partitions().await.unwrap();

        let err = entity
            .create_range_partition(45, 75, PartitionOptions::named("events_c"))
            .await
            .unwrap_err();
        assert!(matches!(err, PartitionError::Definition(_)));
        assert_eq!(err.db_kind(), Some(DbErrorKind::InvalidObjectDefinition));
        assert!(!entity.partitions().await.unwrap().contains(&"events_c".to_string()));
        assert!(!db.table_exists("events_c").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_name_distinguished_from_overlap() {
        let db = events_db();
        let entity = decorate(&db, events());
        let err = entity
            .create_range_partition(100, 120, PartitionOptions::named("events_a"))
            .await
            .unwrap_err();
        assert_eq!(err.db_kind(), Some(DbErrorKind::DuplicateTable));
    }

    #[tokio::test]
    async fn test_create_list_partition() {
        let db = Arc::new(FakeDb::default());
        let entity = decorate(&db, Entity::new("accounts", PartitionKey::simple("region")));
        let child = entity
            .create_list_partition(
                vec![SqlValue::list(["eu", "uk"])],
                PartitionOptions::named("accounts_europe"),
            )
            .await
            .unwrap();
        assert_eq!(child, "accounts_europe");
        assert_eq!(entity.partitions().await.unwrap(), vec!["accounts_europe"]);
    }

    #[tokio::test]
    async fn test_predicates_dispatch_on_key() {
        let db = events_db();
        let simple = decorate(&db, events());
        assert_eq!(simple.partition_key_eq(3).await.unwrap().to_sql(), "\"day\" = 3");
        assert_eq!(
            simple.range_partition_key_in(0, 31).await.unwrap().to_sql(),
            "(\"day\" >= 0 AND \"day\" < 31)"
        );
        assert_eq!(
            simple
                .list_partition_key_in(&[SqlValue::from(1), SqlValue::list([2, 3])])
                .await
                .unwrap()
                .to_sql(),
            "\"day\" IN (1, 2, 3)"
        );
        // Simple keys never need the primary key.
        assert_eq!(db.catalog_queries.load(Ordering::SeqCst), 0);

        let complex = decorate(
            &db,
            Entity::new("events", PartitionKey::columns(["year", "month"])),
        );
        assert!(complex
            .partition_key_eq(SqlValue::tuple([2023, 5]))
            .await
            .unwrap()
            .to_sql()
            .starts_with("\"id\" IN (SELECT \"id\" FROM \"events\""));
    }

    #[tokio::test]
    async fn test_column_shorthands_fail_fast_without_queries() {
        let db = events_db();
        let complex = decorate(
            &db,
            Entity::new("events", PartitionKey::columns(["year", "month"])),
        );
        let err = complex.partition_key_column_eq(2023).unwrap_err();
        assert_eq!(
            err.to_string(),
            "partition_key_column_eq not available for complex partition keys"
        );
        let err = complex.partition_key_column_in(2023, 2024).unwrap_err();
        assert_eq!(
            err.to_string(),
            "partition_key_column_in not available for complex partition keys"
        );
        assert_eq!(db.catalog_queries.load(Ordering::SeqCst), 0);
    }
}
