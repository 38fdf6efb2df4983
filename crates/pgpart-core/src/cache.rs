//! Process-wide memoization of partition lists, resolved primary keys and
//! scoped entities.
//!
//! Partition lists are keyed by the parent's table name. Primary keys and
//! scoped entities are keyed by the full parent descriptor, since two
//! descriptors over one table may name or key it differently. Entries live
//! until the process exits. Partition lists are never expired; the only
//! update is an append when a partition is created through this crate.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::entity::{Entity, ScopedEntity, TableTarget};
use crate::error::Result;

type PartitionCell = Arc<OnceCell<Arc<Vec<String>>>>;
type PrimaryKeyCell = Arc<OnceCell<String>>;

#[derive(Debug, Default)]
pub struct PartitionCache {
    partitions: Mutex<HashMap<String, PartitionCell>>,
    primary_keys: Mutex<HashMap<Entity, PrimaryKeyCell>>,
    scoped: Mutex<HashMap<(Entity, String), Arc<ScopedEntity>>>,
}

static GLOBAL: OnceLock<Arc<PartitionCache>> = OnceLock::new();

impl PartitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every entity in this process.
    pub fn global() -> Arc<PartitionCache> {
        GLOBAL.get_or_init(|| Arc::new(PartitionCache::new())).clone()
    }

    /// Return the memoized partition list for `parent`, running `load` on the
    /// first call. Concurrent first callers wait on a single `load`. A failed
    /// load caches nothing.
    pub async fn fetch_partitions<F, Fut>(&self, parent: &str, load: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        let cell = {
            let mut map = lock(&self.partitions);
            map.entry(parent.to_string()).or_default().clone()
        };
        let list = cell
            .get_or_try_init(|| async {
                let names = load().await?;
                debug!("Cached {} partitions for '{}'", names.len(), parent);
                Ok::<_, crate::error::PartitionError>(Arc::new(names))
            })
            .await?;
        Ok(list.as_ref().clone())
    }

    /// The memoized list for `parent`, if one has been loaded.
    pub fn cached_partitions(&self, parent: &str) -> Option<Vec<String>> {
        let map = lock(&self.partitions);
        map.get(parent)
            .and_then(|cell| cell.get())
            .map(|list| list.as_ref().clone())
    }

    /// Append a newly created child to an already loaded list. An unloaded
    /// list is left alone; the next load reads the catalog.
    pub(crate) fn record_partition(&self, parent: &str, child: &str) {
        let mut map = lock(&self.partitions);
        let Some(current) = map.get(parent).and_then(|cell| cell.get()).cloned() else {
            return;
        };
        if current.iter().any(|name| name == child) {
            return;
        }
        let mut names = current.as_ref().clone();
        names.push(child.to_string());
        map.insert(
            parent.to_string(),
            Arc::new(OnceCell::new_with(Some(Arc::new(names)))),
        );
    }

    /// Return the primary key resolved for `entity`, running `resolve` on
    /// the first call. Like partition lists, a failure caches nothing.
    pub async fn fetch_primary_key<F, Fut>(&self, entity: &Entity, resolve: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let cell = {
            let mut map = lock(&self.primary_keys);
            map.entry(entity.clone()).or_default().clone()
        };
        let key = cell.get_or_try_init(resolve).await?;
        Ok(key.clone())
    }

    /// Return the scoped entity for `(parent, child)`, building it with
    /// `build` if absent. `build` runs at most once per key.
    pub fn fetch_scoped<F>(&self, parent: &Entity, child: &str, build: F) -> Arc<ScopedEntity>
    where
        F: FnOnce() -> ScopedEntity,
    {
        let mut map = lock(&self.scoped);
        map.entry((parent.clone(), child.to_string()))
            .or_insert_with(|| {
                debug!(
                    "Building scoped entity '{}' -> '{}'",
                    parent.table_name(),
                    child
                );
                Arc::new(build())
            })
            .clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
