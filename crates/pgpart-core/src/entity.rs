//! Entity descriptors: the partitioned parent and per-partition scoped views.

use std::sync::Arc;

use crate::key::PartitionKey;
use crate::predicate::{where_clause, Predicate};
use crate::value::{quote_ident, SqlValue};

pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// A logical table backed by a partitioned parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    name: String,
    table_name: String,
    primary_key: String,
    partition_key: PartitionKey,
}

impl Entity {
    /// Declare an entity over `table_name`. The logical name defaults to the
    /// table name and the primary key to `id`.
    pub fn new(table_name: impl Into<String>, partition_key: PartitionKey) -> Self {
        let table_name = table_name.into();
        Self {
            name: table_name.clone(),
            table_name,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            partition_key,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }
}

/// A view of a parent entity whose reads and updates target one child table.
///
/// Everything except the physical table comes from the parent: the logical
/// name, the primary key, and row construction.
#[derive(Debug)]
pub struct ScopedEntity {
    parent: Arc<Entity>,
    table_name: String,
    primary_key: String,
}

impl ScopedEntity {
    /// Scope `parent` to `child_table_name`, keeping the parent's declared key.
    pub fn new(parent: Arc<Entity>, child_table_name: impl Into<String>) -> Self {
        let primary_key = parent.primary_key().to_string();
        Self {
            parent,
            table_name: child_table_name.into(),
            primary_key,
        }
    }

    /// Use the key the parent resolved from the catalog instead of the
    /// declared one.
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn parent(&self) -> &Arc<Entity> {
        &self.parent
    }
}

/// Anything a query can be pointed at: the parent itself or a scoped view.
pub trait TableTarget: Send + Sync {
    /// Logical name, used in messages and typing. Never the child table.
    fn name(&self) -> &str;

    /// Physical table that reads, updates and deletes go to.
    fn table_name(&self) -> &str;

    fn primary_key(&self) -> &str;

    /// Start a new row. Rows are always rows of the parent entity.
    fn new_row(&self) -> NewRow<'_>;

    fn select_sql(&self, predicates: &[Predicate]) -> String {
        format!(
            "SELECT * FROM {}{}",
            quote_ident(self.table_name()),
            where_clause(predicates)
        )
    }

    fn count_sql(&self, predicates: &[Predicate]) -> String {
        format!(
            "SELECT COUNT(*) AS cnt FROM {}{}",
            quote_ident(self.table_name()),
            where_clause(predicates)
        )
    }

    fn update_sql(&self, assignments: &[(String, SqlValue)], predicates: &[Predicate]) -> String {
        let set = assignments
            .iter()
            .map(|(col, v)| format!("{} = {}", quote_ident(col), v.to_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {}{}",
            quote_ident(self.table_name()),
            set,
            where_clause(predicates)
        )
    }

    fn delete_sql(&self, predicates: &[Predicate]) -> String {
        format!(
            "DELETE FROM {}{}",
            quote_ident(self.table_name()),
            where_clause(predicates)
        )
    }
}

impl TableTarget for Entity {
    fn name(&self) -> &str {
        &self.name
    }

    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn new_row(&self) -> NewRow<'_> {
        NewRow::new(self)
    }
}

impl TableTarget for ScopedEntity {
    fn name(&self) -> &str {
        self.parent.name()
    }

    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn new_row(&self) -> NewRow<'_> {
        NewRow::new(&self.parent).returning(&self.primary_key)
    }
}

/// A row under construction, owned by the parent entity it will be inserted into.
#[derive(Debug, Clone)]
pub struct NewRow<'a> {
    entity: &'a Entity,
    returning: &'a str,
    values: Vec<(String, SqlValue)>,
}

impl<'a> NewRow<'a> {
    fn new(entity: &'a Entity) -> Self {
        Self {
            entity,
            returning: entity.primary_key(),
            values: Vec::new(),
        }
    }

    fn returning(mut self, primary_key: &'a str) -> Self {
        self.returning = primary_key;
        self
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    pub fn values(&self) -> &[(String, SqlValue)] {
        &self.values
    }

    /// `INSERT` into the parent table, returning the new primary key.
    /// The database routes the row to its partition.
    pub fn insert_sql(&self) -> String {
        let table = quote_ident(self.entity.table_name());
        let returning = quote_ident(self.returning);
        if self.values.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning);
        }
        let columns = self
            .values
            .iter()
            .map(|(c, _)| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let values = self
            .values
            .iter()
            .map(|(_, v)| v.to_sql())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table, columns, values, returning
        )
    }
}
