//! pgpart core - partition-aware routing for declaratively partitioned tables
//!
//! This crate holds everything that does not talk to a database directly:
//! entity descriptors, partition-key predicates, the partition cache, and the
//! [`PartitionedEntity`] decorator. Database access goes through the
//! [`Catalog`] and [`PartitionDdl`] traits.

pub mod cache;
pub mod catalog;
pub mod entity;
pub mod error;
pub mod key;
pub mod partitioned;
pub mod predicate;
pub mod value;

pub use cache::PartitionCache;
pub use catalog::{Catalog, PartitionBound, PartitionDdl, PartitionOptions};
pub use entity::{Entity, NewRow, ScopedEntity, TableTarget};
pub use error::{DbError, DbErrorKind, PartitionError, Result};
pub use key::PartitionKey;
pub use partitioned::PartitionedEntity;
pub use predicate::{where_clause, Predicate, PredicateBuilder};
pub use value::SqlValue;
