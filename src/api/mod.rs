//! Purpose: Define the public Rust API of the tabula engine.
//! Exports: Repository, builders, joins, aggregation, catalog, and migrations, plus core types.
//! Role: Stable surface over the storage-agnostic core; what applications and the CLI use.
//! Invariants: Every public operation returns `Result<_, Error>`; none panics on bad input.
//! Invariants: Builders own their state; cloning a builder never shares conditions.

mod aggregate;
mod catalog;
mod join;
mod migration;
mod query;
mod repository;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::condition::{Direction, Operator, OrderBy, QueryOptions, WhereCondition};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::index::{IndexDefinition, IndexStats};
pub use crate::core::memory::{MemoryStore, StoreOptions};
pub use crate::core::plan::QueryPlan;
pub use crate::core::row::{Fields, ID_FIELD, Row, RowId};
pub use crate::core::store::{DataStore, IdMode, StoreResolver};
pub use aggregate::{AggFunction, AggSpec};
pub use catalog::Catalog;
pub use join::{JoinConfig, JoinKind, JoinQueryBuilder};
pub use migration::{
    ColumnOptions, ColumnType, MigrateOptions, Migration, MigrationRecord, MigrationRunner,
    MigrationStatus, SchemaBuilder, SchemaOperation,
};
pub use query::QueryBuilder;
pub use repository::Repository;
