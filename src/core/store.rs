//! Purpose: The contract every row backend implements, and how callers reach other tables.
//! Exports: `DataStore`, `StoreResolver`, `IdMode`.
//! Role: Seam between the engine (builders, joins, migrations) and storage adapters.
//! Invariants: Mutations keep the store's own indexes consistent before returning.
//! Invariants: Batch primitives are optional; `None` means "not offered", never "failed".
use crate::core::condition::QueryOptions;
use crate::core::error::{Error, ErrorKind};
use crate::core::index::IndexDefinition;
use crate::core::row::{Fields, Row, RowId};

/// How a store assigns ids on insert.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum IdMode {
    /// Sequential integers starting at 1; any caller-supplied id is ignored.
    #[default]
    Auto,
    /// The caller supplies a unique `id` in the insert data.
    Client,
}

pub trait DataStore {
    fn find_all(&self) -> Result<Vec<Row>, Error>;

    fn find(&self, options: &QueryOptions) -> Result<Vec<Row>, Error>;

    fn find_by_id(&self, id: &RowId) -> Result<Option<Row>, Error>;

    fn insert(&mut self, data: Fields) -> Result<Row, Error>;

    /// Merges `data` into the row; `Ok(None)` when the id is unknown.
    fn update(&mut self, id: &RowId, data: Fields) -> Result<Option<Row>, Error>;

    fn delete(&mut self, id: &RowId) -> Result<bool, Error>;

    /// Makes `field` absent on the row; `Ok(None)` when the id is unknown.
    fn clear_field(&mut self, id: &RowId, field: &str) -> Result<Option<Row>, Error>;

    fn batch_insert(&mut self, items: &[Fields]) -> Option<Result<Vec<Row>, Error>> {
        let _ = items;
        None
    }

    /// Updates existing ids and skips unknown ones.
    fn batch_update(&mut self, items: &[(RowId, Fields)]) -> Option<Result<Vec<Row>, Error>> {
        let _ = items;
        None
    }

    fn count(&self, options: &QueryOptions) -> Result<usize, Error> {
        self.find(&options.unpaginated()).map(|rows| rows.len())
    }

    fn create_index(&mut self, definition: IndexDefinition) -> Result<bool, Error> {
        Err(Error::new(ErrorKind::Unsupported)
            .with_message(format!("store cannot index `{}`", definition.name())))
    }
}

/// Name-based access to stores other than the one a builder was created on.
pub trait StoreResolver {
    /// Unknown names are `ErrorKind::TableNotFound`.
    fn resolve(&self, table: &str) -> Result<&dyn DataStore, Error>;

    fn resolve_mut(&mut self, table: &str) -> Result<&mut dyn DataStore, Error>;
}

impl<T: DataStore + ?Sized> DataStore for Box<T> {
    fn find_all(&self) -> Result<Vec<Row>, Error> {
        (**self).find_all()
    }

    fn find(&self, options: &QueryOptions) -> Result<Vec<Row>, Error> {
        (**self).find(options)
    }

    fn find_by_id(&self, id: &RowId) -> Result<Option<Row>, Error> {
        (**self).find_by_id(id)
    }

    fn insert(&mut self, data: Fields) -> Result<Row, Error> {
        (**self).insert(data)
    }

    fn update(&mut self, id: &RowId, data: Fields) -> Result<Option<Row>, Error> {
        (**self).update(id, data)
    }

    fn delete(&mut self, id: &RowId) -> Result<bool, Error> {
        (**self).delete(id)
    }

    fn clear_field(&mut self, id: &RowId, field: &str) -> Result<Option<Row>, Error> {
        (**self).clear_field(id, field)
    }

    fn batch_insert(&mut self, items: &[Fields]) -> Option<Result<Vec<Row>, Error>> {
        (**self).batch_insert(items)
    }

    fn batch_update(&mut self, items: &[(RowId, Fields)]) -> Option<Result<Vec<Row>, Error>> {
        (**self).batch_update(items)
    }

    fn count(&self, options: &QueryOptions) -> Result<usize, Error> {
        (**self).count(options)
    }

    fn create_index(&mut self, definition: IndexDefinition) -> Result<bool, Error> {
        (**self).create_index(definition)
    }
}
