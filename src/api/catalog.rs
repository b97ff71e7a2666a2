//! Purpose: A named set of stores that joins and migrations resolve tables through.
//! Exports: `Catalog`.
//! Role: Default `StoreResolver`; owns its stores as boxed `DataStore` objects.
//! Invariants: Table names are unique; adding an existing name replaces the store.
use std::collections::BTreeMap;

use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::store::{DataStore, StoreResolver};

#[derive(Default)]
pub struct Catalog {
    tables: BTreeMap<String, Box<dyn DataStore>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store previously registered under `name`, if any.
    pub fn add_table(
        &mut self,
        name: impl Into<String>,
        store: impl DataStore + 'static,
    ) -> Option<Box<dyn DataStore>> {
        let name = name.into();
        debug!(table = %name, "registered table");
        self.tables.insert(name, Box::new(store))
    }

    pub fn with_table(mut self, name: impl Into<String>, store: impl DataStore + 'static) -> Self {
        self.add_table(name, store);
        self
    }

    pub fn remove_table(&mut self, name: &str) -> Option<Box<dyn DataStore>> {
        self.tables.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Result<&dyn DataStore, Error> {
        match self.tables.get(name) {
            Some(store) => Ok(store.as_ref()),
            None => Err(table_not_found(name)),
        }
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut dyn DataStore, Error> {
        match self.tables.get_mut(name) {
            Some(store) => Ok(store.as_mut()),
            None => Err(table_not_found(name)),
        }
    }
}

impl StoreResolver for Catalog {
    fn resolve(&self, table: &str) -> Result<&dyn DataStore, Error> {
        self.table(table)
    }

    fn resolve_mut(&mut self, table: &str) -> Result<&mut dyn DataStore, Error> {
        self.table_mut(table)
    }
}

fn table_not_found(name: &str) -> Error {
    Error::new(ErrorKind::TableNotFound)
        .with_message("no store registered for table")
        .with_table(name)
}
