//! Purpose: In-memory reference implementation of `DataStore` with secondary indexes.
//! Exports: `MemoryStore`, `StoreOptions`.
//! Role: Default backend for tests, the CLI, and embedded use; defines the `find` semantics adapters copy.
//! Invariants: Rows iterate in insertion order; index hits are re-materialized in that order.
//! Invariants: Indexes are keyed by `RowId`, so deletes never shift other entries.
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, trace};

use crate::core::condition::QueryOptions;
use crate::core::error::{Error, ErrorKind};
use crate::core::index::{IndexDefinition, IndexManager, IndexStats};
use crate::core::plan::{QueryPlan, finish_rows, plan_find};
use crate::core::row::{Fields, ID_FIELD, Row, RowId};
use crate::core::store::{DataStore, IdMode};

#[derive(Clone, Debug, Default)]
pub struct StoreOptions {
    pub id_mode: IdMode,
    pub indexes: Vec<IndexDefinition>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_mode(mut self, id_mode: IdMode) -> Self {
        self.id_mode = id_mode;
        self
    }

    pub fn with_index(mut self, definition: IndexDefinition) -> Self {
        self.indexes.push(definition);
        self
    }
}

#[derive(Clone, Debug)]
pub struct MemoryStore {
    name: String,
    id_mode: IdMode,
    /// Insertion sequence -> row. The sequence is never reused.
    rows: BTreeMap<u64, Row>,
    slots: HashMap<RowId, u64>,
    next_slot: u64,
    /// `None` once the integer id space is used up.
    next_id: Option<i64>,
    indexes: IndexManager<RowId>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, StoreOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: StoreOptions) -> Self {
        Self {
            name: name.into(),
            id_mode: options.id_mode,
            rows: BTreeMap::new(),
            slots: HashMap::new(),
            next_slot: 0,
            next_id: Some(1),
            indexes: IndexManager::new(options.indexes),
        }
    }

    /// Loads rows that already carry ids, e.g. from a JSON file. Auto ids
    /// continue after the largest integer id loaded.
    pub fn from_rows(
        name: impl Into<String>,
        rows: Vec<Row>,
        options: StoreOptions,
    ) -> Result<Self, Error> {
        let mut store = Self::with_options(name, options);
        for row in rows {
            if store.slots.contains_key(row.id()) {
                return Err(store.duplicate_id(row.id()));
            }
            if let RowId::Int(n) = row.id() {
                store.next_id = match (store.next_id, n.checked_add(1)) {
                    (Some(next), Some(after)) => Some(next.max(after)),
                    _ => None,
                };
            }
            store.place(row);
        }
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_mode(&self) -> IdMode {
        self.id_mode
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index_stats(&self) -> IndexStats {
        self.indexes.stats()
    }

    pub fn index_definitions(&self) -> Vec<IndexDefinition> {
        self.indexes.definitions().cloned().collect()
    }

    /// Plan that `find` would use for `options`.
    pub fn explain(&self, options: &QueryOptions) -> Result<QueryPlan, Error> {
        options.validate()?;
        Ok(plan_find(&options.conditions, &self.indexes).describe(&options.conditions))
    }

    fn place(&mut self, row: Row) -> Row {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.indexes.add_to_index(row.id().clone(), &row);
        self.slots.insert(row.id().clone(), slot);
        self.rows.insert(slot, row.clone());
        row
    }

    fn assign_id(&mut self, data: &Fields) -> Result<RowId, Error> {
        match self.id_mode {
            IdMode::Auto => {
                let next = self.next_id.ok_or_else(|| {
                    Error::new(ErrorKind::InvalidRow)
                        .with_message("auto id space exhausted")
                        .with_hint("Switch the table to client ids or compact its integer ids.")
                        .with_table(&self.name)
                })?;
                let id = RowId::Int(next);
                if self.slots.contains_key(&id) {
                    return Err(self.duplicate_id(&id));
                }
                self.next_id = next.checked_add(1);
                Ok(id)
            }
            IdMode::Client => {
                let id = self.client_id(data)?;
                if self.slots.contains_key(&id) {
                    return Err(self.duplicate_id(&id));
                }
                Ok(id)
            }
        }
    }

    fn client_id(&self, data: &Fields) -> Result<RowId, Error> {
        let raw = data.get(ID_FIELD).ok_or_else(|| {
            Error::new(ErrorKind::InvalidRow)
                .with_message("client id mode requires an id on insert")
                .with_table(&self.name)
        })?;
        RowId::from_value(raw).map_err(|err| err.with_table(&self.name))
    }

    fn duplicate_id(&self, id: &RowId) -> Error {
        Error::new(ErrorKind::DuplicateId)
            .with_message("id already exists")
            .with_table(&self.name)
            .with_id(id.clone())
    }

    fn modify<F>(&mut self, id: &RowId, change: F) -> Option<Row>
    where
        F: FnOnce(&mut Row),
    {
        let slot = *self.slots.get(id)?;
        let row = self.rows.get_mut(&slot)?;
        let old = row.clone();
        change(row);
        self.indexes.update_index(id, &old, row);
        Some(row.clone())
    }
}

impl DataStore for MemoryStore {
    fn find_all(&self) -> Result<Vec<Row>, Error> {
        Ok(self.rows.values().cloned().collect())
    }

    fn find(&self, options: &QueryOptions) -> Result<Vec<Row>, Error> {
        options.validate()?;
        let plan = plan_find(&options.conditions, &self.indexes);
        trace!(
            table = %self.name,
            indexes = ?plan.indexes_used,
            full_scan = plan.candidates.is_none(),
            "planned find"
        );

        let candidates = match &plan.candidates {
            Some(keys) => {
                let mut slots: Vec<u64> = keys
                    .iter()
                    .filter_map(|id| self.slots.get(id).copied())
                    .collect();
                slots.sort_unstable();
                slots
                    .iter()
                    .filter_map(|slot| self.rows.get(slot).cloned())
                    .collect()
            }
            None => self.rows.values().cloned().collect(),
        };

        Ok(finish_rows(candidates, options, &plan.covered))
    }

    fn find_by_id(&self, id: &RowId) -> Result<Option<Row>, Error> {
        Ok(self
            .slots
            .get(id)
            .and_then(|slot| self.rows.get(slot))
            .cloned())
    }

    fn insert(&mut self, mut data: Fields) -> Result<Row, Error> {
        let id = self.assign_id(&data)?;
        data.remove(ID_FIELD);
        let row = self.place(Row::new(id, data));
        debug!(table = %self.name, id = %row.id(), "inserted row");
        Ok(row)
    }

    fn update(&mut self, id: &RowId, data: Fields) -> Result<Option<Row>, Error> {
        let updated = self.modify(id, |row| row.merge(&data));
        if updated.is_some() {
            debug!(table = %self.name, %id, "updated row");
        }
        Ok(updated)
    }

    fn delete(&mut self, id: &RowId) -> Result<bool, Error> {
        let Some(slot) = self.slots.remove(id) else {
            return Ok(false);
        };
        if let Some(row) = self.rows.remove(&slot) {
            self.indexes.remove_from_index(id, &row);
        }
        debug!(table = %self.name, %id, "deleted row");
        Ok(true)
    }

    fn clear_field(&mut self, id: &RowId, field: &str) -> Result<Option<Row>, Error> {
        Ok(self.modify(id, |row| {
            row.remove(field);
        }))
    }

    fn batch_insert(&mut self, items: &[Fields]) -> Option<Result<Vec<Row>, Error>> {
        if self.id_mode == IdMode::Client {
            let mut seen = HashSet::new();
            for data in items {
                let id = match self.client_id(data) {
                    Ok(id) => id,
                    Err(err) => return Some(Err(err)),
                };
                if self.slots.contains_key(&id) || !seen.insert(id.clone()) {
                    return Some(Err(self.duplicate_id(&id)));
                }
            }
        }
        let result = items
            .iter()
            .map(|data| self.insert(data.clone()))
            .collect::<Result<Vec<_>, _>>();
        Some(result)
    }

    fn batch_update(&mut self, items: &[(RowId, Fields)]) -> Option<Result<Vec<Row>, Error>> {
        let updated = items
            .iter()
            .filter_map(|(id, data)| self.modify(id, |row| row.merge(data)))
            .collect();
        Some(Ok(updated))
    }

    fn create_index(&mut self, definition: IndexDefinition) -> Result<bool, Error> {
        let name = definition.name();
        if !self.indexes.add_definition(definition) {
            return Ok(false);
        }
        self.indexes
            .rebuild(self.rows.values().map(|row| (row.id().clone(), row)));
        debug!(table = %self.name, index = %name, "created index");
        Ok(true)
    }
}
