//! Purpose: CRUD facade over one `DataStore` with strict and lenient lookups.
//! Exports: `Repository`.
//! Role: Entry point for application code; builders hang off `query()`/`join_query()`.
//! Invariants: Strict operations (`find_by_id`, `update`, `delete`) fail with `RowNotFound`.
//! Invariants: Batch calls fall back to per-item calls when the store offers no batch primitive.
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::join::JoinQueryBuilder;
use crate::api::query::QueryBuilder;
use crate::core::condition::QueryOptions;
use crate::core::error::Error;
use crate::core::row::{Fields, Row, RowId};
use crate::core::store::{DataStore, StoreResolver};

pub struct Repository<S> {
    store: S,
}

impl<S: DataStore> Repository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn find_all(&self) -> Result<Vec<Row>, Error> {
        self.store.find_all()
    }

    pub fn find(&self, options: &QueryOptions) -> Result<Vec<Row>, Error> {
        self.store.find(options)
    }

    pub fn find_by_id(&self, id: impl Into<RowId>) -> Result<Row, Error> {
        let id = id.into();
        self.store
            .find_by_id(&id)?
            .ok_or_else(|| Error::row_not_found(&id))
    }

    pub fn find_by_id_or_null(&self, id: impl Into<RowId>) -> Result<Option<Row>, Error> {
        self.store.find_by_id(&id.into())
    }

    pub fn insert(&mut self, data: Fields) -> Result<Row, Error> {
        self.store.insert(data)
    }

    pub fn update(&mut self, id: impl Into<RowId>, data: Fields) -> Result<Row, Error> {
        let id = id.into();
        self.store
            .update(&id, data)?
            .ok_or_else(|| Error::row_not_found(&id))
    }

    pub fn update_if_exists(&mut self, id: impl Into<RowId>, data: Fields) -> Result<Option<Row>, Error> {
        self.store.update(&id.into(), data)
    }

    pub fn delete(&mut self, id: impl Into<RowId>) -> Result<(), Error> {
        let id = id.into();
        if self.store.delete(&id)? {
            Ok(())
        } else {
            Err(Error::row_not_found(&id))
        }
    }

    pub fn delete_if_exists(&mut self, id: impl Into<RowId>) -> Result<bool, Error> {
        self.store.delete(&id.into())
    }

    pub fn batch_insert(&mut self, items: Vec<Fields>) -> Result<Vec<Row>, Error> {
        if let Some(result) = self.store.batch_insert(&items) {
            return result;
        }
        debug!(items = items.len(), "store has no batch insert; inserting one by one");
        items.into_iter().map(|data| self.store.insert(data)).collect()
    }

    /// Unknown ids are skipped, so the result may be shorter than `items`.
    pub fn batch_update(&mut self, items: Vec<(RowId, Fields)>) -> Result<Vec<Row>, Error> {
        if let Some(result) = self.store.batch_update(&items) {
            return result;
        }
        debug!(items = items.len(), "store has no batch update; updating one by one");
        let mut updated = Vec::with_capacity(items.len());
        for (id, data) in items {
            if let Some(row) = self.store.update(&id, data)? {
                updated.push(row);
            }
        }
        Ok(updated)
    }

    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.store)
    }

    pub fn join_query<'a>(&'a self, resolver: &'a dyn StoreResolver) -> JoinQueryBuilder<'a> {
        JoinQueryBuilder::new(&self.store, resolver)
    }

    /// Serializes `record` and inserts it; the returned row carries the assigned id.
    pub fn insert_record<T: Serialize>(&mut self, record: &T) -> Result<Row, Error> {
        let fields = Row::fields_of(record)?;
        self.store.insert(fields)
    }

    pub fn find_record<T: DeserializeOwned>(&self, id: impl Into<RowId>) -> Result<T, Error> {
        self.find_by_id(id)?.decode()
    }
}

#[cfg(test)]
mod tests {
    use super::Repository;
    use crate::core::condition::QueryOptions;
    use crate::core::error::ErrorKind;
    use crate::core::memory::MemoryStore;
    use crate::core::plan::scan;
    use crate::core::row::{Fields, Row, RowId};
    use crate::core::store::DataStore;
    use crate::core::error::Error;
    use serde::{Deserialize, Serialize};
    use serde_json::{Value, json};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    /// Minimal store with no batch primitives.
    #[derive(Default)]
    struct PlainStore {
        rows: Vec<Row>,
        inserts: usize,
    }

    impl DataStore for PlainStore {
        fn find_all(&self) -> Result<Vec<Row>, Error> {
            Ok(self.rows.clone())
        }

        fn find(&self, options: &QueryOptions) -> Result<Vec<Row>, Error> {
            scan(self.rows.clone(), options)
        }

        fn find_by_id(&self, id: &RowId) -> Result<Option<Row>, Error> {
            Ok(self.rows.iter().find(|row| row.id() == id).cloned())
        }

        fn insert(&mut self, data: Fields) -> Result<Row, Error> {
            self.inserts += 1;
            let row = Row::new(RowId::Int(self.rows.len() as i64 + 1), data);
            self.rows.push(row.clone());
            Ok(row)
        }

        fn update(&mut self, id: &RowId, data: Fields) -> Result<Option<Row>, Error> {
            let Some(row) = self.rows.iter_mut().find(|row| row.id() == id) else {
                return Ok(None);
            };
            row.merge(&data);
            Ok(Some(row.clone()))
        }

        fn delete(&mut self, id: &RowId) -> Result<bool, Error> {
            let before = self.rows.len();
            self.rows.retain(|row| row.id() != id);
            Ok(self.rows.len() != before)
        }

        fn clear_field(&mut self, id: &RowId, field: &str) -> Result<Option<Row>, Error> {
            let Some(row) = self.rows.iter_mut().find(|row| row.id() == id) else {
                return Ok(None);
            };
            row.remove(field);
            Ok(Some(row.clone()))
        }
    }

    #[test]
    fn strict_and_lenient_lookups() {
        let mut repo = Repository::new(MemoryStore::new("users"));
        let row = repo.insert(fields(json!({"name": "ann"}))).unwrap();
        assert_eq!(row.id(), &RowId::Int(1));

        assert_eq!(repo.find_by_id(1).unwrap().get("name"), Some(&json!("ann")));
        let err = repo.find_by_id(42).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RowNotFound);
        assert_eq!(err.id(), Some(&RowId::Int(42)));
        assert!(repo.find_by_id_or_null(42).unwrap().is_none());

        assert_eq!(repo.update(42, Fields::new()).unwrap_err().kind(), ErrorKind::RowNotFound);
        assert!(repo.update_if_exists(42, Fields::new()).unwrap().is_none());
        let updated = repo.update(1, fields(json!({"age": 30}))).unwrap();
        assert_eq!(updated.get("age"), Some(&json!(30)));
        assert_eq!(updated.get("name"), Some(&json!("ann")));

        assert_eq!(repo.delete(42).unwrap_err().kind(), ErrorKind::RowNotFound);
        assert!(!repo.delete_if_exists(42).unwrap());
        repo.delete(1).unwrap();
        assert!(repo.find_all().unwrap().is_empty());
    }

    #[test]
    fn batches_fall_back_to_single_calls() {
        let mut repo = Repository::new(PlainStore::default());
        let rows = repo
            .batch_insert(vec![fields(json!({"n": 1})), fields(json!({"n": 2}))])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(repo.store().inserts, 2);

        let updated = repo
            .batch_update(vec![
                (RowId::Int(2), fields(json!({"n": 20}))),
                (RowId::Int(9), fields(json!({"n": 90}))),
            ])
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(repo.find_by_id(2).unwrap().get("n"), Some(&json!(20)));
        assert_eq!(repo.query().where_eq("n", 1).count().unwrap(), 1);
    }

    #[test]
    fn batch_insert_uses_the_store_primitive() {
        let mut repo = Repository::new(MemoryStore::new("t"));
        let rows = repo
            .batch_insert(vec![fields(json!({"n": 1})), fields(json!({"n": 2}))])
            .unwrap();
        let ids: Vec<String> = rows.iter().map(|row| row.id().to_string()).collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        name: String,
    }

    #[test]
    fn typed_records_round_trip_through_rows() {
        let mut repo = Repository::new(MemoryStore::new("users"));
        let row = repo
            .insert_record(&User {
                id: None,
                name: "ann".to_string(),
            })
            .unwrap();
        let user: User = repo.find_record(row.id().clone()).unwrap();
        assert_eq!(
            user,
            User {
                id: Some(1),
                name: "ann".to_string()
            }
        );
    }
}
