//! Purpose: Secondary indexes (single-field and compound) over row data.
//! Exports: `IndexDefinition`, `IndexManager`, `IndexStats`.
//! Role: Pure in-memory structure consulted by the query executor; performs no I/O.
//! Invariants: Field order is part of an index's identity; `[a,b]` never serves `[b,a]` or `[b]`.
//! Invariants: Per definition, the union of all buckets equals the set of live row keys.
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde_json::Value;

use crate::core::row::Row;
use crate::core::value::tuple_key;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexDefinition {
    pub fields: Vec<String>,
    /// Declared only; duplicates are not rejected.
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unique: true,
            ..Self::new(fields)
        }
    }

    pub fn name(&self) -> String {
        self.fields.join(",")
    }

    fn covers<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        self.fields.len() == fields.len()
            && self
                .fields
                .iter()
                .zip(fields)
                .all(|(own, other)| own == other.as_ref())
    }

    fn key_for(&self, row: &Row) -> String {
        tuple_key(self.fields.iter().map(|field| row.get(field)))
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IndexStats {
    pub definitions: usize,
    pub compound: usize,
    pub buckets: usize,
    pub entries: usize,
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Indexes: {} | Compound: {} | Buckets: {} | Entries: {}",
            self.definitions, self.compound, self.buckets, self.entries
        )
    }
}

#[derive(Clone, Debug)]
struct FieldIndex<K> {
    definition: IndexDefinition,
    buckets: HashMap<String, BTreeSet<K>>,
}

impl<K: Ord + Clone> FieldIndex<K> {
    fn insert(&mut self, bucket: String, key: K) {
        self.buckets.entry(bucket).or_default().insert(key);
    }

    fn remove(&mut self, bucket: &str, key: &K) {
        if let Some(set) = self.buckets.get_mut(bucket) {
            set.remove(key);
            if set.is_empty() {
                self.buckets.remove(bucket);
            }
        }
    }
}

/// Indexes keyed by `K`: a stable row id for the memory store, or a
/// contiguous position for array-backed stores (see `reindex_after_delete`).
#[derive(Clone, Debug)]
pub struct IndexManager<K> {
    indexes: Vec<FieldIndex<K>>,
}

impl<K> Default for IndexManager<K> {
    fn default() -> Self {
        Self {
            indexes: Vec::new(),
        }
    }
}

impl<K: Ord + Clone> IndexManager<K> {
    pub fn new(definitions: impl IntoIterator<Item = IndexDefinition>) -> Self {
        let mut manager = Self::default();
        for definition in definitions {
            manager.add_definition(definition);
        }
        manager
    }

    /// Registers a definition with empty buckets; call `rebuild` to populate.
    /// Returns false if the same field list is already indexed.
    pub fn add_definition(&mut self, definition: IndexDefinition) -> bool {
        if definition.fields.is_empty() || self.find(&definition.fields).is_some() {
            return false;
        }
        self.indexes.push(FieldIndex {
            definition,
            buckets: HashMap::new(),
        });
        true
    }

    pub fn definitions(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.indexes.iter().map(|index| &index.definition)
    }

    pub fn has_index<S: AsRef<str>>(&self, fields: &[S]) -> bool {
        self.find(fields).is_some()
    }

    pub fn rebuild<'a, I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = (K, &'a Row)>,
    {
        for index in &mut self.indexes {
            index.buckets.clear();
        }
        for (key, row) in rows {
            self.add_to_index(key, row);
        }
    }

    pub fn add_to_index(&mut self, key: K, row: &Row) {
        for index in &mut self.indexes {
            let bucket = index.definition.key_for(row);
            index.insert(bucket, key.clone());
        }
    }

    pub fn remove_from_index(&mut self, key: &K, row: &Row) {
        for index in &mut self.indexes {
            let bucket = index.definition.key_for(row);
            index.remove(&bucket, key);
        }
    }

    /// Moves `key` between buckets only for indexes whose value tuple changed.
    pub fn update_index(&mut self, key: &K, old_row: &Row, new_row: &Row) {
        for index in &mut self.indexes {
            let old_bucket = index.definition.key_for(old_row);
            let new_bucket = index.definition.key_for(new_row);
            if old_bucket == new_bucket {
                continue;
            }
            index.remove(&old_bucket, key);
            index.insert(new_bucket, key.clone());
        }
    }

    /// Keys whose values equal `values` on exactly `fields`, or `None` when no
    /// index has that field list.
    pub fn lookup<S: AsRef<str>>(&self, fields: &[S], values: &[Value]) -> Option<BTreeSet<K>> {
        if fields.len() != values.len() {
            return None;
        }
        let index = self.find(fields)?;
        let bucket = tuple_key(values.iter().map(Some));
        Some(index.buckets.get(&bucket).cloned().unwrap_or_default())
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            definitions: self.indexes.len(),
            ..IndexStats::default()
        };
        for index in &self.indexes {
            if index.definition.fields.len() > 1 {
                stats.compound += 1;
            }
            stats.buckets += index.buckets.len();
            stats.entries += index.buckets.values().map(BTreeSet::len).sum::<usize>();
        }
        stats
    }

    fn find<S: AsRef<str>>(&self, fields: &[S]) -> Option<&FieldIndex<K>> {
        self.indexes
            .iter()
            .find(|index| index.definition.covers(fields))
    }
}

impl IndexManager<usize> {
    /// Shifts every position above `deleted` down by one. Call after the
    /// deleted row was removed with `remove_from_index`.
    pub fn reindex_after_delete(&mut self, deleted: usize) {
        for index in &mut self.indexes {
            for set in index.buckets.values_mut() {
                if set.last().is_none_or(|last| *last <= deleted) {
                    continue;
                }
                *set = set
                    .iter()
                    .map(|&pos| if pos > deleted { pos - 1 } else { pos })
                    .collect();
            }
        }
    }
}
