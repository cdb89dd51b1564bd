// Copyright 2025 Cowboy AI, LLC.

//! In-memory store adapter
//!
//! Backs tests and self-contained deployments. Collections are plain
//! document vectors behind a `std` read-write lock; the lock is never
//! held across an await point because every operation completes
//! synchronously once the lock is taken.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{
    BulkWriteOutcome, Filter, IndexSpec, Store, StoreResult, WriteModel,
};

/// In-memory document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    indexes: Arc<RwLock<HashMap<String, Vec<IndexSpec>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert documents into a collection, creating it if absent.
    pub fn seed(&self, collection: &str, docs: Vec<Value>) {
        let mut collections = self.collections.write().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
    }

    /// Snapshot the documents of a collection.
    pub fn dump(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Value>> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)).cloned()))
    }

    async fn find_matching(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_matching(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).count() as u64)
            .unwrap_or(0))
    }

    async fn bulk_write(
        &self,
        collection: &str,
        writes: Vec<WriteModel>,
    ) -> StoreResult<BulkWriteOutcome> {
        let mut collections = self.collections.write().unwrap();
        let docs = collections.entry(collection.to_string()).or_default();
        let mut outcome = BulkWriteOutcome {
            attempted: writes.len(),
            ..Default::default()
        };
        for write in writes {
            match write {
                WriteModel::ReplaceUpsert { filter, document } => {
                    match docs.iter_mut().find(|doc| filter.matches(doc)) {
                        Some(existing) => *existing = document,
                        None => docs.push(document),
                    }
                    outcome.applied += 1;
                }
                WriteModel::UpdateOne {
                    filter,
                    update,
                    upsert,
                } => {
                    if let Some(existing) = docs.iter_mut().find(|doc| filter.matches(doc)) {
                        update.apply(existing);
                        outcome.applied += 1;
                    } else if upsert {
                        let mut seeded = Value::Object(
                            filter
                                .equality_pairs()
                                .map(|(field, value)| (field.to_string(), value.clone()))
                                .collect(),
                        );
                        update.apply(&mut seeded);
                        docs.push(seeded);
                        outcome.applied += 1;
                    } else {
                        // Unmatched non-upsert updates are dropped, not errors.
                        outcome.applied += 1;
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        let mut indexes = self.indexes.write().unwrap();
        let entries = indexes.entry(collection.to_string()).or_default();
        if !entries.iter().any(|existing| existing.name == index.name) {
            entries.push(index.clone());
        }
        Ok(())
    }

    async fn index_exists(&self, collection: &str, name: &str) -> StoreResult<bool> {
        let indexes = self.indexes.read().unwrap();
        Ok(indexes
            .get(collection)
            .map(|entries| entries.iter().any(|index| index.name == name))
            .unwrap_or(false))
    }

    async fn collection_exists(&self, collection: &str) -> StoreResult<bool> {
        let collections = self.collections.read().unwrap();
        Ok(collections.contains_key(collection))
    }
}
