// Copyright 2025 Cowboy AI, LLC.

//! Store contract consumed by the aggregation core
//!
//! The core talks to its document store through the [`Store`] trait and a
//! typed filter/update representation, bounded to the collections named
//! by the entity tables. Adapters translate these shapes onto a concrete
//! store; [`MemoryStore`] is the in-process implementation used by tests
//! and self-contained deployments.
//!
//! Every trait method is a suspension point; callers must not hold
//! in-memory locks across them.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::entities::EntityType;

/// Errors raised by store adapters.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A named collection is outside the configured set
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// One condition of a conjunctive filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals value
    Eq(String, Value),
    /// Field value is one of the given values
    In(String, Vec<Value>),
    /// Array field has at least one element matching the inner filter
    ElemMatch(String, Filter),
    /// Field presence
    Exists(String, bool),
}

/// A conjunctive document filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// An empty filter matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a field to equal a value.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.into(), value.into()));
        self
    }

    /// Require a field value to be one of the given values.
    pub fn is_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::In(field.into(), values));
        self
    }

    /// Require an array field to hold an element matching the inner
    /// filter.
    pub fn elem_match(mut self, field: impl Into<String>, inner: Filter) -> Self {
        self.conditions
            .push(Condition::ElemMatch(field.into(), inner));
        self
    }

    /// Require a field to be present or absent.
    pub fn exists(mut self, field: impl Into<String>, present: bool) -> Self {
        self.conditions
            .push(Condition::Exists(field.into(), present));
        self
    }

    /// The conditions of this filter.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Eq(field, value) => doc.get(field) == Some(value),
            Condition::In(field, values) => doc
                .get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Condition::ElemMatch(field, inner) => doc
                .get(field)
                .and_then(Value::as_array)
                .map(|entries| entries.iter().any(|entry| inner.matches(entry)))
                .unwrap_or(false),
            Condition::Exists(field, present) => {
                let held = doc.get(field).map(|v| !v.is_null()).unwrap_or(false);
                held == *present
            }
        })
    }

    /// The equality pairs of this filter, used to seed upserted
    /// documents.
    pub fn equality_pairs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter().filter_map(|c| match c {
            Condition::Eq(field, value) => Some((field.as_str(), value)),
            _ => None,
        })
    }
}

/// One mutation of an update specification.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Set a field to a value
    Set(String, Value),
    /// Remove a value from an array field
    Pull(String, Value),
    /// Append a value to an array field unless already present
    AddToSet(String, Value),
    /// Set one entry of a map field
    SetMapEntry(String, String, Value),
    /// Remove one entry of a map field
    UnsetMapEntry(String, String),
}

/// An ordered list of mutations applied to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    ops: Vec<UpdateOp>,
}

impl UpdateSpec {
    /// An empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field to a value.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(field.into(), value.into()));
        self
    }

    /// Remove a value from an array field.
    pub fn pull(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Pull(field.into(), value.into()));
        self
    }

    /// Append a value to an array field unless already present.
    pub fn add_to_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::AddToSet(field.into(), value.into()));
        self
    }

    /// Set one entry of a map field, creating the map if absent.
    pub fn set_map_entry(
        mut self,
        field: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.ops
            .push(UpdateOp::SetMapEntry(field.into(), key.into(), value.into()));
        self
    }

    /// Remove one entry of a map field.
    pub fn unset_map_entry(mut self, field: impl Into<String>, key: impl Into<String>) -> Self {
        self.ops
            .push(UpdateOp::UnsetMapEntry(field.into(), key.into()));
        self
    }

    /// The mutations of this update, in application order.
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Whether the update mutates nothing.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply the mutations to a document in order.
    pub fn apply(&self, doc: &mut Value) {
        let Some(obj) = doc.as_object_mut() else {
            return;
        };
        for op in &self.ops {
            match op {
                UpdateOp::Set(field, value) => {
                    obj.insert(field.clone(), value.clone());
                }
                UpdateOp::Pull(field, value) => {
                    if let Some(Value::Array(entries)) = obj.get_mut(field) {
                        entries.retain(|entry| entry != value);
                    }
                }
                UpdateOp::AddToSet(field, value) => {
                    let entries = obj
                        .entry(field.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(entries) = entries {
                        if !entries.contains(value) {
                            entries.push(value.clone());
                        }
                    }
                }
                UpdateOp::SetMapEntry(field, key, value) => {
                    let map = obj
                        .entry(field.clone())
                        .or_insert_with(|| Value::Object(serde_json::Map::new()));
                    if let Value::Object(map) = map {
                        map.insert(key.clone(), value.clone());
                    }
                }
                UpdateOp::UnsetMapEntry(field, key) => {
                    if let Some(Value::Object(map)) = obj.get_mut(field) {
                        map.remove(key);
                    }
                }
            }
        }
    }
}

/// One write of a bulk submission.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    /// Replace the matched document wholesale, inserting when unmatched
    ReplaceUpsert {
        /// Match filter
        filter: Filter,
        /// Replacement document
        document: Value,
    },
    /// Apply an update to the first matched document
    UpdateOne {
        /// Match filter
        filter: Filter,
        /// Mutations to apply
        update: UpdateSpec,
        /// Insert a document seeded from the filter when unmatched
        upsert: bool,
    },
}

/// Counts reported by a bulk submission.
///
/// Adapters apply every write they can and report failures in the count
/// rather than aborting the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteOutcome {
    /// Writes submitted
    pub attempted: usize,
    /// Writes applied
    pub applied: usize,
    /// Writes that failed
    pub failed: usize,
}

/// An index requirement on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name, stable across probes
    pub name: String,
    /// Indexed fields, in order
    pub fields: Vec<String>,
    /// Whether the index enforces uniqueness
    pub unique: bool,
}

/// The store capability consumed by the aggregation core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Find the first document matching a filter.
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Value>>;

    /// Find every document matching a filter.
    async fn find_matching(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>>;

    /// Count the documents matching a filter.
    async fn count_matching(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Apply a bulk of writes in submission order.
    async fn bulk_write(
        &self,
        collection: &str,
        writes: Vec<WriteModel>,
    ) -> StoreResult<BulkWriteOutcome>;

    /// Create an index.
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()>;

    /// Whether an index with the given name exists.
    async fn index_exists(&self, collection: &str, name: &str) -> StoreResult<bool>;

    /// Whether a collection exists.
    async fn collection_exists(&self, collection: &str) -> StoreResult<bool>;
}

/// The indexes required on the materialised collection.
pub fn materialised_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec {
            name: "resourceType_externalKey_unique".to_string(),
            fields: vec!["resourceType".to_string(), "externalKey".to_string()],
            unique: true,
        },
        IndexSpec {
            name: "resourceType_gamedayId".to_string(),
            fields: vec!["resourceType".to_string(), "gamedayId".to_string()],
            unique: false,
        },
    ]
}

/// The index required on each source collection.
pub fn source_index() -> IndexSpec {
    IndexSpec {
        name: "externalIdScope_externalId".to_string(),
        fields: vec!["externalIdScope".to_string(), "externalId".to_string()],
        unique: false,
    }
}

/// Probe and create the required indexes once at startup.
///
/// Idempotent: indexes already present are left untouched.
pub async fn ensure_indexes(store: &dyn Store, materialised_collection: &str) -> StoreResult<()> {
    for index in materialised_indexes() {
        if !store.index_exists(materialised_collection, &index.name).await? {
            store.create_index(materialised_collection, &index).await?;
            tracing::info!(
                collection = materialised_collection,
                index = index.name,
                "created index"
            );
        }
    }
    let index = source_index();
    for entity_type in EntityType::ALL {
        let collection = entity_type.collection();
        if !store.index_exists(collection, &index.name).await? {
            store.create_index(collection, &index).await?;
            tracing::info!(collection, index = index.name, "created index");
        }
    }
    Ok(())
}
