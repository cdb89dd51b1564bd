// Copyright 2025 Cowboy AI, LLC.

//! Document shapes crossing the store boundary
//!
//! Source documents stay as raw JSON values and are read through the
//! accessors here; the materialised aggregation document has a typed
//! in-memory form with explicit conversions to and from its stored JSON
//! shape.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::entities::EntityType;
use crate::errors::{AggregationError, AggregationResult};
use crate::keys::encode_entity_key;

/// An external `(scope, id)` reference to a peer entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalRef {
    /// External id scope
    pub scope: String,
    /// External id
    pub id: String,
}

impl ExternalRef {
    /// Create a reference from owned parts.
    pub fn new(scope: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            id: id.into(),
        }
    }

    /// The composite key form of this reference.
    pub fn key(&self) -> String {
        encode_entity_key(&self.id, &self.scope)
    }
}

/// Read a field as a non-empty string.
pub fn str_field<'a>(doc: &'a Value, field: &str) -> Option<&'a str> {
    doc.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Read a `(scope, id)` pair; both parts must be non-empty strings.
pub fn scope_id_pair(doc: &Value, scope_field: &str, id_field: &str) -> Option<ExternalRef> {
    let scope = str_field(doc, scope_field)?;
    let id = str_field(doc, id_field)?;
    Some(ExternalRef::new(scope, id))
}

/// Read a source document's own external identity.
pub fn identity(doc: &Value) -> Option<ExternalRef> {
    scope_id_pair(doc, "externalIdScope", "externalId")
}

/// Read a source document's stable local identity.
pub fn gameday_id(doc: &Value) -> Option<String> {
    str_field(doc, "gamedayId").map(str::to_string)
}

/// Read an embedded array field; absent or non-array fields read as empty.
pub fn array_field<'a>(doc: &'a Value, field: &str) -> &'a [Value] {
    doc.get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Select the display name from a source document's language map using
/// its `defaultLanguage` selector.
pub fn default_name(doc: &Value) -> Option<String> {
    let language = str_field(doc, "defaultLanguage")?;
    doc.get("name")
        .and_then(|names| names.get(language))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// One neighbour-type projection: the deduplicated `gamedayId` collection
/// and the insertion-ordered map of composite external keys to ids.
///
/// A key may map to no id when the referenced document was absent at
/// resolution time; such stale keys are permitted and repaired by later
/// reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    ids: Vec<String>,
    keys: IndexMap<String, Option<String>>,
}

impl Projection {
    /// Create an empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key/id pair, deduplicating both sides.
    ///
    /// A later insert with a resolved id fills a previously stale key.
    pub fn insert(&mut self, key: String, id: Option<String>) {
        match self.keys.get_mut(&key) {
            Some(existing) => {
                if existing.is_none() {
                    *existing = id.clone();
                }
            }
            None => {
                self.keys.insert(key, id.clone());
            }
        }
        if let Some(id) = id {
            if !self.ids.contains(&id) {
                self.ids.push(id);
            }
        }
    }

    /// Merge another projection into this one.
    pub fn merge(&mut self, other: Projection) {
        for (key, id) in other.keys {
            self.insert(key, id);
        }
    }

    /// The ordered, deduplicated `gamedayId` collection.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// The insertion-ordered key map.
    pub fn keys(&self) -> &IndexMap<String, Option<String>> {
        &self.keys
    }

    /// The set of composite keys, in insertion order.
    pub fn key_set(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    /// Whether the projection holds neither ids nor keys.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.keys.is_empty()
    }

    fn to_values(&self) -> (Value, Value) {
        let ids = Value::Array(self.ids.iter().cloned().map(Value::String).collect());
        let keys = Value::Object(
            self.keys
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        v.clone().map_or(Value::Null, Value::String),
                    )
                })
                .collect(),
        );
        (ids, keys)
    }

    fn from_values(ids: Option<&Value>, keys: Option<&Value>) -> Self {
        let mut projection = Projection::new();
        if let Some(Value::Object(map)) = keys {
            for (key, id) in map {
                projection.insert(key.clone(), id.as_str().map(str::to_string));
            }
        }
        if let Some(Value::Array(ids)) = ids {
            for id in ids.iter().filter_map(Value::as_str) {
                if !projection.ids.contains(&id.to_string()) {
                    projection.ids.push(id.to_string());
                }
            }
        }
        projection
    }
}

/// A materialised aggregation document in its typed form.
///
/// One exists per `(resourceType, externalKey)`; it caches the source
/// entity's reachable neighbours as per-type [`Projection`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialisedAggregation {
    /// Lower-case resource type
    pub resource_type: String,
    /// Composite external key
    pub external_key: String,
    /// Stable local identity of the source entity, when known
    pub gameday_id: Option<String>,
    /// External id of the source entity (simple-key types only)
    pub external_id: Option<String>,
    /// External id scope of the source entity (simple-key types only)
    pub external_id_scope: Option<String>,
    /// Display name selected by the source's default language
    pub name: Option<String>,
    /// Server clock at assembly; monotonically non-decreasing per document
    pub last_updated: DateTime<Utc>,
    /// Neighbour projections keyed by neighbour type
    pub projections: BTreeMap<EntityType, Projection>,
}

impl MaterialisedAggregation {
    /// Create an empty materialised document for an entity.
    pub fn new(entity_type: EntityType, external_key: impl Into<String>) -> Self {
        Self {
            resource_type: entity_type.resource_type().to_string(),
            external_key: external_key.into(),
            gameday_id: None,
            external_id: None,
            external_id_scope: None,
            name: None,
            last_updated: Utc::now(),
            projections: BTreeMap::new(),
        }
    }

    /// The projection for a neighbour type, if present.
    pub fn projection(&self, neighbour: EntityType) -> Option<&Projection> {
        self.projections.get(&neighbour)
    }

    /// Insert or replace the projection for a neighbour type.
    pub fn set_projection(&mut self, neighbour: EntityType, projection: Projection) {
        self.projections.insert(neighbour, projection);
    }

    /// Merge a projection into the one held for a neighbour type.
    pub fn merge_projection(&mut self, neighbour: EntityType, projection: Projection) {
        self.projections
            .entry(neighbour)
            .or_default()
            .merge(projection);
    }

    /// The neighbour types this document projects, in stable order.
    pub fn neighbour_types(&self) -> Vec<EntityType> {
        self.projections.keys().copied().collect()
    }

    /// Convert to the stored JSON shape.
    pub fn to_document(&self) -> Value {
        let mut doc = serde_json::Map::new();
        doc.insert("resourceType".into(), json!(self.resource_type));
        doc.insert("externalKey".into(), json!(self.external_key));
        if let Some(id) = &self.gameday_id {
            doc.insert("gamedayId".into(), json!(id));
        }
        if let Some(id) = &self.external_id {
            doc.insert("_externalId".into(), json!(id));
        }
        if let Some(scope) = &self.external_id_scope {
            doc.insert("_externalIdScope".into(), json!(scope));
        }
        if let Some(name) = &self.name {
            doc.insert("name".into(), json!(name));
        }
        doc.insert("lastUpdated".into(), json!(self.last_updated.to_rfc3339()));
        for (neighbour, projection) in &self.projections {
            let (ids, keys) = projection.to_values();
            doc.insert(neighbour.ids_field().into(), ids);
            doc.insert(neighbour.keys_field().into(), keys);
        }
        Value::Object(doc)
    }

    /// Convert from the stored JSON shape.
    ///
    /// Unrecognised fields are ignored; the identifying pair is required.
    pub fn from_document(doc: &Value) -> AggregationResult<Self> {
        let resource_type = str_field(doc, "resourceType")
            .ok_or_else(|| AggregationError::InvalidInput {
                reason: "materialised document lacks resourceType".to_string(),
            })?
            .to_string();
        let external_key = str_field(doc, "externalKey")
            .ok_or_else(|| AggregationError::InvalidInput {
                reason: "materialised document lacks externalKey".to_string(),
            })?
            .to_string();
        let last_updated = str_field(doc, "lastUpdated")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let mut projections = BTreeMap::new();
        for neighbour in EntityType::ALL {
            let ids = doc.get(neighbour.ids_field());
            let keys = doc.get(neighbour.keys_field());
            if ids.is_some() || keys.is_some() {
                projections.insert(neighbour, Projection::from_values(ids, keys));
            }
        }

        Ok(Self {
            resource_type,
            external_key,
            gameday_id: str_field(doc, "gamedayId").map(str::to_string),
            external_id: str_field(doc, "_externalId").map(str::to_string),
            external_id_scope: str_field(doc, "_externalIdScope").map(str::to_string),
            name: default_materialised_name(doc),
            last_updated,
            projections,
        })
    }
}

// Materialised documents store the already-selected name, not the
// language map.
fn default_materialised_name(doc: &Value) -> Option<String> {
    str_field(doc, "name").map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_str_field_rejects_empty_and_non_strings() {
        let doc = json!({"a": "x", "b": "", "c": 3});
        assert_eq!(str_field(&doc, "a"), Some("x"));
        assert_eq!(str_field(&doc, "b"), None);
        assert_eq!(str_field(&doc, "c"), None);
        assert_eq!(str_field(&doc, "missing"), None);
    }

    #[test]
    fn test_scope_id_pair_requires_both_parts() {
        let doc = json!({"externalVenueIdScope": "fifa", "externalVenueId": "V1"});
        assert_eq!(
            scope_id_pair(&doc, "externalVenueIdScope", "externalVenueId"),
            Some(ExternalRef::new("fifa", "V1"))
        );
        let partial = json!({"externalVenueIdScope": "fifa"});
        assert_eq!(
            scope_id_pair(&partial, "externalVenueIdScope", "externalVenueId"),
            None
        );
    }

    #[test]
    fn test_default_name_selection() {
        let doc = json!({
            "defaultLanguage": "en",
            "name": {"en": "Cup Final", "de": "Pokalfinale"}
        });
        assert_eq!(default_name(&doc), Some("Cup Final".to_string()));

        let missing_language = json!({"name": {"en": "Cup Final"}});
        assert_eq!(default_name(&missing_language), None);

        let missing_entry = json!({"defaultLanguage": "fr", "name": {"en": "Cup Final"}});
        assert_eq!(default_name(&missing_entry), None);
    }

    /// Test projection dedup behaviour
    ///
    /// ```mermaid
    /// graph TD
    ///     A[insert key, id] -->|duplicate key| B[single entry]
    ///     A -->|stale then resolved| C[id filled in]
    /// ```
    #[test]
    fn test_projection_dedupes_keys_and_ids() {
        let mut projection = Projection::new();
        projection.insert("t1 @ fifa".into(), Some("g1".into()));
        projection.insert("t1 @ fifa".into(), Some("g1".into()));
        projection.insert("t2 @ fifa".into(), Some("g2".into()));
        assert_eq!(projection.ids(), &["g1", "g2"]);
        assert_eq!(projection.keys().len(), 2);
    }

    #[test]
    fn test_projection_fills_stale_keys() {
        let mut projection = Projection::new();
        projection.insert("t1 @ fifa".into(), None);
        assert_eq!(projection.ids().len(), 0);
        assert_eq!(projection.keys().len(), 1);

        projection.insert("t1 @ fifa".into(), Some("g1".into()));
        assert_eq!(projection.ids(), &["g1"]);
        assert_eq!(projection.keys().get("t1 @ fifa"), Some(&Some("g1".to_string())));
    }

    #[test]
    fn test_projection_merge() {
        let mut a = Projection::new();
        a.insert("t1 @ fifa".into(), Some("g1".into()));
        let mut b = Projection::new();
        b.insert("t1 @ fifa".into(), Some("g1".into()));
        b.insert("t2 @ fifa".into(), Some("g2".into()));
        a.merge(b);
        assert_eq!(a.ids(), &["g1", "g2"]);
    }

    #[test]
    fn test_materialised_document_round_trip() {
        let mut doc = MaterialisedAggregation::new(EntityType::Competition, "289175 @ fifa");
        doc.gameday_id = Some("gd-1".into());
        doc.external_id = Some("289175".into());
        doc.external_id_scope = Some("fifa".into());
        doc.name = Some("World Cup".into());
        let mut teams = Projection::new();
        teams.insert("t1 @ fifa".into(), Some("g1".into()));
        teams.insert("t2 @ fifa".into(), None);
        doc.set_projection(EntityType::Team, teams);
        doc.set_projection(EntityType::Venue, Projection::new());

        let value = doc.to_document();
        assert_eq!(value["resourceType"], json!("competition"));
        assert_eq!(value["externalKey"], json!("289175 @ fifa"));
        assert_eq!(value["teams"], json!(["g1"]));
        assert_eq!(value["teamKeys"], json!({"t1 @ fifa": "g1", "t2 @ fifa": null}));
        assert_eq!(value["venues"], json!([]));
        assert_eq!(value["venueKeys"], json!({}));

        let back = MaterialisedAggregation::from_document(&value).unwrap();
        assert_eq!(back.resource_type, doc.resource_type);
        assert_eq!(back.external_key, doc.external_key);
        assert_eq!(back.gameday_id, doc.gameday_id);
        assert_eq!(back.name, doc.name);
        assert_eq!(back.projection(EntityType::Team), doc.projection(EntityType::Team));
        assert_eq!(back.projection(EntityType::Venue), doc.projection(EntityType::Venue));
    }

    #[test]
    fn test_from_document_requires_identity_pair() {
        let missing_key = json!({"resourceType": "team"});
        assert!(MaterialisedAggregation::from_document(&missing_key).is_err());
        let missing_type = json!({"externalKey": "t1 @ fifa"});
        assert!(MaterialisedAggregation::from_document(&missing_type).is_err());
    }

    #[test]
    fn test_external_ref_key() {
        let r = ExternalRef::new("fifa", "289175");
        assert_eq!(r.key(), "289175 @ fifa");
    }
}
