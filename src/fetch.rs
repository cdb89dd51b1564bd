// Copyright 2025 Cowboy AI, LLC.

//! Single-document fetch
//!
//! Plain reads of source documents by external identity or local
//! identity, consumed by the HTTP adapter's fetch routes.

use serde_json::Value;
use std::sync::Arc;

use crate::entities::EntityType;
use crate::errors::{AggregationError, AggregationResult};
use crate::store::{Filter, Store};

/// Fetches single source documents.
pub struct SingleFetch {
    store: Arc<dyn Store>,
}

impl SingleFetch {
    /// Create a fetcher over a store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fetch a source document by `(scope, id)`.
    ///
    /// Only simple-key types are addressable this way.
    pub async fn by_external(
        &self,
        entity_type: EntityType,
        scope: &str,
        id: &str,
    ) -> AggregationResult<Value> {
        if !entity_type.has_simple_key() {
            return Err(AggregationError::InvalidInput {
                reason: format!(
                    "{} documents are not addressable by (scope, id)",
                    entity_type.api_name()
                ),
            });
        }
        if scope.is_empty() || id.is_empty() {
            return Err(AggregationError::InvalidInput {
                reason: "externalIdScope and externalId must be non-empty".to_string(),
            });
        }
        let filter = Filter::new()
            .eq("externalIdScope", scope)
            .eq("externalId", id);
        self.store
            .find_one(entity_type.collection(), &filter)
            .await?
            .ok_or_else(|| AggregationError::NotFound {
                entity_type,
                selector: format!("{scope}/{id}"),
            })
    }

    /// Fetch a source document by its stable local identity.
    pub async fn by_gameday_id(
        &self,
        entity_type: EntityType,
        gameday_id: &str,
    ) -> AggregationResult<Value> {
        if gameday_id.is_empty() {
            return Err(AggregationError::InvalidInput {
                reason: "gamedayId must be non-empty".to_string(),
            });
        }
        let filter = Filter::new().eq("gamedayId", gameday_id);
        self.store
            .find_one(entity_type.collection(), &filter)
            .await?
            .ok_or_else(|| AggregationError::NotFound {
                entity_type,
                selector: gameday_id.to_string(),
            })
    }
}
