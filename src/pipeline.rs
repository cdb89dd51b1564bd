// Copyright 2025 Cowboy AI, LLC.

//! Aggregation build assembly
//!
//! Composes the full projection of one source entity: match the source
//! document, evaluate every facet of its type, fold the resolutions into
//! a materialised document with its meta attributes and server-clock
//! stamp, and upsert it into the materialised collection keyed on
//! `(resourceType, externalKey)`.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::documents::{MaterialisedAggregation, Projection};
use crate::entities::EntityType;
use crate::errors::AggregationResult;
use crate::facets::{facets_for, meta_for, projection_targets};
use crate::store::{Filter, Store, WriteModel};

/// Assembles and executes aggregation builds against a store.
pub struct PipelineAssembler {
    store: Arc<dyn Store>,
    materialised_collection: String,
}

impl PipelineAssembler {
    /// Create an assembler writing into the given materialised
    /// collection.
    pub fn new(store: Arc<dyn Store>, materialised_collection: impl Into<String>) -> Self {
        Self {
            store,
            materialised_collection: materialised_collection.into(),
        }
    }

    /// Compose the materialised document for a source document, without
    /// writing it.
    ///
    /// `None` means the source lacks the identity fields its key layout
    /// requires and cannot be materialised.
    pub async fn assemble(
        &self,
        entity_type: EntityType,
        source: &Value,
    ) -> AggregationResult<Option<MaterialisedAggregation>> {
        let Some(meta) = meta_for(entity_type, source) else {
            tracing::warn!(
                entity_type = entity_type.api_name(),
                "source document lacks identity fields; skipping assembly"
            );
            return Ok(None);
        };

        let mut document = MaterialisedAggregation::new(entity_type, meta.external_key);
        document.gameday_id = meta.gameday_id;
        document.external_id = meta.external_id;
        document.external_id_scope = meta.external_id_scope;
        document.name = meta.name;

        // Every declared neighbour type is present, empty by default.
        for target in projection_targets(entity_type) {
            document.set_projection(*target, Projection::new());
        }

        for facet in facets_for(entity_type) {
            let resolutions = facet.resolve(source, self.store.as_ref()).await?;
            for resolution in resolutions {
                tracing::debug!(
                    entity_type = entity_type.api_name(),
                    facet = facet.name(),
                    target = resolution.target.api_name(),
                    keys = resolution.projection.keys().len(),
                    "facet resolved"
                );
                document.merge_projection(resolution.target, resolution.projection);
            }
        }

        document.last_updated = Utc::now();
        Ok(Some(document))
    }

    /// Match the source document, assemble its projection and upsert the
    /// result.
    ///
    /// Returns the composed document, or `None` when the source is absent
    /// or cannot be materialised. The upsert replaces any existing
    /// document under the same `(resourceType, externalKey)`.
    pub async fn run(
        &self,
        entity_type: EntityType,
        source_filter: &Filter,
    ) -> AggregationResult<Option<MaterialisedAggregation>> {
        let Some(source) = self
            .store
            .find_one(entity_type.collection(), source_filter)
            .await?
        else {
            return Ok(None);
        };

        let Some(document) = self.assemble(entity_type, &source).await? else {
            return Ok(None);
        };

        let filter = Filter::new()
            .eq("resourceType", document.resource_type.clone())
            .eq("externalKey", document.external_key.clone());
        self.store
            .bulk_write(
                &self.materialised_collection,
                vec![WriteModel::ReplaceUpsert {
                    filter,
                    document: document.to_document(),
                }],
            )
            .await?;
        tracing::info!(
            resource_type = document.resource_type,
            external_key = document.external_key,
            "materialised aggregation written"
        );
        Ok(Some(document))
    }
}
