// Copyright 2025 Cowboy AI, LLC.

//! Build orchestration
//!
//! The processor runs the write path for one entity: validate the
//! request, probe the source, snapshot the previous materialised
//! document, execute the assembled aggregation, snapshot the result and
//! hand both snapshots to the reconciler.
//!
//! Builds progress `Invalid → Missing → Built → Reconciled`; the first
//! two surface early exits, the last two are terminal.

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::entities::EntityType;
use crate::errors::{AggregationError, AggregationResult};
use crate::keys::{
    encode_entity_key, encode_key_moment_key, encode_ranking_key, encode_staff_key,
    RankingContext, StaffRole,
};
use crate::documents::MaterialisedAggregation;
use crate::pipeline::PipelineAssembler;
use crate::reconciler::{ReconcileSummary, Reconciler};
use crate::store::{Filter, Store};

/// A validated-on-entry build request, one variant per key layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRequest {
    /// Build a simple-key entity addressed by `(scope, id)`
    Entity {
        /// Entity type; must use the simple key layout
        entity_type: EntityType,
        /// External id scope
        scope: String,
        /// External id
        id: String,
    },
    /// Build a staff engagement
    Staff {
        /// Sports-person external id scope
        sp_scope: String,
        /// Sports-person external id
        sp_id: String,
        /// Engaging organisation role
        role: StaffRole,
        /// Organisation external id scope
        org_scope: String,
        /// Organisation external id
        org_id: String,
    },
    /// Build a key moment
    KeyMoment {
        /// Event external id scope
        event_scope: String,
        /// Event external id
        event_id: String,
        /// Moment type
        kind: String,
        /// Moment sub-type
        sub_kind: String,
        /// Moment date-time
        date_time: String,
    },
    /// Build a ranking
    Ranking {
        /// Stage or event providing the ranked context
        lead_type: EntityType,
        /// Lead external id scope
        lead_scope: String,
        /// Lead external id
        lead_id: String,
        /// Team or sports-person being ranked
        participant_type: EntityType,
        /// Participant external id scope
        participant_scope: String,
        /// Participant external id
        participant_id: String,
        /// Ranking date-time
        date_time: String,
        /// Ranking position
        position: i64,
    },
}

impl BuildRequest {
    /// The entity type this request builds.
    pub fn entity_type(&self) -> EntityType {
        match self {
            BuildRequest::Entity { entity_type, .. } => *entity_type,
            BuildRequest::Staff { .. } => EntityType::Staff,
            BuildRequest::KeyMoment { .. } => EntityType::KeyMoment,
            BuildRequest::Ranking { .. } => EntityType::Ranking,
        }
    }

    /// Validate the request's fields.
    pub fn validate(&self) -> AggregationResult<()> {
        let invalid = |reason: &str| {
            Err(AggregationError::InvalidInput {
                reason: reason.to_string(),
            })
        };
        match self {
            BuildRequest::Entity {
                entity_type,
                scope,
                id,
            } => {
                if !entity_type.has_simple_key() {
                    return invalid("entity type requires its dedicated build route");
                }
                if scope.is_empty() || id.is_empty() {
                    return invalid("externalIdScope and externalId must be non-empty");
                }
                Ok(())
            }
            BuildRequest::Staff {
                sp_scope,
                sp_id,
                org_scope,
                org_id,
                ..
            } => {
                if sp_scope.is_empty() || sp_id.is_empty() {
                    return invalid("sports-person scope and id must be non-empty");
                }
                if org_scope.is_empty() || org_id.is_empty() {
                    return invalid("organisation scope and id must be non-empty");
                }
                Ok(())
            }
            BuildRequest::KeyMoment {
                event_scope,
                event_id,
                date_time,
                ..
            } => {
                if event_scope.is_empty() || event_id.is_empty() {
                    return invalid("event scope and id must be non-empty");
                }
                if date_time.is_empty() {
                    return invalid("dateTime must be non-empty");
                }
                Ok(())
            }
            BuildRequest::Ranking {
                lead_type,
                lead_scope,
                lead_id,
                participant_type,
                participant_scope,
                participant_id,
                date_time,
                ..
            } => {
                if RankingContext::for_types(*lead_type, *participant_type).is_none() {
                    return invalid("ranking context must pair stage/event with team/sportsPerson");
                }
                if lead_scope.is_empty()
                    || lead_id.is_empty()
                    || participant_scope.is_empty()
                    || participant_id.is_empty()
                {
                    return invalid("ranking context references must be non-empty");
                }
                if date_time.is_empty() {
                    return invalid("dateTime must be non-empty");
                }
                Ok(())
            }
        }
    }

    /// The composite external key this request addresses.
    pub fn external_key(&self) -> String {
        match self {
            BuildRequest::Entity { scope, id, .. } => encode_entity_key(id, scope),
            BuildRequest::Staff {
                sp_scope,
                sp_id,
                role,
                org_scope,
                org_id,
            } => encode_staff_key(sp_id, sp_scope, *role, org_id, org_scope),
            BuildRequest::KeyMoment {
                event_scope,
                event_id,
                kind,
                sub_kind,
                date_time,
            } => encode_key_moment_key(date_time, event_scope, event_id, kind, sub_kind),
            BuildRequest::Ranking {
                lead_type,
                lead_scope,
                lead_id,
                participant_type,
                participant_scope,
                participant_id,
                date_time,
                position,
            } => {
                // Validated pairings always map to a context.
                let context = RankingContext::for_types(*lead_type, *participant_type)
                    .unwrap_or(RankingContext::StageTeam);
                encode_ranking_key(
                    context,
                    lead_id,
                    lead_scope,
                    participant_id,
                    participant_scope,
                    date_time,
                    *position,
                )
            }
        }
    }

    /// The source-collection filter identifying the addressed document.
    pub fn source_filter(&self) -> Filter {
        match self {
            BuildRequest::Entity { scope, id, .. } => Filter::new()
                .eq("externalIdScope", scope.clone())
                .eq("externalId", id.clone()),
            BuildRequest::Staff {
                sp_scope,
                sp_id,
                role,
                org_scope,
                org_id,
            } => {
                let (org_scope_field, org_id_field) = role.organisation_fields();
                Filter::new()
                    .eq("externalSportsPersonIdScope", sp_scope.clone())
                    .eq("externalSportsPersonId", sp_id.clone())
                    .eq(org_scope_field, org_scope.clone())
                    .eq(org_id_field, org_id.clone())
            }
            BuildRequest::KeyMoment {
                event_scope,
                event_id,
                kind,
                sub_kind,
                date_time,
            } => {
                let mut filter = Filter::new()
                    .eq("externalEventIdScope", event_scope.clone())
                    .eq("externalEventId", event_id.clone())
                    .eq("dateTime", date_time.clone());
                if !kind.is_empty() {
                    filter = filter.eq("type", kind.clone());
                }
                if !sub_kind.is_empty() {
                    filter = filter.eq("subType", sub_kind.clone());
                }
                filter
            }
            BuildRequest::Ranking {
                lead_type,
                lead_scope,
                lead_id,
                participant_type,
                participant_scope,
                participant_id,
                date_time,
                position,
            } => {
                let (lead_scope_field, lead_id_field) = match lead_type {
                    EntityType::Stage => ("externalStageIdScope", "externalStageId"),
                    _ => ("externalEventIdScope", "externalEventId"),
                };
                let (part_scope_field, part_id_field) = match participant_type {
                    EntityType::Team => ("externalTeamIdScope", "externalTeamId"),
                    _ => ("externalSportsPersonIdScope", "externalSportsPersonId"),
                };
                Filter::new()
                    .eq(lead_scope_field, lead_scope.clone())
                    .eq(lead_id_field, lead_id.clone())
                    .eq(part_scope_field, participant_scope.clone())
                    .eq(part_id_field, participant_id.clone())
                    .eq("dateTime", date_time.clone())
                    .is_in(
                        "rankingPosition",
                        vec![json!(position), json!(position.to_string())],
                    )
            }
        }
    }

    /// Human-readable selector for diagnostics.
    pub fn selector(&self) -> String {
        match self {
            BuildRequest::Entity { scope, id, .. } => format!("{scope}/{id}"),
            _ => self.external_key(),
        }
    }
}

/// The states a build passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildState {
    /// Request failed validation; nothing touched
    Invalid,
    /// Source absent; nothing touched
    Missing,
    /// Materialised document written; no peers affected
    Built,
    /// Materialised document written and peers reconciled
    Reconciled,
}

impl BuildState {
    /// State name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            BuildState::Invalid => "Invalid",
            BuildState::Missing => "Missing",
            BuildState::Built => "Built",
            BuildState::Reconciled => "Reconciled",
        }
    }

    /// Whether the build ends in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Built | BuildState::Reconciled)
    }

    /// Whether the build may move from this state to the target.
    pub fn can_transition_to(&self, target: &BuildState) -> bool {
        matches!(
            (self, target),
            (BuildState::Missing, BuildState::Built) | (BuildState::Built, BuildState::Reconciled)
        )
    }
}

/// The outcome of a completed build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// Terminal state reached
    pub state: BuildState,
    /// The new materialised snapshot
    pub document: MaterialisedAggregation,
    /// Reconciliation counts
    pub reconcile: ReconcileSummary,
    /// The deadline elapsed after the aggregation was submitted; the
    /// write stands and peers were still reconciled
    pub partial: bool,
}

/// Orchestrates the build write path.
pub struct Processor {
    store: Arc<dyn Store>,
    materialised_collection: String,
    pipeline: PipelineAssembler,
    reconciler: Reconciler,
}

impl Processor {
    /// Create a processor over a store and materialised collection.
    pub fn new(store: Arc<dyn Store>, materialised_collection: impl Into<String>) -> Self {
        let materialised_collection = materialised_collection.into();
        Self {
            pipeline: PipelineAssembler::new(store.clone(), materialised_collection.clone()),
            reconciler: Reconciler::new(store.clone(), materialised_collection.clone()),
            store,
            materialised_collection,
        }
    }

    /// Run one build to completion.
    ///
    /// A deadline reached before the aggregation is submitted aborts with
    /// no side effects; reached after, the build completes and the report
    /// is marked partial.
    pub async fn build(
        &self,
        request: BuildRequest,
        deadline: Option<Instant>,
    ) -> AggregationResult<BuildReport> {
        request.validate()?;
        let entity_type = request.entity_type();
        let source_filter = request.source_filter();
        let selector = request.selector();

        let present = self
            .store
            .count_matching(entity_type.collection(), &source_filter)
            .await?;
        if present == 0 {
            tracing::debug!(
                entity_type = entity_type.api_name(),
                selector,
                "source absent; no build"
            );
            return Err(AggregationError::NotFound {
                entity_type,
                selector,
            });
        }

        let old = self.read_snapshot(entity_type, &request).await?;

        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AggregationError::Timeout);
        }

        let built = self.pipeline.run(entity_type, &source_filter).await?;
        let Some(built) = built else {
            return Err(AggregationError::PostUpsertMissing {
                resource_type: entity_type.resource_type().to_string(),
                external_key: request.external_key(),
            });
        };

        let new = self
            .store
            .find_one(
                &self.materialised_collection,
                &Filter::new()
                    .eq("resourceType", built.resource_type.clone())
                    .eq("externalKey", built.external_key.clone()),
            )
            .await?
            .map(|doc| MaterialisedAggregation::from_document(&doc))
            .transpose()?
            .ok_or_else(|| AggregationError::PostUpsertMissing {
                resource_type: built.resource_type.clone(),
                external_key: built.external_key.clone(),
            })?;

        let partial = deadline.is_some_and(|d| Instant::now() >= d);
        if partial {
            tracing::warn!(
                external_key = new.external_key,
                "deadline elapsed after submission; completing reconciliation"
            );
        }

        let reconcile = self.reconciler.reconcile(old.as_ref(), &new).await?;
        let state = if reconcile.is_noop() {
            BuildState::Built
        } else {
            BuildState::Reconciled
        };
        tracing::info!(
            entity_type = entity_type.api_name(),
            external_key = new.external_key,
            state = state.name(),
            "build finished"
        );
        Ok(BuildReport {
            state,
            document: new,
            reconcile,
            partial,
        })
    }

    /// Read the pre-existing materialised document for the addressed
    /// source, if any.
    ///
    /// Looked up by `(resourceType, gamedayId)` first so a document whose
    /// external key moved is still found; the request key is the
    /// fallback for sources without a local identity.
    async fn read_snapshot(
        &self,
        entity_type: EntityType,
        request: &BuildRequest,
    ) -> AggregationResult<Option<MaterialisedAggregation>> {
        let source = self
            .store
            .find_one(entity_type.collection(), &request.source_filter())
            .await?;
        let by_gameday = source.as_ref().and_then(crate::documents::gameday_id);

        let filter = match by_gameday {
            Some(id) => Filter::new()
                .eq("resourceType", entity_type.resource_type())
                .eq("gamedayId", id),
            None => Filter::new()
                .eq("resourceType", entity_type.resource_type())
                .eq("externalKey", request.external_key()),
        };
        self.store
            .find_one(&self.materialised_collection, &filter)
            .await?
            .map(|doc| MaterialisedAggregation::from_document(&doc))
            .transpose()
    }
}
