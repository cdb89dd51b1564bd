// Copyright 2025 Cowboy AI, LLC.

//! Relationship resolvers (facets)
//!
//! A facet resolves one relationship of a source entity into the
//! intermediate `{ids, keys}` shape stored on its materialised document.
//! Facets are evaluated in-process against the store contract via batched
//! lookups; intermediate key sets are deduplicated before every join so
//! traversal fan-out stays bounded.
//!
//! The per-entity facet tables live in [`tables`]; the concrete resolver
//! families in [`resolvers`].

mod resolvers;
mod tables;

pub use resolvers::{
    ChainedDirect, ChainedEmbeddedDirect, ChainedParticipants, DirectRef, EmbeddedRefs,
    EmbeddedRefsInverse, InverseRef, Participants, RankingLead, RankingParticipant,
    StaffOrganisation,
};
pub use tables::{facets_for, projection_targets};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::documents::{
    default_name, gameday_id, identity, scope_id_pair, str_field, ExternalRef, Projection,
};
use crate::entities::EntityType;
use crate::errors::AggregationResult;
use crate::keys::{
    encode_key_moment_key, encode_ranking_key, encode_staff_key, RankingContext, StaffRole,
};
use crate::store::{Filter, Store};

/// One resolved relationship: the neighbour type and its projection.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetResolution {
    /// Neighbour type the projection belongs to
    pub target: EntityType,
    /// Resolved ids and keys
    pub projection: Projection,
}

impl FacetResolution {
    /// An empty resolution for a neighbour type.
    pub fn empty(target: EntityType) -> Self {
        Self {
            target,
            projection: Projection::new(),
        }
    }
}

/// A relationship resolver for one source entity type.
#[async_trait]
pub trait Facet: Send + Sync {
    /// Resolver name, for diagnostics.
    fn name(&self) -> &'static str;

    /// The neighbour types this facet can resolve into.
    ///
    /// Every declared target appears on the materialised document, empty
    /// when the relationship resolves to nothing.
    fn targets(&self) -> Vec<EntityType>;

    /// Resolve the relationship against the source document.
    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>>;
}

/// Meta attributes projected onto every materialised document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    /// Stable local identity, when the source carries one
    pub gameday_id: Option<String>,
    /// Composite external key
    pub external_key: String,
    /// External id (simple-key types only)
    pub external_id: Option<String>,
    /// External id scope (simple-key types only)
    pub external_id_scope: Option<String>,
    /// Display name selected by the source's default language
    pub name: Option<String>,
}

/// Derive the meta attributes of a source document.
///
/// `None` means the document lacks the identity fields its type requires
/// and cannot be materialised.
pub fn meta_for(entity_type: EntityType, source: &Value) -> Option<Meta> {
    let external_key = entity_key_of(entity_type, source)?;
    let external = if entity_type.has_simple_key() {
        identity(source)
    } else {
        None
    };
    Some(Meta {
        gameday_id: gameday_id(source),
        external_key,
        external_id: external.as_ref().map(|r| r.id.clone()),
        external_id_scope: external.map(|r| r.scope),
        name: default_name(source),
    })
}

/// Compose the composite external key of a source document.
///
/// Returns `None` when the fields the type's key layout requires are
/// absent.
pub fn entity_key_of(entity_type: EntityType, source: &Value) -> Option<String> {
    match entity_type {
        EntityType::Staff => {
            let sp = scope_id_pair(
                source,
                "externalSportsPersonIdScope",
                "externalSportsPersonId",
            )?;
            let (role, org) = staff_organisation(source)?;
            Some(encode_staff_key(
                &sp.id, &sp.scope, role, &org.id, &org.scope,
            ))
        }
        EntityType::KeyMoment => {
            let event = scope_id_pair(source, "externalEventIdScope", "externalEventId")?;
            let date_time = str_field(source, "dateTime").unwrap_or_default();
            let kind = str_field(source, "type").unwrap_or_default();
            let sub_kind = str_field(source, "subType").unwrap_or_default();
            Some(encode_key_moment_key(
                date_time, &event.scope, &event.id, kind, sub_kind,
            ))
        }
        EntityType::Ranking => {
            let (context, lead, participant) = ranking_context(source)?;
            let date_time = str_field(source, "dateTime").unwrap_or_default();
            let position = int_field(source, "rankingPosition")?;
            Some(encode_ranking_key(
                context,
                &lead.id,
                &lead.scope,
                &participant.id,
                &participant.scope,
                date_time,
                position,
            ))
        }
        _ => identity(source).map(|r| r.key()),
    }
}

/// The staff engagement's organisation reference and role.
///
/// A staff document names exactly one organisation; when several pairs
/// are present the team/club/nation precedence picks one.
pub fn staff_organisation(source: &Value) -> Option<(StaffRole, ExternalRef)> {
    for role in StaffRole::ALL_ROLES {
        let (scope_field, id_field) = role.organisation_fields();
        if let Some(org) = scope_id_pair(source, scope_field, id_field) {
            return Some((role, org));
        }
    }
    None
}

/// The ranking's context pairing and its lead/participant references.
///
/// Stage context wins over event context; a team participant wins over a
/// sports-person. Rankings naming neither context or neither participant
/// are discarded.
pub fn ranking_context(source: &Value) -> Option<(RankingContext, ExternalRef, ExternalRef)> {
    let lead_stage = scope_id_pair(source, "externalStageIdScope", "externalStageId");
    let lead_event = scope_id_pair(source, "externalEventIdScope", "externalEventId");
    let (lead_type, lead) = match (lead_stage, lead_event) {
        (Some(stage), _) => (EntityType::Stage, stage),
        (None, Some(event)) => (EntityType::Event, event),
        (None, None) => return None,
    };
    let part_team = scope_id_pair(source, "externalTeamIdScope", "externalTeamId");
    let part_sp = scope_id_pair(
        source,
        "externalSportsPersonIdScope",
        "externalSportsPersonId",
    );
    let (participant_type, participant) = match (part_team, part_sp) {
        (Some(team), _) => (EntityType::Team, team),
        (None, Some(sp)) => (EntityType::SportsPerson, sp),
        (None, None) => return None,
    };
    let context = RankingContext::for_types(lead_type, participant_type)?;
    Some((context, lead, participant))
}

/// Classify an embedded participant entry.
///
/// An entry carrying both a team and a sports-person identity classifies
/// as a sports-person; one carrying only a team identity is a team;
/// entries missing both are dropped.
pub fn classify_participant(entry: &Value) -> Option<(EntityType, ExternalRef)> {
    let sp = scope_id_pair(
        entry,
        "externalSportsPersonIdScope",
        "externalSportsPersonId",
    );
    if let Some(sp) = sp {
        return Some((EntityType::SportsPerson, sp));
    }
    scope_id_pair(entry, "externalTeamIdScope", "externalTeamId")
        .map(|team| (EntityType::Team, team))
}

/// Read an integer field given as a number or a decimal string.
fn int_field(doc: &Value, field: &str) -> Option<i64> {
    match doc.get(field)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Resolve a deduplicated reference list against the target collection.
///
/// One batched lookup resolves every reference; references whose target
/// document is absent keep their key with no id.
pub(crate) async fn resolve_refs(
    store: &dyn Store,
    target: EntityType,
    refs: Vec<ExternalRef>,
) -> AggregationResult<Projection> {
    let mut projection = Projection::new();
    if refs.is_empty() {
        return Ok(projection);
    }

    let mut deduped: Vec<ExternalRef> = Vec::new();
    for r in refs {
        if !deduped.contains(&r) {
            deduped.push(r);
        }
    }

    let ids: Vec<Value> = deduped.iter().map(|r| json!(r.id)).collect();
    let scopes: Vec<Value> = deduped.iter().map(|r| json!(r.scope)).collect();
    let filter = Filter::new()
        .is_in("externalId", ids)
        .is_in("externalIdScope", scopes);
    let found = store.find_matching(target.collection(), &filter).await?;

    let mut by_pair: HashMap<(String, String), String> = HashMap::new();
    for doc in &found {
        if let (Some(identity), Some(id)) = (identity(doc), gameday_id(doc)) {
            by_pair.insert((identity.scope, identity.id), id);
        }
    }

    for r in deduped {
        let resolved = by_pair.get(&(r.scope.clone(), r.id.clone())).cloned();
        projection.insert(r.key(), resolved);
    }
    Ok(projection)
}

/// Key and id a list of neighbour source documents of a known type.
pub(crate) fn keyed_projection(target: EntityType, neighbours: &[Value]) -> Projection {
    let mut projection = Projection::new();
    for doc in neighbours {
        match entity_key_of(target, doc) {
            Some(key) => projection.insert(key, gameday_id(doc)),
            None => {
                tracing::warn!(
                    target_type = target.api_name(),
                    "skipping neighbour without derivable key"
                );
            }
        }
    }
    projection
}
