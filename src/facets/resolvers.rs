// Copyright 2025 Cowboy AI, LLC.

//! The concrete resolver families
//!
//! Three families cover every relationship: direct reference, inverse
//! reference and embedded-array expansion, plus the chained traversals
//! composed from them and the role-dispatching staff/ranking resolvers.

use async_trait::async_trait;
use serde_json::Value;

use super::{
    classify_participant, keyed_projection, ranking_context, resolve_refs, staff_organisation,
    Facet, FacetResolution,
};
use crate::documents::{array_field, identity, scope_id_pair, ExternalRef};
use crate::entities::EntityType;
use crate::errors::AggregationResult;
use crate::store::{Filter, Store};

/// Resolve a single neighbour referenced by `(scope, id)` fields on the
/// source document.
pub struct DirectRef {
    /// Neighbour type
    pub target: EntityType,
    /// Source field carrying the neighbour's scope
    pub scope_field: &'static str,
    /// Source field carrying the neighbour's id
    pub id_field: &'static str,
}

#[async_trait]
impl Facet for DirectRef {
    fn name(&self) -> &'static str {
        "direct-ref"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![self.target]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let refs = scope_id_pair(source, self.scope_field, self.id_field)
            .map(|r| vec![r])
            .unwrap_or_default();
        let projection = resolve_refs(store, self.target, refs).await?;
        Ok(vec![FacetResolution {
            target: self.target,
            projection,
        }])
    }
}

/// Resolve the neighbours referencing the source through foreign `(scope,
/// id)` fields on their own documents.
pub struct InverseRef {
    /// Neighbour type
    pub target: EntityType,
    /// Neighbour field carrying the source's scope
    pub foreign_scope_field: &'static str,
    /// Neighbour field carrying the source's id
    pub foreign_id_field: &'static str,
}

#[async_trait]
impl Facet for InverseRef {
    fn name(&self) -> &'static str {
        "inverse-ref"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![self.target]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let Some(me) = identity(source) else {
            return Ok(vec![FacetResolution::empty(self.target)]);
        };
        let filter = Filter::new()
            .eq(self.foreign_scope_field, me.scope)
            .eq(self.foreign_id_field, me.id);
        let neighbours = store.find_matching(self.target.collection(), &filter).await?;
        Ok(vec![FacetResolution {
            target: self.target,
            projection: keyed_projection(self.target, &neighbours),
        }])
    }
}

/// Expand an embedded reference array and resolve its entries.
pub struct EmbeddedRefs {
    /// Neighbour type
    pub target: EntityType,
    /// Embedded array field on the source
    pub array_field: &'static str,
    /// Entry field carrying the neighbour's scope
    pub entry_scope_field: &'static str,
    /// Entry field carrying the neighbour's id
    pub entry_id_field: &'static str,
}

#[async_trait]
impl Facet for EmbeddedRefs {
    fn name(&self) -> &'static str {
        "embedded-refs"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![self.target]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let refs: Vec<ExternalRef> = array_field(source, self.array_field)
            .iter()
            .filter_map(|entry| {
                scope_id_pair(entry, self.entry_scope_field, self.entry_id_field)
            })
            .collect();
        let projection = resolve_refs(store, self.target, refs).await?;
        Ok(vec![FacetResolution {
            target: self.target,
            projection,
        }])
    }
}

/// Resolve the neighbours whose embedded reference array contains the
/// source.
pub struct EmbeddedRefsInverse {
    /// Neighbour type
    pub target: EntityType,
    /// Embedded array field on the neighbour
    pub array_field: &'static str,
    /// Entry field carrying the source's scope
    pub entry_scope_field: &'static str,
    /// Entry field carrying the source's id
    pub entry_id_field: &'static str,
}

#[async_trait]
impl Facet for EmbeddedRefsInverse {
    fn name(&self) -> &'static str {
        "embedded-refs-inverse"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![self.target]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let Some(me) = identity(source) else {
            return Ok(vec![FacetResolution::empty(self.target)]);
        };
        let entry = Filter::new()
            .eq(self.entry_scope_field, me.scope)
            .eq(self.entry_id_field, me.id);
        let filter = Filter::new().elem_match(self.array_field, entry);
        let neighbours = store.find_matching(self.target.collection(), &filter).await?;
        Ok(vec![FacetResolution {
            target: self.target,
            projection: keyed_projection(self.target, &neighbours),
        }])
    }
}

/// Resolve one participant class from the source's own `participants`
/// array.
pub struct Participants {
    /// Either teams or sports-persons
    pub classify: EntityType,
}

#[async_trait]
impl Facet for Participants {
    fn name(&self) -> &'static str {
        "participants"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![self.classify]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let refs: Vec<ExternalRef> = array_field(source, "participants")
            .iter()
            .filter_map(classify_participant)
            .filter(|(class, _)| *class == self.classify)
            .map(|(_, r)| r)
            .collect();
        let projection = resolve_refs(store, self.classify, refs).await?;
        Ok(vec![FacetResolution {
            target: self.classify,
            projection,
        }])
    }
}

/// Walk an inverse hop, then classify the participants of every reached
/// document.
///
/// Covers a competition's or stage's teams and sports-persons via its
/// events.
pub struct ChainedParticipants {
    /// Intermediate type reached by the inverse hop
    pub via: EntityType,
    /// Intermediate field carrying the source's scope
    pub via_scope_field: &'static str,
    /// Intermediate field carrying the source's id
    pub via_id_field: &'static str,
    /// Either teams or sports-persons
    pub classify: EntityType,
}

#[async_trait]
impl Facet for ChainedParticipants {
    fn name(&self) -> &'static str {
        "chained-participants"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![self.classify]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let Some(me) = identity(source) else {
            return Ok(vec![FacetResolution::empty(self.classify)]);
        };
        let filter = Filter::new()
            .eq(self.via_scope_field, me.scope)
            .eq(self.via_id_field, me.id);
        let intermediates = store.find_matching(self.via.collection(), &filter).await?;

        let mut refs: Vec<ExternalRef> = Vec::new();
        for doc in &intermediates {
            for entry in array_field(doc, "participants") {
                if let Some((class, r)) = classify_participant(entry) {
                    if class == self.classify && !refs.contains(&r) {
                        refs.push(r);
                    }
                }
            }
        }
        let projection = resolve_refs(store, self.classify, refs).await?;
        Ok(vec![FacetResolution {
            target: self.classify,
            projection,
        }])
    }
}

/// Walk an inverse hop, then follow a direct reference off every reached
/// document.
///
/// Covers a competition's venues via its stages.
pub struct ChainedDirect {
    /// Intermediate type reached by the inverse hop
    pub via: EntityType,
    /// Intermediate field carrying the source's scope
    pub via_scope_field: &'static str,
    /// Intermediate field carrying the source's id
    pub via_id_field: &'static str,
    /// Final neighbour type
    pub target: EntityType,
    /// Intermediate field carrying the neighbour's scope
    pub scope_field: &'static str,
    /// Intermediate field carrying the neighbour's id
    pub id_field: &'static str,
}

#[async_trait]
impl Facet for ChainedDirect {
    fn name(&self) -> &'static str {
        "chained-direct"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![self.target]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let Some(me) = identity(source) else {
            return Ok(vec![FacetResolution::empty(self.target)]);
        };
        let filter = Filter::new()
            .eq(self.via_scope_field, me.scope)
            .eq(self.via_id_field, me.id);
        let intermediates = store.find_matching(self.via.collection(), &filter).await?;

        let mut refs: Vec<ExternalRef> = Vec::new();
        for doc in &intermediates {
            if let Some(r) = scope_id_pair(doc, self.scope_field, self.id_field) {
                if !refs.contains(&r) {
                    refs.push(r);
                }
            }
        }
        let projection = resolve_refs(store, self.target, refs).await?;
        Ok(vec![FacetResolution {
            target: self.target,
            projection,
        }])
    }
}

/// Walk an inverse embedded-array hop, then follow a direct reference
/// off every reached document.
///
/// Covers a team's competitions via the events its participants row in.
pub struct ChainedEmbeddedDirect {
    /// Intermediate type whose array references the source
    pub via: EntityType,
    /// Embedded array field on the intermediate
    pub array_field: &'static str,
    /// Entry field carrying the source's scope
    pub entry_scope_field: &'static str,
    /// Entry field carrying the source's id
    pub entry_id_field: &'static str,
    /// Final neighbour type
    pub target: EntityType,
    /// Intermediate field carrying the neighbour's scope
    pub scope_field: &'static str,
    /// Intermediate field carrying the neighbour's id
    pub id_field: &'static str,
}

#[async_trait]
impl Facet for ChainedEmbeddedDirect {
    fn name(&self) -> &'static str {
        "chained-embedded-direct"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![self.target]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let Some(me) = identity(source) else {
            return Ok(vec![FacetResolution::empty(self.target)]);
        };
        let entry = Filter::new()
            .eq(self.entry_scope_field, me.scope)
            .eq(self.entry_id_field, me.id);
        let filter = Filter::new().elem_match(self.array_field, entry);
        let intermediates = store.find_matching(self.via.collection(), &filter).await?;

        let mut refs: Vec<ExternalRef> = Vec::new();
        for doc in &intermediates {
            if let Some(r) = scope_id_pair(doc, self.scope_field, self.id_field) {
                if !refs.contains(&r) {
                    refs.push(r);
                }
            }
        }
        let projection = resolve_refs(store, self.target, refs).await?;
        Ok(vec![FacetResolution {
            target: self.target,
            projection,
        }])
    }
}

/// Resolve a staff engagement's organisation under whichever role the
/// document names.
///
/// The two roles not taken resolve to empty projections so the
/// materialised document always carries all three field pairs.
pub struct StaffOrganisation;

#[async_trait]
impl Facet for StaffOrganisation {
    fn name(&self) -> &'static str {
        "staff-organisation"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![EntityType::Team, EntityType::Club, EntityType::Nation]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let mut resolutions: Vec<FacetResolution> = Vec::new();
        let engaged = staff_organisation(source);
        for target in self.targets() {
            match &engaged {
                Some((role, org)) if role.organisation_type() == target => {
                    let projection =
                        resolve_refs(store, target, vec![org.clone()]).await?;
                    resolutions.push(FacetResolution { target, projection });
                }
                _ => resolutions.push(FacetResolution::empty(target)),
            }
        }
        Ok(resolutions)
    }
}

/// Resolve a ranking's lead context: its stage or its event.
pub struct RankingLead;

#[async_trait]
impl Facet for RankingLead {
    fn name(&self) -> &'static str {
        "ranking-lead"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![EntityType::Stage, EntityType::Event]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let context = ranking_context(source);
        let mut resolutions = Vec::new();
        for target in self.targets() {
            match &context {
                Some((context, lead, _)) if context.lead_type() == target => {
                    let projection = resolve_refs(store, target, vec![lead.clone()]).await?;
                    resolutions.push(FacetResolution { target, projection });
                }
                _ => resolutions.push(FacetResolution::empty(target)),
            }
        }
        Ok(resolutions)
    }
}

/// Resolve a ranking's participant: the ranked team or sports-person.
pub struct RankingParticipant;

#[async_trait]
impl Facet for RankingParticipant {
    fn name(&self) -> &'static str {
        "ranking-participant"
    }

    fn targets(&self) -> Vec<EntityType> {
        vec![EntityType::Team, EntityType::SportsPerson]
    }

    async fn resolve(
        &self,
        source: &Value,
        store: &dyn Store,
    ) -> AggregationResult<Vec<FacetResolution>> {
        let context = ranking_context(source);
        let mut resolutions = Vec::new();
        for target in self.targets() {
            match &context {
                Some((context, _, participant)) if context.participant_type() == target => {
                    let projection =
                        resolve_refs(store, target, vec![participant.clone()]).await?;
                    resolutions.push(FacetResolution { target, projection });
                }
                _ => resolutions.push(FacetResolution::empty(target)),
            }
        }
        Ok(resolutions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(
            "competitions",
            vec![json!({
                "gamedayId": "c1", "externalId": "289175", "externalIdScope": "fifa"
            })],
        );
        store.seed(
            "stages",
            vec![
                json!({
                    "gamedayId": "s1", "externalId": "S1", "externalIdScope": "fifa",
                    "externalCompetitionIdScope": "fifa", "externalCompetitionId": "289175",
                    "externalVenueIdScope": "fifa", "externalVenueId": "V1"
                }),
                json!({
                    "gamedayId": "s2", "externalId": "S2", "externalIdScope": "fifa",
                    "externalCompetitionIdScope": "fifa", "externalCompetitionId": "289175",
                    "externalVenueIdScope": "fifa", "externalVenueId": "V2"
                }),
            ],
        );
        store.seed(
            "events",
            vec![
                json!({
                    "gamedayId": "e1", "externalId": "E1", "externalIdScope": "fifa",
                    "externalCompetitionIdScope": "fifa", "externalCompetitionId": "289175",
                    "externalStageIdScope": "fifa", "externalStageId": "S1",
                    "participants": [
                        {"externalTeamIdScope": "fifa", "externalTeamId": "t1"},
                        {"externalTeamIdScope": "fifa", "externalTeamId": "t2"},
                        {
                            "externalTeamIdScope": "fifa", "externalTeamId": "t1",
                            "externalSportsPersonIdScope": "fifa", "externalSportsPersonId": "p1"
                        }
                    ]
                }),
                json!({
                    "gamedayId": "e2", "externalId": "E2", "externalIdScope": "fifa",
                    "externalCompetitionIdScope": "fifa", "externalCompetitionId": "289175",
                    "externalStageIdScope": "fifa", "externalStageId": "S2",
                    "participants": [
                        {"externalTeamIdScope": "fifa", "externalTeamId": "t2"}
                    ]
                }),
            ],
        );
        store.seed(
            "teams",
            vec![
                json!({"gamedayId": "g1", "externalId": "t1", "externalIdScope": "fifa"}),
                json!({"gamedayId": "g2", "externalId": "t2", "externalIdScope": "fifa"}),
            ],
        );
        store.seed(
            "venues",
            vec![
                json!({"gamedayId": "v1", "externalId": "V1", "externalIdScope": "fifa"}),
                json!({"gamedayId": "v2", "externalId": "V2", "externalIdScope": "fifa"}),
            ],
        );
        store.seed(
            "sportsPersons",
            vec![json!({"gamedayId": "sp1", "externalId": "p1", "externalIdScope": "fifa"})],
        );
        store
    }

    fn competition_source() -> Value {
        json!({
            "gamedayId": "c1", "externalId": "289175", "externalIdScope": "fifa"
        })
    }

    #[test]
    fn test_direct_ref_resolves_one_neighbour() {
        let store = seeded_store();
        let stage = json!({
            "externalIdScope": "fifa", "externalId": "S1",
            "externalVenueIdScope": "fifa", "externalVenueId": "V1"
        });
        let facet = DirectRef {
            target: EntityType::Venue,
            scope_field: "externalVenueIdScope",
            id_field: "externalVenueId",
        };
        tokio_test::block_on(async {
            let resolutions = facet.resolve(&stage, &store).await.unwrap();
            assert_eq!(resolutions.len(), 1);
            assert_eq!(resolutions[0].projection.ids(), &["v1"]);
            assert_eq!(resolutions[0].projection.keys().get("V1 @ fifa"), Some(&Some("v1".to_string())));
        });
    }

    #[test]
    fn test_inverse_ref_filters_on_foreign_fields() {
        let store = seeded_store();
        let facet = InverseRef {
            target: EntityType::Stage,
            foreign_scope_field: "externalCompetitionIdScope",
            foreign_id_field: "externalCompetitionId",
        };
        tokio_test::block_on(async {
            let resolutions = facet.resolve(&competition_source(), &store).await.unwrap();
            assert_eq!(resolutions[0].projection.ids(), &["s1", "s2"]);
            assert_eq!(resolutions[0].projection.keys().len(), 2);
        });
    }

    #[test]
    fn test_participants_classification_is_exclusive() {
        let store = seeded_store();
        let event = store.dump("events")[0].clone();

        tokio_test::block_on(async {
            let teams = Participants {
                classify: EntityType::Team,
            }
            .resolve(&event, &store)
            .await
            .unwrap();
            // The entry carrying both identities classifies as a
            // sports-person, not a team.
            assert_eq!(teams[0].projection.ids(), &["g1", "g2"]);

            let sports_persons = Participants {
                classify: EntityType::SportsPerson,
            }
            .resolve(&event, &store)
            .await
            .unwrap();
            assert_eq!(sports_persons[0].projection.ids(), &["sp1"]);
        });
    }

    #[test]
    fn test_chained_participants_dedupes_across_events() {
        let store = seeded_store();
        let facet = ChainedParticipants {
            via: EntityType::Event,
            via_scope_field: "externalCompetitionIdScope",
            via_id_field: "externalCompetitionId",
            classify: EntityType::Team,
        };
        tokio_test::block_on(async {
            let resolutions = facet.resolve(&competition_source(), &store).await.unwrap();
            // t2 participates in both events and appears once.
            assert_eq!(resolutions[0].projection.ids(), &["g1", "g2"]);
        });
    }

    #[test]
    fn test_chained_direct_walks_stage_venues() {
        let store = seeded_store();
        let facet = ChainedDirect {
            via: EntityType::Stage,
            via_scope_field: "externalCompetitionIdScope",
            via_id_field: "externalCompetitionId",
            target: EntityType::Venue,
            scope_field: "externalVenueIdScope",
            id_field: "externalVenueId",
        };
        tokio_test::block_on(async {
            let resolutions = facet.resolve(&competition_source(), &store).await.unwrap();
            assert_eq!(resolutions[0].projection.ids(), &["v1", "v2"]);
        });
    }

    #[test]
    fn test_embedded_refs_inverse_matches_memberships() {
        let store = seeded_store();
        store.seed(
            "teams",
            vec![json!({
                "gamedayId": "g9", "externalId": "t9", "externalIdScope": "fifa",
                "sgoMemberships": [
                    {"externalSgoIdScope": "world", "externalSgoId": "SGO1"}
                ]
            })],
        );
        let sgo = json!({"externalIdScope": "world", "externalId": "SGO1"});
        let facet = EmbeddedRefsInverse {
            target: EntityType::Team,
            array_field: "sgoMemberships",
            entry_scope_field: "externalSgoIdScope",
            entry_id_field: "externalSgoId",
        };
        tokio_test::block_on(async {
            let resolutions = facet.resolve(&sgo, &store).await.unwrap();
            assert_eq!(resolutions[0].projection.ids(), &["g9"]);
        });
    }

    #[test]
    fn test_staff_organisation_targets_one_role() {
        let store = seeded_store();
        let staff = json!({
            "externalSportsPersonIdScope": "fifa", "externalSportsPersonId": "p1",
            "externalTeamIdScope": "fifa", "externalTeamId": "t1"
        });
        tokio_test::block_on(async {
            let resolutions = StaffOrganisation.resolve(&staff, &store).await.unwrap();
            assert_eq!(resolutions.len(), 3);
            let team = resolutions
                .iter()
                .find(|r| r.target == EntityType::Team)
                .unwrap();
            assert_eq!(team.projection.ids(), &["g1"]);
            let club = resolutions
                .iter()
                .find(|r| r.target == EntityType::Club)
                .unwrap();
            assert!(club.projection.is_empty());
        });
    }

    #[test]
    fn test_ranking_lead_and_participant() {
        let store = seeded_store();
        let ranking = json!({
            "externalStageIdScope": "fifa", "externalStageId": "S1",
            "externalTeamIdScope": "fifa", "externalTeamId": "t1",
            "dateTime": "2024-06-01", "rankingPosition": 1
        });
        tokio_test::block_on(async {
            let leads = RankingLead.resolve(&ranking, &store).await.unwrap();
            let stage = leads.iter().find(|r| r.target == EntityType::Stage).unwrap();
            assert_eq!(stage.projection.ids(), &["s1"]);
            let event = leads.iter().find(|r| r.target == EntityType::Event).unwrap();
            assert!(event.projection.is_empty());

            let participants = RankingParticipant.resolve(&ranking, &store).await.unwrap();
            let team = participants
                .iter()
                .find(|r| r.target == EntityType::Team)
                .unwrap();
            assert_eq!(team.projection.ids(), &["g1"]);
        });
    }
}
