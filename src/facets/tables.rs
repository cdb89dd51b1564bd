// Copyright 2025 Cowboy AI, LLC.

//! Per-entity facet membership
//!
//! One parameterised pipeline serves every entity type; this table names
//! the facets each type carries. [`projection_targets`] is the static
//! dual used by the traversal planner as its edge table.

use super::{
    ChainedDirect, ChainedEmbeddedDirect, ChainedParticipants, DirectRef, EmbeddedRefs,
    EmbeddedRefsInverse, Facet, InverseRef, Participants, RankingLead, RankingParticipant,
    StaffOrganisation,
};
use crate::entities::EntityType;

const SGO_ENTRY: (&str, &str) = ("externalSgoIdScope", "externalSgoId");
const SP_ENTRY: (&str, &str) = ("externalSportsPersonIdScope", "externalSportsPersonId");

fn sgo_memberships() -> Box<dyn Facet> {
    Box::new(EmbeddedRefs {
        target: EntityType::Sgo,
        array_field: "sgoMemberships",
        entry_scope_field: SGO_ENTRY.0,
        entry_id_field: SGO_ENTRY.1,
    })
}

fn sgo_membership_inverse(target: EntityType) -> Box<dyn Facet> {
    Box::new(EmbeddedRefsInverse {
        target,
        array_field: "sgoMemberships",
        entry_scope_field: SGO_ENTRY.0,
        entry_id_field: SGO_ENTRY.1,
    })
}

fn direct(target: EntityType, scope_field: &'static str, id_field: &'static str) -> Box<dyn Facet> {
    Box::new(DirectRef {
        target,
        scope_field,
        id_field,
    })
}

fn inverse(
    target: EntityType,
    foreign_scope_field: &'static str,
    foreign_id_field: &'static str,
) -> Box<dyn Facet> {
    Box::new(InverseRef {
        target,
        foreign_scope_field,
        foreign_id_field,
    })
}

/// The facets evaluated when building an entity of the given type.
pub fn facets_for(entity_type: EntityType) -> Vec<Box<dyn Facet>> {
    match entity_type {
        EntityType::Competition => vec![
            sgo_memberships(),
            inverse(EntityType::Stage, "externalCompetitionIdScope", "externalCompetitionId"),
            inverse(EntityType::Event, "externalCompetitionIdScope", "externalCompetitionId"),
            Box::new(ChainedParticipants {
                via: EntityType::Event,
                via_scope_field: "externalCompetitionIdScope",
                via_id_field: "externalCompetitionId",
                classify: EntityType::Team,
            }),
            Box::new(ChainedParticipants {
                via: EntityType::Event,
                via_scope_field: "externalCompetitionIdScope",
                via_id_field: "externalCompetitionId",
                classify: EntityType::SportsPerson,
            }),
            Box::new(ChainedDirect {
                via: EntityType::Stage,
                via_scope_field: "externalCompetitionIdScope",
                via_id_field: "externalCompetitionId",
                target: EntityType::Venue,
                scope_field: "externalVenueIdScope",
                id_field: "externalVenueId",
            }),
        ],
        EntityType::Stage => vec![
            direct(EntityType::Competition, "externalCompetitionIdScope", "externalCompetitionId"),
            inverse(EntityType::Event, "externalStageIdScope", "externalStageId"),
            direct(EntityType::Venue, "externalVenueIdScope", "externalVenueId"),
            Box::new(ChainedParticipants {
                via: EntityType::Event,
                via_scope_field: "externalStageIdScope",
                via_id_field: "externalStageId",
                classify: EntityType::Team,
            }),
            Box::new(ChainedParticipants {
                via: EntityType::Event,
                via_scope_field: "externalStageIdScope",
                via_id_field: "externalStageId",
                classify: EntityType::SportsPerson,
            }),
        ],
        EntityType::Event => vec![
            direct(EntityType::Stage, "externalStageIdScope", "externalStageId"),
            direct(EntityType::Competition, "externalCompetitionIdScope", "externalCompetitionId"),
            sgo_memberships(),
            direct(EntityType::Venue, "externalVenueIdScope", "externalVenueId"),
            Box::new(Participants {
                classify: EntityType::Team,
            }),
            Box::new(Participants {
                classify: EntityType::SportsPerson,
            }),
            inverse(EntityType::KeyMoment, "externalEventIdScope", "externalEventId"),
            inverse(EntityType::Ranking, "externalEventIdScope", "externalEventId"),
        ],
        EntityType::Team => vec![
            // Competitions derive from the events the team participates
            // in; the reconciler diffs this projection on every rebuild.
            Box::new(ChainedEmbeddedDirect {
                via: EntityType::Event,
                array_field: "participants",
                entry_scope_field: "externalTeamIdScope",
                entry_id_field: "externalTeamId",
                target: EntityType::Competition,
                scope_field: "externalCompetitionIdScope",
                id_field: "externalCompetitionId",
            }),
            direct(EntityType::Club, "externalClubIdScope", "externalClubId"),
            direct(EntityType::Nation, "externalNationIdScope", "externalNationId"),
            direct(EntityType::Venue, "externalVenueIdScope", "externalVenueId"),
            Box::new(EmbeddedRefsInverse {
                target: EntityType::Event,
                array_field: "participants",
                entry_scope_field: "externalTeamIdScope",
                entry_id_field: "externalTeamId",
            }),
            Box::new(EmbeddedRefs {
                target: EntityType::SportsPerson,
                array_field: "members",
                entry_scope_field: SP_ENTRY.0,
                entry_id_field: SP_ENTRY.1,
            }),
            inverse(EntityType::Staff, "externalTeamIdScope", "externalTeamId"),
            sgo_memberships(),
            inverse(EntityType::Ranking, "externalTeamIdScope", "externalTeamId"),
        ],
        EntityType::Club => vec![
            inverse(EntityType::Team, "externalClubIdScope", "externalClubId"),
            direct(EntityType::Venue, "externalVenueIdScope", "externalVenueId"),
            sgo_memberships(),
            inverse(EntityType::Staff, "externalClubIdScope", "externalClubId"),
        ],
        EntityType::Venue => vec![
            direct(EntityType::Nation, "externalNationIdScope", "externalNationId"),
            inverse(EntityType::Stage, "externalVenueIdScope", "externalVenueId"),
            inverse(EntityType::Event, "externalVenueIdScope", "externalVenueId"),
            inverse(EntityType::Team, "externalVenueIdScope", "externalVenueId"),
            inverse(EntityType::Club, "externalVenueIdScope", "externalVenueId"),
            sgo_memberships(),
        ],
        EntityType::SportsPerson => vec![
            direct(EntityType::Club, "externalClubIdScope", "externalClubId"),
            Box::new(EmbeddedRefsInverse {
                target: EntityType::Team,
                array_field: "members",
                entry_scope_field: SP_ENTRY.0,
                entry_id_field: SP_ENTRY.1,
            }),
            Box::new(EmbeddedRefsInverse {
                target: EntityType::Event,
                array_field: "participants",
                entry_scope_field: SP_ENTRY.0,
                entry_id_field: SP_ENTRY.1,
            }),
            inverse(EntityType::Staff, SP_ENTRY.0, SP_ENTRY.1),
            inverse(EntityType::Ranking, SP_ENTRY.0, SP_ENTRY.1),
        ],
        EntityType::Staff => vec![
            Box::new(StaffOrganisation),
            direct(EntityType::SportsPerson, SP_ENTRY.0, SP_ENTRY.1),
        ],
        EntityType::KeyMoment => vec![direct(
            EntityType::Event,
            "externalEventIdScope",
            "externalEventId",
        )],
        EntityType::Ranking => vec![Box::new(RankingLead), Box::new(RankingParticipant)],
        EntityType::Sgo => vec![
            sgo_membership_inverse(EntityType::Competition),
            sgo_membership_inverse(EntityType::Team),
            sgo_membership_inverse(EntityType::Club),
            sgo_membership_inverse(EntityType::Venue),
            sgo_membership_inverse(EntityType::Nation),
            // Governing bodies relate both ways: the sgos this one belongs
            // to and the sgos that belong to it.
            sgo_memberships(),
            sgo_membership_inverse(EntityType::Sgo),
        ],
        EntityType::Nation => vec![
            sgo_memberships(),
            inverse(EntityType::Team, "externalNationIdScope", "externalNationId"),
            inverse(EntityType::Venue, "externalNationIdScope", "externalNationId"),
        ],
    }
}

/// The neighbour types an entity of the given type projects.
///
/// This is the edge table of the traversal planner: one edge per
/// `(entity type, projection field)` pair.
pub fn projection_targets(entity_type: EntityType) -> &'static [EntityType] {
    match entity_type {
        EntityType::Competition => &[
            EntityType::Sgo,
            EntityType::Stage,
            EntityType::Event,
            EntityType::Team,
            EntityType::SportsPerson,
            EntityType::Venue,
        ],
        EntityType::Stage => &[
            EntityType::Competition,
            EntityType::Event,
            EntityType::Venue,
            EntityType::Team,
            EntityType::SportsPerson,
        ],
        EntityType::Event => &[
            EntityType::Stage,
            EntityType::Competition,
            EntityType::Sgo,
            EntityType::Venue,
            EntityType::Team,
            EntityType::SportsPerson,
            EntityType::KeyMoment,
            EntityType::Ranking,
        ],
        EntityType::Team => &[
            EntityType::Competition,
            EntityType::Club,
            EntityType::Nation,
            EntityType::Venue,
            EntityType::Event,
            EntityType::SportsPerson,
            EntityType::Staff,
            EntityType::Sgo,
            EntityType::Ranking,
        ],
        EntityType::Club => &[
            EntityType::Team,
            EntityType::Venue,
            EntityType::Sgo,
            EntityType::Staff,
        ],
        EntityType::Venue => &[
            EntityType::Nation,
            EntityType::Stage,
            EntityType::Event,
            EntityType::Team,
            EntityType::Club,
            EntityType::Sgo,
        ],
        EntityType::SportsPerson => &[
            EntityType::Club,
            EntityType::Team,
            EntityType::Event,
            EntityType::Staff,
            EntityType::Ranking,
        ],
        EntityType::Staff => &[
            EntityType::Team,
            EntityType::Club,
            EntityType::Nation,
            EntityType::SportsPerson,
        ],
        EntityType::KeyMoment => &[EntityType::Event],
        EntityType::Ranking => &[
            EntityType::Stage,
            EntityType::Event,
            EntityType::Team,
            EntityType::SportsPerson,
        ],
        EntityType::Sgo => &[
            EntityType::Competition,
            EntityType::Team,
            EntityType::Club,
            EntityType::Venue,
            EntityType::Nation,
            EntityType::Sgo,
        ],
        EntityType::Nation => &[
            EntityType::Sgo,
            EntityType::Team,
            EntityType::Venue,
        ],
    }
}
