// Copyright 2025 Cowboy AI, LLC.

//! The closed set of normalised entity types and their naming tables
//!
//! Every collection name, materialised projection field and key layout is
//! derived from [`EntityType`], so adding a type is a single-enum change
//! and every `match` over it stays exhaustive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AggregationError;

/// A normalised entity type known to the aggregation service.
///
/// The variant set is closed: dispatch over entity types is an exhaustive
/// `match`, never a string ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    /// A competition (e.g. a league or a cup)
    Competition,
    /// A stage within a competition
    Stage,
    /// An event (fixture) within a stage
    Event,
    /// A team
    Team,
    /// A club
    Club,
    /// A venue
    Venue,
    /// A sports-person
    SportsPerson,
    /// A staff engagement of a sports-person with a team, club or nation
    Staff,
    /// A key moment within an event
    KeyMoment,
    /// A ranking of a team or sports-person within a stage or event
    Ranking,
    /// A sports governing organisation
    Sgo,
    /// A nation
    Nation,
}

impl EntityType {
    /// All entity types, in declaration order.
    pub const ALL: [EntityType; 12] = [
        EntityType::Competition,
        EntityType::Stage,
        EntityType::Event,
        EntityType::Team,
        EntityType::Club,
        EntityType::Venue,
        EntityType::SportsPerson,
        EntityType::Staff,
        EntityType::KeyMoment,
        EntityType::Ranking,
        EntityType::Sgo,
        EntityType::Nation,
    ];

    /// The camel-case name used on API paths and in query results.
    pub fn api_name(&self) -> &'static str {
        match self {
            EntityType::Competition => "competition",
            EntityType::Stage => "stage",
            EntityType::Event => "event",
            EntityType::Team => "team",
            EntityType::Club => "club",
            EntityType::Venue => "venue",
            EntityType::SportsPerson => "sportsPerson",
            EntityType::Staff => "staff",
            EntityType::KeyMoment => "keyMoment",
            EntityType::Ranking => "ranking",
            EntityType::Sgo => "sgo",
            EntityType::Nation => "nation",
        }
    }

    /// The lower-case resource type stored on materialised documents.
    ///
    /// Source documents may carry the mixed-case form; it is normalised to
    /// this value on every write.
    pub fn resource_type(&self) -> &'static str {
        match self {
            EntityType::Competition => "competition",
            EntityType::Stage => "stage",
            EntityType::Event => "event",
            EntityType::Team => "team",
            EntityType::Club => "club",
            EntityType::Venue => "venue",
            EntityType::SportsPerson => "sportsperson",
            EntityType::Staff => "staff",
            EntityType::KeyMoment => "keymoment",
            EntityType::Ranking => "ranking",
            EntityType::Sgo => "sgo",
            EntityType::Nation => "nation",
        }
    }

    /// The source collection holding normalised documents of this type.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityType::Competition => "competitions",
            EntityType::Stage => "stages",
            EntityType::Event => "events",
            EntityType::Team => "teams",
            EntityType::Club => "clubs",
            EntityType::Venue => "venues",
            EntityType::SportsPerson => "sportsPersons",
            EntityType::Staff => "staff",
            EntityType::KeyMoment => "keyMoments",
            EntityType::Ranking => "rankings",
            EntityType::Sgo => "sgos",
            EntityType::Nation => "nations",
        }
    }

    /// The materialised field holding the deduplicated `gamedayId`
    /// collection for neighbours of this type.
    ///
    /// The pair of [`Self::ids_field`] and [`Self::keys_field`] is uniform
    /// for every neighbour type regardless of relationship cardinality, so
    /// reciprocal references always live under one known field pair.
    pub fn ids_field(&self) -> &'static str {
        match self {
            EntityType::Competition => "competitions",
            EntityType::Stage => "stages",
            EntityType::Event => "events",
            EntityType::Team => "teams",
            EntityType::Club => "clubs",
            EntityType::Venue => "venues",
            EntityType::SportsPerson => "sportsPersons",
            EntityType::Staff => "staff",
            EntityType::KeyMoment => "keyMoments",
            EntityType::Ranking => "rankings",
            EntityType::Sgo => "sgos",
            EntityType::Nation => "nations",
        }
    }

    /// The materialised field mapping composite external keys to
    /// `gamedayId` values for neighbours of this type.
    pub fn keys_field(&self) -> &'static str {
        match self {
            EntityType::Competition => "competitionKeys",
            EntityType::Stage => "stageKeys",
            EntityType::Event => "eventKeys",
            EntityType::Team => "teamKeys",
            EntityType::Club => "clubKeys",
            EntityType::Venue => "venueKeys",
            EntityType::SportsPerson => "sportsPersonKeys",
            EntityType::Staff => "staffKeys",
            EntityType::KeyMoment => "keyMomentKeys",
            EntityType::Ranking => "rankingKeys",
            EntityType::Sgo => "sgoKeys",
            EntityType::Nation => "nationKeys",
        }
    }

    /// Resolve a projection ids field name back to the neighbour type.
    pub fn from_ids_field(field: &str) -> Option<EntityType> {
        EntityType::ALL.iter().copied().find(|t| t.ids_field() == field)
    }

    /// Whether this type is identified by a plain `(externalIdScope,
    /// externalId)` pair rather than a compound key.
    pub fn has_simple_key(&self) -> bool {
        !matches!(
            self,
            EntityType::Staff | EntityType::KeyMoment | EntityType::Ranking
        )
    }

}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_name())
    }
}

impl FromStr for EntityType {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.resource_type() == lower)
            .ok_or_else(|| AggregationError::InvalidInput {
                reason: format!("unknown entity type: {s}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    /// Test round-tripping every type through its API name
    ///
    /// ```mermaid
    /// graph LR
    ///     A[EntityType] -->|api_name| B[String]
    ///     B -->|FromStr| C[EntityType]
    ///     A -->|Equal| C
    /// ```
    #[test]
    fn test_api_name_round_trip() {
        for t in EntityType::ALL {
            let parsed: EntityType = t.api_name().parse().unwrap();
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "SPORTSPERSON".parse::<EntityType>().unwrap(),
            EntityType::SportsPerson
        );
        assert_eq!(
            "keyMoment".parse::<EntityType>().unwrap(),
            EntityType::KeyMoment
        );
    }

    #[test]
    fn test_parse_rejects_unknown_types() {
        let err = "unknownType".parse::<EntityType>().unwrap_err();
        assert!(err.to_string().contains("unknownType"));
    }

    #[test_case(EntityType::Competition, "competitions", "competitionKeys")]
    #[test_case(EntityType::SportsPerson, "sportsPersons", "sportsPersonKeys")]
    #[test_case(EntityType::Staff, "staff", "staffKeys")]
    #[test_case(EntityType::KeyMoment, "keyMoments", "keyMomentKeys")]
    fn test_projection_field_pairs(t: EntityType, ids: &str, keys: &str) {
        assert_eq!(t.ids_field(), ids);
        assert_eq!(t.keys_field(), keys);
    }

    #[test]
    fn test_resource_type_is_lower_case() {
        for t in EntityType::ALL {
            assert_eq!(t.resource_type(), t.resource_type().to_ascii_lowercase());
        }
    }

    #[test]
    fn test_compound_key_types() {
        let compound: Vec<_> = EntityType::ALL
            .iter()
            .filter(|t| !t.has_simple_key())
            .collect();
        assert_eq!(
            compound,
            vec![&EntityType::Staff, &EntityType::KeyMoment, &EntityType::Ranking]
        );
    }

    #[test]
    fn test_from_ids_field() {
        for t in EntityType::ALL {
            assert_eq!(EntityType::from_ids_field(t.ids_field()), Some(t));
        }
        assert_eq!(EntityType::from_ids_field("notAField"), None);
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_string(&EntityType::SportsPerson).unwrap();
        assert_eq!(json, "\"sportsPerson\"");
        let back: EntityType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EntityType::SportsPerson);
    }
}
