// Copyright 2025 Cowboy AI, LLC.

//! Composite external-key codec
//!
//! Every entity is addressable across sources by a deterministic string
//! key composed from its external identity parts joined by typed
//! separators. Encoding is pure concatenation; decoding splits against the
//! layout implied by the entity type and surfaces [`KeyError`] for any key
//! that does not fit it.
//!
//! The separators are fixed, human-readable and never occur inside source
//! identifiers. `encode(decode(k)) == k` holds for every well-formed key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entities::EntityType;

/// Separator between an id and its scope.
pub const KEY_SEP: &str = " @ ";
/// Role separator for staff engaged by a team.
pub const TEAM_SEP: &str = " /team/ ";
/// Role separator for staff engaged by a club.
pub const CLUB_SEP: &str = " /club/ ";
/// Role separator for staff engaged by a nation.
pub const NATION_SEP: &str = " /nation/ ";
/// Separator naming an event context.
pub const EVENT_SEP: &str = " /event/ ";
/// Separator naming a stage context.
pub const STAGE_SEP: &str = " /stage/ ";
/// Separator naming a sports-person.
pub const SP_SEP: &str = " /sp/ ";
/// Separator before a ranking's date-time label.
pub const LABEL_SEP: &str = " /label/ ";
/// Separator before a ranking's position.
pub const POSITION_SEP: &str = " /rank/ ";
/// Ranking context separator: stage / team.
pub const RANKING_STAGE_TEAM_SEP: &str = " /st/ ";
/// Ranking context separator: event / team.
pub const RANKING_EVENT_TEAM_SEP: &str = " /et/ ";
/// Ranking context separator: stage / sports-person.
pub const RANKING_STAGE_SP_SEP: &str = " /ssp/ ";
/// Ranking context separator: event / sports-person.
pub const RANKING_EVENT_SP_SEP: &str = " /esp/ ";

/// Errors raised while decoding composite keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The key does not match the layout of its entity type
    #[error("malformed {entity_type} key: {key}")]
    Malformed {
        /// Entity type whose layout was expected
        entity_type: EntityType,
        /// The offending key
        key: String,
    },

    /// A ranking position segment was not a decimal integer
    #[error("malformed ranking position in key: {key}")]
    BadPosition {
        /// The offending key
        key: String,
    },

    /// A staff role name was not one of team, club or nation
    #[error("unknown staff role: {0}")]
    UnknownRole(String),
}

/// The organisation role of a staff engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    /// Engaged by a team
    Team,
    /// Engaged by a club
    Club,
    /// Engaged by a nation
    Nation,
}

impl StaffRole {
    /// The separator carried by keys of this role.
    pub fn separator(&self) -> &'static str {
        match self {
            StaffRole::Team => TEAM_SEP,
            StaffRole::Club => CLUB_SEP,
            StaffRole::Nation => NATION_SEP,
        }
    }

    /// The entity type of the engaging organisation.
    pub fn organisation_type(&self) -> EntityType {
        match self {
            StaffRole::Team => EntityType::Team,
            StaffRole::Club => EntityType::Club,
            StaffRole::Nation => EntityType::Nation,
        }
    }

    /// Source fields carrying the organisation reference for this role.
    pub fn organisation_fields(&self) -> (&'static str, &'static str) {
        match self {
            StaffRole::Team => ("externalTeamIdScope", "externalTeamId"),
            StaffRole::Club => ("externalClubIdScope", "externalClubId"),
            StaffRole::Nation => ("externalNationIdScope", "externalNationId"),
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StaffRole::Team => "team",
            StaffRole::Club => "club",
            StaffRole::Nation => "nation",
        };
        write!(f, "{name}")
    }
}

impl FromStr for StaffRole {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "team" => Ok(StaffRole::Team),
            "club" => Ok(StaffRole::Club),
            "nation" => Ok(StaffRole::Nation),
            other => Err(KeyError::UnknownRole(other.to_string())),
        }
    }
}

/// The context pairing of a ranking key.
///
/// Stage context takes priority over event context when a ranking names
/// both; a participant carrying a team reference ranks as a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankingContext {
    /// Team ranked within a stage
    StageTeam,
    /// Team ranked within an event
    EventTeam,
    /// Sports-person ranked within a stage
    StageSportsPerson,
    /// Sports-person ranked within an event
    EventSportsPerson,
}

impl RankingContext {
    /// All contexts, in decode-probe order.
    pub const ALL: [RankingContext; 4] = [
        RankingContext::StageTeam,
        RankingContext::EventTeam,
        RankingContext::StageSportsPerson,
        RankingContext::EventSportsPerson,
    ];

    /// The separator carried by keys of this context.
    pub fn separator(&self) -> &'static str {
        match self {
            RankingContext::StageTeam => RANKING_STAGE_TEAM_SEP,
            RankingContext::EventTeam => RANKING_EVENT_TEAM_SEP,
            RankingContext::StageSportsPerson => RANKING_STAGE_SP_SEP,
            RankingContext::EventSportsPerson => RANKING_EVENT_SP_SEP,
        }
    }

    /// The entity type providing the ranked context (stage or event).
    pub fn lead_type(&self) -> EntityType {
        match self {
            RankingContext::StageTeam | RankingContext::StageSportsPerson => EntityType::Stage,
            RankingContext::EventTeam | RankingContext::EventSportsPerson => EntityType::Event,
        }
    }

    /// The entity type of the ranked participant.
    pub fn participant_type(&self) -> EntityType {
        match self {
            RankingContext::StageTeam | RankingContext::EventTeam => EntityType::Team,
            RankingContext::StageSportsPerson | RankingContext::EventSportsPerson => {
                EntityType::SportsPerson
            }
        }
    }

    /// Select the context for a given lead and participant type.
    pub fn for_types(lead: EntityType, participant: EntityType) -> Option<RankingContext> {
        match (lead, participant) {
            (EntityType::Stage, EntityType::Team) => Some(RankingContext::StageTeam),
            (EntityType::Event, EntityType::Team) => Some(RankingContext::EventTeam),
            (EntityType::Stage, EntityType::SportsPerson) => {
                Some(RankingContext::StageSportsPerson)
            }
            (EntityType::Event, EntityType::SportsPerson) => {
                Some(RankingContext::EventSportsPerson)
            }
            _ => None,
        }
    }
}

/// Encode a plain entity key: `id ⊕ keySep ⊕ scope`.
pub fn encode_entity_key(id: &str, scope: &str) -> String {
    format!("{id}{KEY_SEP}{scope}")
}

/// Encode a staff key from the sports-person identity and the engaging
/// organisation, joined by the role separator.
pub fn encode_staff_key(
    sp_id: &str,
    sp_scope: &str,
    role: StaffRole,
    org_id: &str,
    org_scope: &str,
) -> String {
    format!(
        "{}{}{}",
        encode_entity_key(sp_id, sp_scope),
        role.separator(),
        encode_entity_key(org_id, org_scope)
    )
}

/// Encode a key-moment key.
///
/// Absent source fields encode as empty segments; the segment count is
/// always five.
pub fn encode_key_moment_key(
    date_time: &str,
    event_scope: &str,
    event_id: &str,
    kind: &str,
    sub_kind: &str,
) -> String {
    [date_time, event_scope, event_id, kind, sub_kind].join(KEY_SEP)
}

/// Encode a ranking key: lead entity, context separator, participant,
/// then the date-time label and decimal position.
pub fn encode_ranking_key(
    context: RankingContext,
    lead_id: &str,
    lead_scope: &str,
    participant_id: &str,
    participant_scope: &str,
    date_time: &str,
    position: i64,
) -> String {
    format!(
        "{}{}{}{LABEL_SEP}{date_time}{POSITION_SEP}{position}",
        encode_entity_key(lead_id, lead_scope),
        context.separator(),
        encode_entity_key(participant_id, participant_scope),
    )
}

/// A composite key decomposed into its typed parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedKey {
    /// A plain `(id, scope)` identity
    Entity {
        /// External id
        id: String,
        /// External id scope
        scope: String,
    },
    /// A staff engagement
    Staff {
        /// Sports-person external id
        sp_id: String,
        /// Sports-person external id scope
        sp_scope: String,
        /// Engaging organisation role
        role: StaffRole,
        /// Organisation external id
        org_id: String,
        /// Organisation external id scope
        org_scope: String,
    },
    /// A key moment
    KeyMoment {
        /// Moment date-time (may be empty when absent at source)
        date_time: String,
        /// Event external id scope
        event_scope: String,
        /// Event external id
        event_id: String,
        /// Moment type
        kind: String,
        /// Moment sub-type
        sub_kind: String,
    },
    /// A ranking
    Ranking {
        /// Context pairing
        context: RankingContext,
        /// Lead (stage or event) external id
        lead_id: String,
        /// Lead external id scope
        lead_scope: String,
        /// Participant external id
        participant_id: String,
        /// Participant external id scope
        participant_scope: String,
        /// Ranking date-time
        date_time: String,
        /// Ranking position
        position: i64,
    },
}

impl DecodedKey {
    /// The source-collection field equalities identifying the document
    /// this key was derived from.
    pub fn source_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            DecodedKey::Entity { id, scope } => vec![
                ("externalId", id.clone()),
                ("externalIdScope", scope.clone()),
            ],
            DecodedKey::Staff {
                sp_id,
                sp_scope,
                role,
                org_id,
                org_scope,
            } => {
                let (org_scope_field, org_id_field) = role.organisation_fields();
                vec![
                    ("externalSportsPersonId", sp_id.clone()),
                    ("externalSportsPersonIdScope", sp_scope.clone()),
                    (org_id_field, org_id.clone()),
                    (org_scope_field, org_scope.clone()),
                ]
            }
            DecodedKey::KeyMoment {
                date_time,
                event_scope,
                event_id,
                kind,
                sub_kind,
            } => vec![
                ("dateTime", date_time.clone()),
                ("externalEventIdScope", event_scope.clone()),
                ("externalEventId", event_id.clone()),
                ("type", kind.clone()),
                ("subType", sub_kind.clone()),
            ],
            DecodedKey::Ranking {
                context,
                lead_id,
                lead_scope,
                participant_id,
                participant_scope,
                date_time,
                position,
            } => {
                let (lead_scope_field, lead_id_field) = match context.lead_type() {
                    EntityType::Stage => ("externalStageIdScope", "externalStageId"),
                    _ => ("externalEventIdScope", "externalEventId"),
                };
                let (part_scope_field, part_id_field) = match context.participant_type() {
                    EntityType::Team => ("externalTeamIdScope", "externalTeamId"),
                    _ => ("externalSportsPersonIdScope", "externalSportsPersonId"),
                };
                vec![
                    (lead_id_field, lead_id.clone()),
                    (lead_scope_field, lead_scope.clone()),
                    (part_id_field, participant_id.clone()),
                    (part_scope_field, participant_scope.clone()),
                    ("dateTime", date_time.clone()),
                    ("rankingPosition", position.to_string()),
                ]
            }
        }
    }

    /// The materialised-document identity fields patched onto a peer once
    /// its source document has been located.
    pub fn materialised_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            DecodedKey::Entity { id, scope } => vec![
                ("_externalId", id.clone()),
                ("_externalIdScope", scope.clone()),
            ],
            DecodedKey::Staff {
                sp_id, sp_scope, ..
            } => vec![
                ("_externalSportsPersonId", sp_id.clone()),
                ("_externalSportsPersonIdScope", sp_scope.clone()),
            ],
            DecodedKey::KeyMoment {
                event_scope,
                event_id,
                ..
            } => vec![
                ("_externalEventId", event_id.clone()),
                ("_externalEventIdScope", event_scope.clone()),
            ],
            DecodedKey::Ranking { .. } => Vec::new(),
        }
    }
}

/// Decode a composite key against the layout of its entity type.
pub fn decode_key(entity_type: EntityType, key: &str) -> Result<DecodedKey, KeyError> {
    let malformed = || KeyError::Malformed {
        entity_type,
        key: key.to_string(),
    };

    match entity_type {
        EntityType::Staff => {
            let (role, at) = StaffRole::ALL_ROLES
                .iter()
                .filter_map(|r| key.find(r.separator()).map(|at| (*r, at)))
                .min_by_key(|(_, at)| *at)
                .ok_or_else(malformed)?;
            let sp_part = &key[..at];
            let org_part = &key[at + role.separator().len()..];
            let (sp_id, sp_scope) = split_entity(sp_part).ok_or_else(malformed)?;
            let (org_id, org_scope) = split_entity(org_part).ok_or_else(malformed)?;
            Ok(DecodedKey::Staff {
                sp_id,
                sp_scope,
                role,
                org_id,
                org_scope,
            })
        }
        EntityType::KeyMoment => {
            let parts: Vec<&str> = key.split(KEY_SEP).collect();
            if parts.len() != 5 {
                return Err(malformed());
            }
            Ok(DecodedKey::KeyMoment {
                date_time: parts[0].to_string(),
                event_scope: parts[1].to_string(),
                event_id: parts[2].to_string(),
                kind: parts[3].to_string(),
                sub_kind: parts[4].to_string(),
            })
        }
        EntityType::Ranking => {
            let (context, at) = RankingContext::ALL
                .iter()
                .filter_map(|c| key.find(c.separator()).map(|at| (*c, at)))
                .min_by_key(|(_, at)| *at)
                .ok_or_else(malformed)?;
            let lead_part = &key[..at];
            let rest = &key[at + context.separator().len()..];
            let (lead_id, lead_scope) = split_entity(lead_part).ok_or_else(malformed)?;
            let (participant_part, label_part) = rest.split_once(LABEL_SEP).ok_or_else(malformed)?;
            let (participant_id, participant_scope) =
                split_entity(participant_part).ok_or_else(malformed)?;
            let (date_time, position_str) =
                label_part.split_once(POSITION_SEP).ok_or_else(malformed)?;
            let position: i64 = position_str.parse().map_err(|_| KeyError::BadPosition {
                key: key.to_string(),
            })?;
            Ok(DecodedKey::Ranking {
                context,
                lead_id,
                lead_scope,
                participant_id,
                participant_scope,
                date_time: date_time.to_string(),
                position,
            })
        }
        _ => {
            let (id, scope) = split_entity(key).ok_or_else(malformed)?;
            Ok(DecodedKey::Entity { id, scope })
        }
    }
}

impl StaffRole {
    /// All roles, in decode-probe order.
    pub const ALL_ROLES: [StaffRole; 3] = [StaffRole::Team, StaffRole::Club, StaffRole::Nation];
}

/// Split on the leftmost key separator into `(id, scope)`.
fn split_entity(part: &str) -> Option<(String, String)> {
    part.split_once(KEY_SEP)
        .map(|(id, scope)| (id.to_string(), scope.to_string()))
}
