// Copyright 2025 Cowboy AI, LLC.

//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use gameday_aggregations::MemoryStore;
use serde_json::json;

/// The collection every suite materialises into.
pub const MAT_AGG: &str = "materialisedAggregations";

/// A tournament fixture: one competition with two stages, three events
/// per stage, one distinct team per event and one venue per stage.
pub fn world_cup_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(
        "competitions",
        vec![json!({
            "gamedayId": "c1",
            "externalId": "289175",
            "externalIdScope": "fifa",
            "resourceType": "Competition",
            "defaultLanguage": "en",
            "name": {"en": "World Cup"}
        })],
    );
    store.seed(
        "stages",
        vec![
            stage("s1", "S1", "V1"),
            stage("s2", "S2", "V2"),
        ],
    );
    let mut events = Vec::new();
    for (index, (event_id, stage_id)) in [
        ("E1", "S1"),
        ("E2", "S1"),
        ("E3", "S1"),
        ("E4", "S2"),
        ("E5", "S2"),
        ("E6", "S2"),
    ]
    .iter()
    .enumerate()
    {
        events.push(json!({
            "gamedayId": format!("e{}", index + 1),
            "externalId": event_id,
            "externalIdScope": "fifa",
            "resourceType": "Event",
            "externalCompetitionIdScope": "fifa",
            "externalCompetitionId": "289175",
            "externalStageIdScope": "fifa",
            "externalStageId": stage_id,
            "participants": [
                {"externalTeamIdScope": "fifa", "externalTeamId": format!("t{}", index + 1)}
            ]
        }));
    }
    store.seed("events", events);
    store.seed(
        "teams",
        (1..=6)
            .map(|n| {
                json!({
                    "gamedayId": format!("g{n}"),
                    "externalId": format!("t{n}"),
                    "externalIdScope": "fifa",
                    "resourceType": "Team"
                })
            })
            .collect(),
    );
    store.seed(
        "venues",
        vec![
            json!({"gamedayId": "v1", "externalId": "V1", "externalIdScope": "fifa"}),
            json!({"gamedayId": "v2", "externalId": "V2", "externalIdScope": "fifa"}),
        ],
    );
    store
}

fn stage(gameday_id: &str, external_id: &str, venue_id: &str) -> serde_json::Value {
    json!({
        "gamedayId": gameday_id,
        "externalId": external_id,
        "externalIdScope": "fifa",
        "resourceType": "Stage",
        "externalCompetitionIdScope": "fifa",
        "externalCompetitionId": "289175",
        "externalVenueIdScope": "fifa",
        "externalVenueId": venue_id
    })
}
