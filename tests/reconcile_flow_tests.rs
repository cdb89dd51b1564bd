// Copyright 2025 Cowboy AI, LLC.

//! Reconciliation flows: neighbour moves and reciprocal healing.

mod support;

use std::sync::Arc;

use gameday_aggregations::store::{UpdateSpec, WriteModel};
use gameday_aggregations::{
    BuildRequest, EntityType, Filter, MemoryStore, Processor, Store,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::MAT_AGG;

fn processor(store: &MemoryStore) -> Processor {
    Processor::new(Arc::new(store.clone()), MAT_AGG)
}

fn entity_request(entity_type: EntityType, id: &str) -> BuildRequest {
    BuildRequest::Entity {
        entity_type,
        scope: "fifa".to_string(),
        id: id.to_string(),
    }
}

/// Two competitions, each with one event; team t1 starts in A's event.
fn two_competition_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(
        "competitions",
        vec![
            json!({"gamedayId": "cA", "externalId": "A", "externalIdScope": "fifa"}),
            json!({"gamedayId": "cB", "externalId": "B", "externalIdScope": "fifa"}),
        ],
    );
    store.seed(
        "events",
        vec![
            json!({
                "gamedayId": "eA", "externalId": "EA", "externalIdScope": "fifa",
                "externalCompetitionIdScope": "fifa", "externalCompetitionId": "A",
                "participants": [
                    {"externalTeamIdScope": "fifa", "externalTeamId": "t1"}
                ]
            }),
            json!({
                "gamedayId": "eB", "externalId": "EB", "externalIdScope": "fifa",
                "externalCompetitionIdScope": "fifa", "externalCompetitionId": "B",
                "participants": []
            }),
        ],
    );
    store.seed(
        "teams",
        vec![json!({"gamedayId": "g1", "externalId": "t1", "externalIdScope": "fifa"})],
    );
    store
}

async fn competition_doc(store: &MemoryStore, key: &str) -> serde_json::Value {
    store
        .find_one(
            MAT_AGG,
            &Filter::new()
                .eq("resourceType", "competition")
                .eq("externalKey", key),
        )
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn moving_a_team_between_competitions_updates_both_peers() {
    let store = two_competition_store();
    let processor = processor(&store);

    processor
        .build(entity_request(EntityType::Competition, "A"), None)
        .await
        .unwrap();
    processor
        .build(entity_request(EntityType::Competition, "B"), None)
        .await
        .unwrap();
    processor
        .build(entity_request(EntityType::Team, "t1"), None)
        .await
        .unwrap();

    let competition_a = competition_doc(&store, "A @ fifa").await;
    assert_eq!(competition_a["teamKeys"], json!({"t1 @ fifa": "g1"}));

    // Move the team's participation from A's event to B's event.
    store
        .bulk_write(
            "events",
            vec![
                WriteModel::UpdateOne {
                    filter: Filter::new().eq("externalId", "EA"),
                    update: UpdateSpec::new().set("participants", json!([])),
                    upsert: false,
                },
                WriteModel::UpdateOne {
                    filter: Filter::new().eq("externalId", "EB"),
                    update: UpdateSpec::new().set(
                        "participants",
                        json!([{"externalTeamIdScope": "fifa", "externalTeamId": "t1"}]),
                    ),
                    upsert: false,
                },
            ],
        )
        .await
        .unwrap();

    let report = processor
        .build(entity_request(EntityType::Team, "t1"), None)
        .await
        .unwrap();

    // The team's own key did not move.
    assert_eq!(report.document.external_key, "t1 @ fifa");

    let competition_a = competition_doc(&store, "A @ fifa").await;
    assert_eq!(competition_a["teamKeys"], json!({}));
    assert_eq!(competition_a["teams"], json!([]));

    let competition_b = competition_doc(&store, "B @ fifa").await;
    assert_eq!(competition_b["teamKeys"], json!({"t1 @ fifa": "g1"}));
    assert_eq!(competition_b["teams"], json!(["g1"]));
}

#[tokio::test]
async fn reciprocity_holds_after_reconciliation_quiesces() {
    let store = two_competition_store();
    let processor = processor(&store);

    processor
        .build(entity_request(EntityType::Competition, "A"), None)
        .await
        .unwrap();
    processor
        .build(entity_request(EntityType::Team, "t1"), None)
        .await
        .unwrap();

    // A lists t1; t1 lists A.
    let competition_a = competition_doc(&store, "A @ fifa").await;
    assert_eq!(competition_a["teamKeys"], json!({"t1 @ fifa": "g1"}));

    let team = store
        .find_one(
            MAT_AGG,
            &Filter::new()
                .eq("resourceType", "team")
                .eq("externalKey", "t1 @ fifa"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(team["competitionKeys"]["A @ fifa"], json!("cA"));
}

#[tokio::test]
async fn rebuilding_after_manual_peer_damage_heals_the_graph() {
    let store = two_competition_store();
    let processor = processor(&store);

    processor
        .build(entity_request(EntityType::Competition, "A"), None)
        .await
        .unwrap();

    // Damage the team peer by hand.
    store
        .bulk_write(
            MAT_AGG,
            vec![WriteModel::UpdateOne {
                filter: Filter::new()
                    .eq("resourceType", "team")
                    .eq("externalKey", "t1 @ fifa"),
                update: UpdateSpec::new()
                    .set("competitions", json!([]))
                    .set("competitionKeys", json!({})),
                upsert: false,
            }],
        )
        .await
        .unwrap();

    // Rebuilding the team recomputes its side from source and restores
    // the reciprocal entries.
    processor
        .build(entity_request(EntityType::Team, "t1"), None)
        .await
        .unwrap();
    let team = store
        .find_one(
            MAT_AGG,
            &Filter::new()
                .eq("resourceType", "team")
                .eq("externalKey", "t1 @ fifa"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(team["competitionKeys"], json!({"A @ fifa": "cA"}));
}

#[tokio::test]
async fn upserted_peers_are_repaired_from_source() {
    let store = two_competition_store();
    let processor = processor(&store);

    // Building the team upserts competition peers that were never built.
    let report = processor
        .build(entity_request(EntityType::Team, "t1"), None)
        .await
        .unwrap();
    assert!(report.reconcile.repaired > 0);

    let competition_a = competition_doc(&store, "A @ fifa").await;
    assert_eq!(competition_a["gamedayId"], json!("cA"));
    assert_eq!(competition_a["_externalId"], json!("A"));
    assert_eq!(competition_a["_externalIdScope"], json!("fifa"));
    assert_eq!(competition_a["teams"], json!(["g1"]));
}
