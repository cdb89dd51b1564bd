// Copyright 2025 Cowboy AI, LLC.

//! Reference reconciliation across materialised documents
//!
//! After a build, the peers named by the source's old and new neighbour
//! sets must agree with it: peers no longer referenced drop the source
//! from their reciprocal projection, newly referenced peers gain it. The
//! reciprocity this maintains is eventual, not transactional; every
//! operation here is idempotent so builds can be re-run to heal.

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::documents::{gameday_id, MaterialisedAggregation};
use crate::entities::EntityType;
use crate::errors::AggregationResult;
use crate::keys::{decode_key, DecodedKey};
use crate::store::{Filter, Store, UpdateSpec, WriteModel};

/// Counts reported by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Peer operations submitted
    pub attempted: usize,
    /// Peer operations applied
    pub applied: usize,
    /// Peer operations that failed; logged, not fatal
    pub failed: usize,
    /// Upserted peers whose `gamedayId` was back-filled from source
    pub repaired: usize,
    /// Present when the bulk partially failed
    pub warning: Option<String>,
}

impl ReconcileSummary {
    /// Whether the pass touched no peers.
    pub fn is_noop(&self) -> bool {
        self.attempted == 0
    }
}

/// Keeps peer materialised documents consistent with a source's
/// neighbour sets.
pub struct Reconciler {
    store: Arc<dyn Store>,
    materialised_collection: String,
}

impl Reconciler {
    /// Create a reconciler writing into the given materialised
    /// collection.
    pub fn new(store: Arc<dyn Store>, materialised_collection: impl Into<String>) -> Self {
        Self {
            store,
            materialised_collection: materialised_collection.into(),
        }
    }

    /// Diff the old and new snapshots of a source's materialised document
    /// and bring its peers into agreement.
    ///
    /// When the source's own external key changed, every neighbour type
    /// the source participates in is reconciled wholesale: the old key is
    /// withdrawn from every old peer and the new key offered to every new
    /// peer, whatever the per-type diffs say.
    pub async fn reconcile(
        &self,
        old: Option<&MaterialisedAggregation>,
        new: &MaterialisedAggregation,
    ) -> AggregationResult<ReconcileSummary> {
        let source_type: EntityType = new.resource_type.parse()?;
        let new_key = new.external_key.as_str();
        let old_key = old.map(|o| o.external_key.as_str());
        let key_moved = old_key.is_some_and(|k| k != new_key);
        let source_id = new
            .gameday_id
            .clone()
            .or_else(|| old.and_then(|o| o.gameday_id.clone()));

        let mut neighbour_types: BTreeSet<EntityType> = new.neighbour_types().into_iter().collect();
        if let Some(old) = old {
            neighbour_types.extend(old.neighbour_types());
        }

        let mut removals: Vec<(EntityType, String)> = Vec::new();
        let mut additions: Vec<(EntityType, String)> = Vec::new();
        for neighbour in neighbour_types {
            let old_keys: BTreeSet<&str> = old
                .and_then(|o| o.projection(neighbour))
                .map(|p| p.key_set().into_iter().collect())
                .unwrap_or_default();
            let new_keys: BTreeSet<&str> = new
                .projection(neighbour)
                .map(|p| p.key_set().into_iter().collect())
                .unwrap_or_default();

            if key_moved {
                removals.extend(old_keys.iter().map(|k| (neighbour, k.to_string())));
                additions.extend(new_keys.iter().map(|k| (neighbour, k.to_string())));
            } else {
                removals.extend(
                    old_keys
                        .difference(&new_keys)
                        .map(|k| (neighbour, k.to_string())),
                );
                additions.extend(
                    new_keys
                        .difference(&old_keys)
                        .map(|k| (neighbour, k.to_string())),
                );
            }
        }

        if removals.is_empty() && additions.is_empty() {
            return Ok(ReconcileSummary::default());
        }

        let now = Utc::now().to_rfc3339();
        let withdraw_key = old_key.unwrap_or(new_key);
        let mut writes: Vec<WriteModel> = Vec::new();

        // Removals precede additions so a peer referenced under both the
        // old and new key reaches the added state whatever the overlap.
        for (neighbour, peer_key) in &removals {
            let mut update = UpdateSpec::new()
                .unset_map_entry(source_type.keys_field(), withdraw_key)
                .set("lastUpdated", now.clone());
            if let Some(id) = &source_id {
                update = update.pull(source_type.ids_field(), id.clone());
            }
            writes.push(WriteModel::UpdateOne {
                filter: peer_filter(*neighbour, peer_key),
                update,
                upsert: false,
            });
        }
        for (neighbour, peer_key) in &additions {
            let mut update = UpdateSpec::new()
                .set_map_entry(
                    source_type.keys_field(),
                    new_key,
                    source_id.clone().map_or(Value::Null, Value::String),
                )
                .set("lastUpdated", now.clone());
            if let Some(id) = &source_id {
                update = update.add_to_set(source_type.ids_field(), id.clone());
            }
            writes.push(WriteModel::UpdateOne {
                filter: peer_filter(*neighbour, peer_key),
                update,
                upsert: true,
            });
        }

        let outcome = self
            .store
            .bulk_write(&self.materialised_collection, writes)
            .await?;
        let mut summary = ReconcileSummary {
            attempted: outcome.attempted,
            applied: outcome.applied,
            failed: outcome.failed,
            repaired: 0,
            warning: None,
        };
        if outcome.failed > 0 {
            let warning = format!(
                "reconciliation applied {} of {} peer operations",
                outcome.applied, outcome.attempted
            );
            tracing::warn!(
                external_key = new_key,
                failed = outcome.failed,
                "{warning}"
            );
            summary.warning = Some(warning);
        }

        summary.repaired = self.repair_upserted_peers(&additions).await?;
        tracing::debug!(
            external_key = new_key,
            removed = removals.len(),
            added = additions.len(),
            repaired = summary.repaired,
            "reconciliation complete"
        );
        Ok(summary)
    }

    /// Back-fill identity onto peers created by an addition upsert.
    ///
    /// A freshly upserted peer knows only its `(resourceType,
    /// externalKey)`. Its composite key is decomposed, the matching
    /// source document fetched, and the peer patched with the
    /// `gamedayId` and identity fields found there. Peers whose source
    /// is itself absent stay as key-only stubs.
    async fn repair_upserted_peers(
        &self,
        additions: &[(EntityType, String)],
    ) -> AggregationResult<usize> {
        let mut repairs: Vec<WriteModel> = Vec::new();
        for (neighbour, peer_key) in additions {
            let Some(peer) = self
                .store
                .find_one(&self.materialised_collection, &peer_filter(*neighbour, peer_key))
                .await?
            else {
                tracing::warn!(
                    peer_type = neighbour.api_name(),
                    peer_key,
                    "peer absent after addition upsert"
                );
                continue;
            };
            if gameday_id(&peer).is_some() {
                continue;
            }

            let decoded = decode_key(*neighbour, peer_key)?;
            let Some(source) = self
                .store
                .find_one(neighbour.collection(), &source_filter(&decoded))
                .await?
            else {
                continue;
            };
            let Some(id) = gameday_id(&source) else {
                continue;
            };

            let mut update = UpdateSpec::new().set("gamedayId", id);
            for (field, value) in decoded.materialised_fields() {
                update = update.set(field, value);
            }
            repairs.push(WriteModel::UpdateOne {
                filter: peer_filter(*neighbour, peer_key),
                update,
                upsert: false,
            });
        }

        if repairs.is_empty() {
            return Ok(0);
        }
        let outcome = self
            .store
            .bulk_write(&self.materialised_collection, repairs)
            .await?;
        Ok(outcome.applied)
    }
}

fn peer_filter(neighbour: EntityType, peer_key: &str) -> Filter {
    Filter::new()
        .eq("resourceType", neighbour.resource_type())
        .eq("externalKey", peer_key)
}

/// The source-collection filter identifying the document a decomposed
/// key came from. Ranking positions match in either numeric or string
/// form.
fn source_filter(decoded: &DecodedKey) -> Filter {
    let mut filter = Filter::new();
    for (field, value) in decoded.source_fields() {
        if field == "rankingPosition" {
            let mut forms = Vec::new();
            if let Ok(position) = value.parse::<i64>() {
                forms.push(json!(position));
            }
            forms.push(json!(value));
            filter = filter.is_in(field, forms);
        } else {
            filter = filter.eq(field, value);
        }
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::Projection;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn team_doc(external_key: &str, gameday: &str) -> MaterialisedAggregation {
        let mut doc = MaterialisedAggregation::new(EntityType::Team, external_key);
        doc.gameday_id = Some(gameday.to_string());
        doc
    }

    fn with_competitions(mut doc: MaterialisedAggregation, keys: &[(&str, &str)]) -> MaterialisedAggregation {
        let mut projection = Projection::new();
        for (key, id) in keys {
            projection.insert(key.to_string(), Some(id.to_string()));
        }
        doc.set_projection(EntityType::Competition, projection);
        doc
    }

    fn reconciler(store: &MemoryStore) -> Reconciler {
        Reconciler::new(Arc::new(store.clone()), "materialisedAggregations")
    }

    #[test]
    fn test_noop_when_sets_agree() {
        let store = MemoryStore::new();
        let old = with_competitions(team_doc("t1 @ fifa", "g1"), &[("A @ fifa", "cA")]);
        let new = with_competitions(team_doc("t1 @ fifa", "g1"), &[("A @ fifa", "cA")]);
        tokio_test::block_on(async {
            let summary = reconciler(&store).reconcile(Some(&old), &new).await.unwrap();
            assert!(summary.is_noop());
            assert!(store.dump("materialisedAggregations").is_empty());
        });
    }

    /// Test a neighbour move between two competitions
    ///
    /// ```mermaid
    /// graph LR
    ///     T[team t1] -->|was in| A[competition A]
    ///     T -->|now in| B[competition B]
    ///     A -->|pull t1| A2[teams without t1]
    ///     B -->|add t1| B2[teams with t1]
    /// ```
    #[test]
    fn test_move_between_peers() {
        let store = MemoryStore::new();
        store.seed(
            "materialisedAggregations",
            vec![json!({
                "resourceType": "competition", "externalKey": "A @ fifa",
                "gamedayId": "cA", "teams": ["g1"], "teamKeys": {"t1 @ fifa": "g1"}
            })],
        );
        let old = with_competitions(team_doc("t1 @ fifa", "g1"), &[("A @ fifa", "cA")]);
        let new = with_competitions(team_doc("t1 @ fifa", "g1"), &[("B @ fifa", "cB")]);

        tokio_test::block_on(async {
            let summary = reconciler(&store).reconcile(Some(&old), &new).await.unwrap();
            assert_eq!(summary.attempted, 2);
            assert_eq!(summary.failed, 0);

            let competition_a = store
                .find_one(
                    "materialisedAggregations",
                    &peer_filter(EntityType::Competition, "A @ fifa"),
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(competition_a["teams"], json!([]));
            assert_eq!(competition_a["teamKeys"], json!({}));

            let competition_b = store
                .find_one(
                    "materialisedAggregations",
                    &peer_filter(EntityType::Competition, "B @ fifa"),
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(competition_b["teams"], json!(["g1"]));
            assert_eq!(competition_b["teamKeys"], json!({"t1 @ fifa": "g1"}));
        });
    }

    #[test]
    fn test_source_key_move_touches_all_peers() {
        let store = MemoryStore::new();
        store.seed(
            "materialisedAggregations",
            vec![json!({
                "resourceType": "competition", "externalKey": "A @ fifa",
                "gamedayId": "cA", "teams": ["g1"], "teamKeys": {"t1 @ fifa": "g1"}
            })],
        );
        // Same competition on both sides, but the team's own key changed.
        let old = with_competitions(team_doc("t1 @ fifa", "g1"), &[("A @ fifa", "cA")]);
        let new = with_competitions(team_doc("t1-renamed @ fifa", "g1"), &[("A @ fifa", "cA")]);

        tokio_test::block_on(async {
            let summary = reconciler(&store).reconcile(Some(&old), &new).await.unwrap();
            // One removal and one addition for the same peer.
            assert_eq!(summary.attempted, 2);

            let competition_a = store
                .find_one(
                    "materialisedAggregations",
                    &peer_filter(EntityType::Competition, "A @ fifa"),
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(competition_a["teamKeys"], json!({"t1-renamed @ fifa": "g1"}));
            assert_eq!(competition_a["teams"], json!(["g1"]));
        });
    }

    #[test]
    fn test_addition_upserts_and_repairs_missing_peer() {
        let store = MemoryStore::new();
        store.seed(
            "competitions",
            vec![json!({
                "gamedayId": "cB", "externalId": "B", "externalIdScope": "fifa"
            })],
        );
        let new = with_competitions(team_doc("t1 @ fifa", "g1"), &[("B @ fifa", "cB")]);

        tokio_test::block_on(async {
            let summary = reconciler(&store).reconcile(None, &new).await.unwrap();
            assert_eq!(summary.attempted, 1);
            assert_eq!(summary.repaired, 1);

            let peer = store
                .find_one(
                    "materialisedAggregations",
                    &peer_filter(EntityType::Competition, "B @ fifa"),
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(peer["gamedayId"], json!("cB"));
            assert_eq!(peer["_externalId"], json!("B"));
            assert_eq!(peer["_externalIdScope"], json!("fifa"));
            assert_eq!(peer["teams"], json!(["g1"]));
        });
    }

    #[test]
    fn test_peer_without_source_stays_stub() {
        let store = MemoryStore::new();
        let new = with_competitions(team_doc("t1 @ fifa", "g1"), &[("B @ fifa", "cB")]);
        tokio_test::block_on(async {
            let summary = reconciler(&store).reconcile(None, &new).await.unwrap();
            assert_eq!(summary.repaired, 0);
            let peer = store
                .find_one(
                    "materialisedAggregations",
                    &peer_filter(EntityType::Competition, "B @ fifa"),
                )
                .await
                .unwrap()
                .unwrap();
            assert!(peer.get("gamedayId").is_none());
        });
    }

    #[test]
    fn test_reapplying_same_diff_is_idempotent() {
        let store = MemoryStore::new();
        let new = with_competitions(team_doc("t1 @ fifa", "g1"), &[("B @ fifa", "cB")]);
        tokio_test::block_on(async {
            reconciler(&store).reconcile(None, &new).await.unwrap();
            let first = store.dump("materialisedAggregations");
            let summary = reconciler(&store).reconcile(None, &new).await.unwrap();
            assert_eq!(summary.attempted, 1);
            let second = store.dump("materialisedAggregations");
            // lastUpdated moves; projections do not.
            assert_eq!(first.len(), second.len());
            assert_eq!(first[0]["teams"], second[0]["teams"]);
            assert_eq!(first[0]["teamKeys"], second[0]["teamKeys"]);
        });
    }
}
