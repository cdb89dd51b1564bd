// Copyright 2025 Cowboy AI, LLC.

//! Materialised list query execution
//!
//! Executes a traversal step plan against the materialised collection:
//! the root document's projection arrays seed depth-0 steps, deeper
//! steps join parent ids back into the collection, and each target's
//! reachable id set is split into the included page and the overflow
//! beyond its limit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::documents::str_field;
use crate::entities::EntityType;
use crate::errors::{AggregationError, AggregationResult};
use crate::planner::{plan, StepPlan};
use crate::store::{Filter, Store};

/// Orderings available for included documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// `gamedayId` ascending
    GamedayId,
    /// `lastUpdated` descending
    LastUpdated,
    /// The order ids were reached in
    #[default]
    InsertionOrder,
}

impl FromStr for SortBy {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gamedayId" => Ok(SortBy::GamedayId),
            "lastUpdated" => Ok(SortBy::LastUpdated),
            "insertionOrder" => Ok(SortBy::InsertionOrder),
            other => Err(AggregationError::InvalidInput {
                reason: format!("unknown sort order: {other}"),
            }),
        }
    }
}

/// Per-request limits on included documents.
#[derive(Debug, Clone, Default)]
pub struct ListLimits {
    /// Budget shared by every target, spent in target order
    pub total_max: Option<usize>,
    /// Per-target ceilings
    pub per_type: HashMap<EntityType, usize>,
}

impl ListLimits {
    /// No limits: every reachable document is included.
    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// A list query over the materialised graph.
#[derive(Debug, Clone)]
pub struct ListQuery {
    /// Root entity type
    pub root_type: EntityType,
    /// Root composite external key
    pub root_key: String,
    /// Target types, in budget-allocation order
    pub targets: Vec<EntityType>,
    /// Limits applied per target
    pub limits: ListLimits,
    /// Ordering of included documents
    pub sort_by: SortBy,
    /// Overall deadline; exceeding it discards the partial result
    pub deadline: Option<Duration>,
}

/// The ids reachable beyond a target's limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overflow {
    /// Target type name
    pub resource_type: String,
    /// Reachable ids not included
    pub overflow_ids: Vec<String>,
}

/// One target's portion of a list result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetResult {
    /// Included materialised documents
    pub items: Vec<Value>,
    /// Ids beyond the limit
    pub overflow: Overflow,
}

/// The root reference echoed on every result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootRef {
    /// Root type name
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Root composite external key
    #[serde(rename = "externalKey")]
    pub external_key: String,
}

/// The assembled result of one list query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResult {
    /// The queried root
    pub root: RootRef,
    /// Per-target results keyed by target type name
    pub results: BTreeMap<String, TargetResult>,
}

/// Executes list queries against the materialised collection.
pub struct ListQueryExecutor {
    store: Arc<dyn Store>,
    materialised_collection: String,
}

impl ListQueryExecutor {
    /// Create an executor reading the given materialised collection.
    pub fn new(store: Arc<dyn Store>, materialised_collection: impl Into<String>) -> Self {
        Self {
            store,
            materialised_collection: materialised_collection.into(),
        }
    }

    /// Execute a list query, honouring its deadline.
    pub async fn execute(&self, query: &ListQuery) -> AggregationResult<ListResult> {
        match query.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.run(query))
                .await
                .map_err(|_| AggregationError::Timeout)?,
            None => self.run(query).await,
        }
    }

    async fn run(&self, query: &ListQuery) -> AggregationResult<ListResult> {
        let mut targets: Vec<EntityType> = Vec::new();
        for &target in &query.targets {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        let step_plan = plan(query.root_type, &targets)?;

        let root_doc = self
            .store
            .find_one(
                &self.materialised_collection,
                &Filter::new()
                    .eq("resourceType", query.root_type.resource_type())
                    .eq("externalKey", query.root_key.clone()),
            )
            .await?
            .ok_or_else(|| AggregationError::NotFound {
                entity_type: query.root_type,
                selector: query.root_key.clone(),
            })?;

        let outputs = self.evaluate_steps(&step_plan, &root_doc).await?;

        let mut results = BTreeMap::new();
        let mut remaining_total = query.limits.total_max;
        for target in targets {
            let reachable: Vec<String> = match step_plan.terminals[&target] {
                Some(index) => outputs[index].clone(),
                None => str_field(&root_doc, "gamedayId")
                    .map(|id| vec![id.to_string()])
                    .unwrap_or_default(),
            };

            let per_type = query.limits.per_type.get(&target).copied();
            let budget = match (per_type, remaining_total) {
                (Some(p), Some(t)) => p.min(t),
                (Some(p), None) => p,
                (None, Some(t)) => t,
                (None, None) => reachable.len(),
            };
            let included: Vec<String> = reachable.iter().take(budget).cloned().collect();
            let overflow_ids: Vec<String> = reachable.iter().skip(budget).cloned().collect();
            if let Some(total) = remaining_total.as_mut() {
                *total -= included.len().min(*total);
            }

            let items = self
                .fetch_items(target, &included, query.sort_by)
                .await?;
            results.insert(
                target.api_name().to_string(),
                TargetResult {
                    items,
                    overflow: Overflow {
                        resource_type: target.api_name().to_string(),
                        overflow_ids,
                    },
                },
            );
        }

        Ok(ListResult {
            root: RootRef {
                entity_type: query.root_type.api_name().to_string(),
                external_key: query.root_key.clone(),
            },
            results,
        })
    }

    /// Evaluate steps in plan order; parents precede children by the
    /// ascending-depth ordering.
    async fn evaluate_steps(
        &self,
        step_plan: &StepPlan,
        root_doc: &Value,
    ) -> AggregationResult<Vec<Vec<String>>> {
        let mut outputs: Vec<Vec<String>> = Vec::with_capacity(step_plan.steps.len());
        for step in &step_plan.steps {
            let ids = if step.depth == 0 {
                id_array(root_doc, step.hop.field)
            } else {
                let parent_index = step_plan
                    .step_producing(step.hop.from)
                    .expect("parent step precedes child in plan");
                let parent_ids = &outputs[parent_index];
                if parent_ids.is_empty() {
                    Vec::new()
                } else {
                    let docs = self
                        .store
                        .find_matching(
                            &self.materialised_collection,
                            &Filter::new()
                                .eq("resourceType", step.hop.from.resource_type())
                                .is_in(
                                    "gamedayId",
                                    parent_ids.iter().map(|id| json!(id)).collect(),
                                ),
                        )
                        .await?;
                    let by_id: HashMap<&str, &Value> = docs
                        .iter()
                        .filter_map(|doc| str_field(doc, "gamedayId").map(|id| (id, doc)))
                        .collect();
                    let mut merged: Vec<String> = Vec::new();
                    for parent_id in parent_ids {
                        if let Some(doc) = by_id.get(parent_id.as_str()) {
                            for id in id_array(doc, step.hop.field) {
                                if !merged.contains(&id) {
                                    merged.push(id);
                                }
                            }
                        }
                    }
                    merged
                }
            };
            outputs.push(ids);
        }
        Ok(outputs)
    }

    async fn fetch_items(
        &self,
        target: EntityType,
        included: &[String],
        sort_by: SortBy,
    ) -> AggregationResult<Vec<Value>> {
        if included.is_empty() {
            return Ok(Vec::new());
        }
        let mut docs = self
            .store
            .find_matching(
                &self.materialised_collection,
                &Filter::new()
                    .eq("resourceType", target.resource_type())
                    .is_in("gamedayId", included.iter().map(|id| json!(id)).collect()),
            )
            .await?;

        match sort_by {
            SortBy::GamedayId => {
                docs.sort_by_key(|doc| {
                    str_field(doc, "gamedayId").unwrap_or_default().to_string()
                });
            }
            SortBy::LastUpdated => {
                docs.sort_by_key(|doc| {
                    let parsed = str_field(doc, "lastUpdated")
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc));
                    std::cmp::Reverse(parsed)
                });
            }
            SortBy::InsertionOrder => {
                let rank: HashMap<&str, usize> = included
                    .iter()
                    .enumerate()
                    .map(|(i, id)| (id.as_str(), i))
                    .collect();
                docs.sort_by_key(|doc| {
                    str_field(doc, "gamedayId")
                        .and_then(|id| rank.get(id).copied())
                        .unwrap_or(usize::MAX)
                });
            }
        }
        Ok(docs)
    }
}

/// Read a projection id array, deduplicated in order.
fn id_array(doc: &Value, field: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    if let Some(entries) = doc.get(field).and_then(Value::as_array) {
        for id in entries.iter().filter_map(Value::as_str) {
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn materialised(resource_type: &str, external_key: &str, gameday_id: &str) -> Value {
        json!({
            "resourceType": resource_type,
            "externalKey": external_key,
            "gamedayId": gameday_id,
            "lastUpdated": "2026-01-01T00:00:00+00:00"
        })
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        let mut competition = materialised("competition", "289175 @ fifa", "c1");
        competition["teams"] = json!(["g1", "g2", "g3"]);
        competition["venues"] = json!(["v1"]);
        competition["events"] = json!(["e1"]);
        let mut event = materialised("event", "E1 @ fifa", "e1");
        event["keyMoments"] = json!(["k1", "k2"]);
        store.seed(
            "materialisedAggregations",
            vec![
                competition,
                event,
                materialised("team", "t1 @ fifa", "g1"),
                materialised("team", "t2 @ fifa", "g2"),
                materialised("team", "t3 @ fifa", "g3"),
                materialised("venue", "V1 @ fifa", "v1"),
                materialised("keymoment", "2024 @ fifa @ E1 @ goal @ ", "k1"),
                materialised("keymoment", "2024 @ fifa @ E1 @ goal @ header", "k2"),
            ],
        );
        store
    }

    fn executor(store: &MemoryStore) -> ListQueryExecutor {
        ListQueryExecutor::new(Arc::new(store.clone()), "materialisedAggregations")
    }

    fn base_query(targets: Vec<EntityType>) -> ListQuery {
        ListQuery {
            root_type: EntityType::Competition,
            root_key: "289175 @ fifa".to_string(),
            targets,
            limits: ListLimits::unbounded(),
            sort_by: SortBy::InsertionOrder,
            deadline: None,
        }
    }

    #[test]
    fn test_included_plus_overflow_covers_reachable() {
        let store = seeded_store();
        let mut query = base_query(vec![EntityType::Team]);
        query.limits.per_type.insert(EntityType::Team, 2);
        tokio_test::block_on(async {
            let result = executor(&store).execute(&query).await.unwrap();
            let team = &result.results["team"];
            assert_eq!(team.items.len(), 2);
            assert_eq!(team.overflow.overflow_ids, vec!["g3"]);
            assert_eq!(team.overflow.resource_type, "team");
        });
    }

    #[test]
    fn test_total_budget_spends_in_target_order() {
        let store = seeded_store();
        let mut query = base_query(vec![EntityType::Team, EntityType::Venue]);
        query.limits.total_max = Some(3);
        tokio_test::block_on(async {
            let result = executor(&store).execute(&query).await.unwrap();
            assert_eq!(result.results["team"].items.len(), 3);
            // The venue budget is exhausted; its reachable id overflows.
            assert_eq!(result.results["venue"].items.len(), 0);
            assert_eq!(result.results["venue"].overflow.overflow_ids, vec!["v1"]);
        });
    }

    #[test]
    fn test_deep_target_joins_through_parent_step() {
        let store = seeded_store();
        let query = base_query(vec![EntityType::KeyMoment]);
        tokio_test::block_on(async {
            let result = executor(&store).execute(&query).await.unwrap();
            let moments = &result.results["keyMoment"];
            assert_eq!(moments.items.len(), 2);
            assert!(moments.overflow.overflow_ids.is_empty());
        });
    }

    #[test]
    fn test_unreachable_target_yields_empty_result() {
        let store = seeded_store();
        // The competition document has no sgos projection at all.
        let query = base_query(vec![EntityType::Sgo]);
        tokio_test::block_on(async {
            let result = executor(&store).execute(&query).await.unwrap();
            let sgos = &result.results["sgo"];
            assert!(sgos.items.is_empty());
            assert!(sgos.overflow.overflow_ids.is_empty());
        });
    }

    #[test]
    fn test_sort_orders() {
        let store = MemoryStore::new();
        let mut competition = materialised("competition", "C @ fifa", "c1");
        competition["teams"] = json!(["g2", "g1"]);
        let mut team1 = materialised("team", "t1 @ fifa", "g1");
        team1["lastUpdated"] = json!("2026-01-02T00:00:00+00:00");
        let team2 = materialised("team", "t2 @ fifa", "g2");
        store.seed(
            "materialisedAggregations",
            vec![competition, team1, team2],
        );

        tokio_test::block_on(async {
            let mut query = base_query(vec![EntityType::Team]);
            query.root_key = "C @ fifa".to_string();

            query.sort_by = SortBy::GamedayId;
            let result = executor(&store).execute(&query).await.unwrap();
            let ids: Vec<&str> = result.results["team"]
                .items
                .iter()
                .filter_map(|doc| str_field(doc, "gamedayId"))
                .collect();
            assert_eq!(ids, vec!["g1", "g2"]);

            query.sort_by = SortBy::LastUpdated;
            let result = executor(&store).execute(&query).await.unwrap();
            let ids: Vec<&str> = result.results["team"]
                .items
                .iter()
                .filter_map(|doc| str_field(doc, "gamedayId"))
                .collect();
            assert_eq!(ids, vec!["g1", "g2"]);

            query.sort_by = SortBy::InsertionOrder;
            let result = executor(&store).execute(&query).await.unwrap();
            let ids: Vec<&str> = result.results["team"]
                .items
                .iter()
                .filter_map(|doc| str_field(doc, "gamedayId"))
                .collect();
            assert_eq!(ids, vec!["g2", "g1"]);
        });
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let store = MemoryStore::new();
        let query = base_query(vec![EntityType::Team]);
        tokio_test::block_on(async {
            let err = executor(&store).execute(&query).await.unwrap_err();
            assert!(err.is_not_found());
        });
    }

    #[test]
    fn test_self_target_returns_root() {
        let store = seeded_store();
        let query = ListQuery {
            root_type: EntityType::Competition,
            root_key: "289175 @ fifa".to_string(),
            targets: vec![EntityType::Competition],
            limits: ListLimits::unbounded(),
            sort_by: SortBy::InsertionOrder,
            deadline: None,
        };
        tokio_test::block_on(async {
            let result = executor(&store).execute(&query).await.unwrap();
            let competitions = &result.results["competition"];
            assert_eq!(competitions.items.len(), 1);
            assert_eq!(
                str_field(&competitions.items[0], "gamedayId"),
                Some("c1")
            );
        });
    }

    #[test]
    fn test_sort_by_parsing() {
        assert_eq!("gamedayId".parse::<SortBy>().unwrap(), SortBy::GamedayId);
        assert_eq!("lastUpdated".parse::<SortBy>().unwrap(), SortBy::LastUpdated);
        assert!("random".parse::<SortBy>().is_err());
    }
}
