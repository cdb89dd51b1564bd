// Copyright 2025 Cowboy AI, LLC.

//! Edge graph and traversal planning
//!
//! The materialised projection fields form a directed edge graph over
//! entity types. Given a root type and a set of target types, the
//! planner runs one breadth-first search from the root (neighbours
//! visited in projection-field order, so plans are deterministic) and
//! prefix-merges the per-target shortest paths into a deduplicated step
//! plan: identical hops at identical depth collapse to one step.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::entities::EntityType;
use crate::errors::{AggregationError, AggregationResult};
use crate::facets::projection_targets;

/// One edge traversal: a projection field read off documents of the
/// `from` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    /// Type whose documents carry the field
    pub from: EntityType,
    /// Projection field holding the next hop's ids
    pub field: &'static str,
    /// Type the field's ids belong to
    pub to: EntityType,
}

impl Hop {
    fn key(&self) -> String {
        format!("{}.{}->{}", self.from, self.field, self.to)
    }
}

/// A deduplicated hop at a fixed depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStep {
    /// Distance from the root; a depth-0 step reads the root document
    pub depth: usize,
    /// The hop this step evaluates
    pub hop: Hop,
}

/// The merged evaluation plan for one list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    /// Root type the plan starts from
    pub root: EntityType,
    /// Steps in ascending depth, hop-key ordered within a depth
    pub steps: Vec<PlanStep>,
    /// Terminal step index per target; `None` marks a self-target whose
    /// path is empty
    pub terminals: BTreeMap<EntityType, Option<usize>>,
}

impl StepPlan {
    /// The index of the step producing ids of the given type, if any.
    pub fn step_producing(&self, entity_type: EntityType) -> Option<usize> {
        self.steps
            .iter()
            .position(|step| step.hop.to == entity_type)
    }
}

/// Compute the step plan covering every target from the root.
///
/// Paths are shortest in hop count; ties break on projection-field name
/// so repeated plans are identical. An empty target set is rejected; an
/// unreachable target reports the missing path.
pub fn plan(root: EntityType, targets: &[EntityType]) -> AggregationResult<StepPlan> {
    if targets.is_empty() {
        return Err(AggregationError::InvalidInput {
            reason: "at least one target type is required".to_string(),
        });
    }

    // One deterministic BFS tree serves every target: each type is
    // entered once, so every per-target shortest path shares the tree's
    // prefixes by construction.
    let mut parent: HashMap<EntityType, (EntityType, &'static str)> = HashMap::new();
    let mut depth: HashMap<EntityType, usize> = HashMap::new();
    depth.insert(root, 0);
    let mut queue = VecDeque::from([root]);
    while let Some(current) = queue.pop_front() {
        let mut neighbours: Vec<EntityType> = projection_targets(current).to_vec();
        neighbours.sort_by_key(|t| t.ids_field());
        for neighbour in neighbours {
            if neighbour != root && !depth.contains_key(&neighbour) {
                depth.insert(neighbour, depth[&current] + 1);
                parent.insert(neighbour, (current, neighbour.ids_field()));
                queue.push_back(neighbour);
            }
        }
    }

    let mut merged: BTreeMap<(usize, String), Hop> = BTreeMap::new();
    let mut terminal_hops: BTreeMap<EntityType, Option<(usize, Hop)>> = BTreeMap::new();
    for &target in targets {
        if target == root {
            terminal_hops.insert(target, None);
            continue;
        }
        if !depth.contains_key(&target) {
            return Err(AggregationError::no_path(root.api_name(), target.api_name()));
        }
        let mut hops: Vec<Hop> = Vec::new();
        let mut cursor = target;
        while cursor != root {
            let (from, field) = parent[&cursor];
            hops.push(Hop {
                from,
                field,
                to: cursor,
            });
            cursor = from;
        }
        hops.reverse();
        for (hop_depth, hop) in hops.iter().enumerate() {
            merged.insert((hop_depth, hop.key()), *hop);
        }
        let last = hops[hops.len() - 1];
        terminal_hops.insert(target, Some((hops.len() - 1, last)));
    }

    let steps: Vec<PlanStep> = merged
        .into_iter()
        .map(|((step_depth, _), hop)| PlanStep {
            depth: step_depth,
            hop,
        })
        .collect();

    let mut terminals = BTreeMap::new();
    for (target, terminal) in terminal_hops {
        let index = terminal.map(|(step_depth, hop)| {
            steps
                .iter()
                .position(|step| step.depth == step_depth && step.hop == hop)
                .expect("terminal hop present in merged steps")
        });
        terminals.insert(target, index);
    }

    Ok(StepPlan {
        root,
        steps,
        terminals,
    })
}
