// Copyright 2025 Cowboy AI, LLC.

//! # Gameday Aggregations
//!
//! Materialised aggregation documents over a document store of
//! normalised sports-domain entities, and a graph-traversal query engine
//! over the materialised graph.
//!
//! For every source entity the service maintains one materialised
//! document summarising its reachable neighbours as two parallel
//! projections: an ordered collection of stable local ids (for fast
//! joins) and a map of composite external keys to those ids (for
//! cross-source correlation).
//!
//! ## Building blocks
//!
//! - **Key codec** ([`keys`]): deterministic composite external keys with
//!   typed separators
//! - **Facet library** ([`facets`]): one relationship resolver per
//!   `(entity, edge)`, producing `{ids, keys}`
//! - **Pipeline assembler** ([`pipeline`]): compose the facets of a type
//!   into one idempotent upsert
//! - **Processor** ([`processor`]): orchestrate probe, snapshots, build
//!   and reconciliation
//! - **Reference reconciler** ([`reconciler`]): keep reciprocal
//!   references across peers consistent, eventually
//! - **Traversal planner** ([`planner`]): shortest-path step plans over
//!   the projection edge graph
//! - **List query executor** ([`query`]): bounded neighbour lists with
//!   per-target overflow
//! - **Adapters** ([`store`], [`http`], [`config`], [`fetch`]): the
//!   store contract, the HTTP surface and configuration
//!
//! ## Consistency
//!
//! Reciprocity across materialised documents is eventual: builds are
//! idempotent and re-runnable, and concurrent builds commute per peer.
//! `lastUpdated` is monotonically non-decreasing per document as long as
//! the server clock is.

#![warn(missing_docs)]

pub mod config;
pub mod documents;
pub mod entities;
pub mod errors;
pub mod facets;
pub mod fetch;
pub mod http;
pub mod keys;
pub mod pipeline;
pub mod planner;
pub mod processor;
pub mod query;
pub mod reconciler;
pub mod store;

// Re-export core types
pub use config::ServiceConfig;
pub use documents::{ExternalRef, MaterialisedAggregation, Projection};
pub use entities::EntityType;
pub use errors::{AggregationError, AggregationResult};
pub use fetch::SingleFetch;
pub use keys::{decode_key, encode_entity_key, DecodedKey, KeyError, RankingContext, StaffRole};
pub use pipeline::PipelineAssembler;
pub use planner::{plan, Hop, PlanStep, StepPlan};
pub use processor::{BuildReport, BuildRequest, BuildState, Processor};
pub use query::{ListLimits, ListQuery, ListQueryExecutor, ListResult, SortBy};
pub use reconciler::{ReconcileSummary, Reconciler};
pub use store::{ensure_indexes, Filter, MemoryStore, Store, StoreError};
