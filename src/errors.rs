// Copyright 2025 Cowboy AI, LLC.

//! Error types for aggregation operations
//!
//! Every failure the service can surface carries a stable string code and
//! a derived HTTP status. The core never retries; callers apply retry
//! policy above this layer.

use thiserror::Error;

use crate::entities::EntityType;
use crate::keys::KeyError;
use crate::store::StoreError;

/// Errors that can occur while building or querying materialised
/// aggregations.
#[derive(Debug, Clone, Error)]
pub enum AggregationError {
    /// Request input failed validation
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Why the input is invalid
        reason: String,
    },

    /// The addressed source document does not exist
    #[error("{entity_type} not found: {selector}")]
    NotFound {
        /// Entity type that was probed
        entity_type: EntityType,
        /// Human-readable selector that matched nothing
        selector: String,
    },

    /// A store call failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A composite key could not be decoded
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// The edge graph has no path between two types
    #[error("no traversal path from {from} to {to}")]
    NoPath {
        /// Root type name
        from: String,
        /// Target type name
        to: String,
    },

    /// The source passed the existence probe but the build produced no
    /// materialised document; probable data shape mismatch
    #[error("materialised document missing after build: {resource_type} {external_key}")]
    PostUpsertMissing {
        /// Lower-case resource type
        resource_type: String,
        /// Composite external key of the build
        external_key: String,
    },

    /// A deadline elapsed before the operation completed
    #[error("deadline exceeded")]
    Timeout,
}

/// Result type for aggregation operations
pub type AggregationResult<T> = Result<T, AggregationError>;

impl AggregationError {
    /// Build a `NoPath` error from type names.
    pub fn no_path(from: &str, to: &str) -> Self {
        AggregationError::NoPath {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// The stable string code for this error.
    pub fn code(&self) -> String {
        match self {
            AggregationError::InvalidInput { .. } => "InvalidInput".to_string(),
            AggregationError::NotFound { .. } => "NotFound".to_string(),
            AggregationError::Store(_) => "StoreUnavailable".to_string(),
            AggregationError::Key(_) => "MalformedKey".to_string(),
            AggregationError::NoPath { from, to } => {
                format!("NoPathFrom{}To{}", upper_camel(from), upper_camel(to))
            }
            AggregationError::PostUpsertMissing { .. } => "PostUpsertMissing".to_string(),
            AggregationError::Timeout => "Timeout".to_string(),
        }
    }

    /// The HTTP status derived from this error.
    pub fn http_status(&self) -> u16 {
        match self {
            AggregationError::InvalidInput { .. } | AggregationError::NoPath { .. } => 400,
            AggregationError::NotFound { .. } => 404,
            AggregationError::Store(_)
            | AggregationError::Key(_)
            | AggregationError::PostUpsertMissing { .. } => 500,
            AggregationError::Timeout => 504,
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AggregationError::NotFound { .. })
    }
}

fn upper_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
