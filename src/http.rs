// Copyright 2025 Cowboy AI, LLC.

//! HTTP adapter
//!
//! Thin translation of the service routes onto the core APIs: build,
//! list query, single fetch with legacy inline traversals, runtime log
//! level and liveness. Handlers parse path and body inputs, call one
//! core operation and map its error onto the derived status.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::entities::EntityType;
use crate::errors::AggregationError;
use crate::fetch::SingleFetch;
use crate::keys::{encode_entity_key, StaffRole};
use crate::processor::{BuildReport, BuildRequest, Processor};
use crate::query::{ListLimits, ListQuery, ListQueryExecutor, SortBy};
use crate::store::Store;

/// Callback switching the subscriber's level filter at runtime.
#[derive(Clone)]
pub struct LogLevelHandle {
    inner: Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>,
}

impl LogLevelHandle {
    /// Wrap a reload callback.
    pub fn new(reload: impl Fn(&str) -> Result<(), String> + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(reload),
        }
    }

    /// A handle that accepts every level and changes nothing.
    pub fn noop() -> Self {
        Self::new(|_| Ok(()))
    }

    /// Switch the filter to the given level.
    pub fn set(&self, level: &str) -> Result<(), String> {
        (self.inner)(level)
    }
}

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    processor: Arc<Processor>,
    executor: Arc<ListQueryExecutor>,
    fetcher: Arc<SingleFetch>,
    log_level: LogLevelHandle,
    service_name: String,
}

impl AppState {
    /// Wire the core components over a store.
    pub fn new(store: Arc<dyn Store>, config: &ServiceConfig, log_level: LogLevelHandle) -> Self {
        Self {
            processor: Arc::new(Processor::new(
                store.clone(),
                config.materialised_collection.clone(),
            )),
            executor: Arc::new(ListQueryExecutor::new(
                store.clone(),
                config.materialised_collection.clone(),
            )),
            fetcher: Arc::new(SingleFetch::new(store)),
            log_level,
            service_name: config.service_name.clone(),
        }
    }
}

/// The service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/aggregate/:entity_type/:scope/:id", post(build_entity))
        .route(
            "/aggregate/staff/sp/:sp_scope/:sp_id/:role/:org_scope/:org_id",
            post(build_staff),
        )
        .route(
            "/aggregate/km/:event_scope/:event_id/:kind/:sub_kind/:date_time",
            post(build_key_moment),
        )
        .route(
            "/aggregate/rankings/:lead_type/:lead_scope/:lead_id/:participant_type/:participant_scope/:participant_id/:date_time/:position",
            post(build_ranking),
        )
        .route("/list/:root_type/:root_key", post(list))
        .route("/log/:level", post(set_log_level))
        .route("/:entity_type/:scope/:id", get(fetch_entity))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// An error response carrying the stable code and derived status.
pub struct ApiError(AggregationError);

impl From<AggregationError> for ApiError {
    fn from(err: AggregationError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "request failed");
        }
        (
            status,
            Json(json!({"error": self.0.code(), "message": self.0.to_string()})),
        )
            .into_response()
    }
}

async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"status": "ok", "service": state.service_name}))
}

async fn set_log_level(
    State(state): State<AppState>,
    Path(level): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if level != "debug" && level != "info" {
        return Err(AggregationError::InvalidInput {
            reason: format!("unsupported log level: {level}"),
        }
        .into());
    }
    state
        .log_level
        .set(&level)
        .map_err(|reason| AggregationError::InvalidInput { reason })?;
    tracing::info!(level, "log level switched");
    Ok(Json(json!({"level": level})))
}

async fn build_entity(
    State(state): State<AppState>,
    Path((entity_type, scope, id)): Path<(String, String, String)>,
) -> Result<Json<Value>, ApiError> {
    let entity_type: EntityType = entity_type.parse()?;
    run_build(
        &state,
        BuildRequest::Entity {
            entity_type,
            scope,
            id,
        },
    )
    .await
}

async fn build_staff(
    State(state): State<AppState>,
    Path((sp_scope, sp_id, role, org_scope, org_id)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Result<Json<Value>, ApiError> {
    let role: StaffRole = role.parse().map_err(AggregationError::from)?;
    run_build(
        &state,
        BuildRequest::Staff {
            sp_scope,
            sp_id,
            role,
            org_scope,
            org_id,
        },
    )
    .await
}

async fn build_key_moment(
    State(state): State<AppState>,
    Path((event_scope, event_id, kind, sub_kind, date_time)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Result<Json<Value>, ApiError> {
    run_build(
        &state,
        BuildRequest::KeyMoment {
            event_scope,
            event_id,
            kind,
            sub_kind,
            date_time,
        },
    )
    .await
}

#[allow(clippy::type_complexity)]
async fn build_ranking(
    State(state): State<AppState>,
    Path((lead_type, lead_scope, lead_id, participant_type, participant_scope, participant_id, date_time, position)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Result<Json<Value>, ApiError> {
    let lead_type: EntityType = lead_type.parse()?;
    let participant_type = parse_participant_type(&participant_type)?;
    let position: i64 = position
        .parse()
        .map_err(|_| AggregationError::InvalidInput {
            reason: format!("position must be a decimal integer, got {position}"),
        })?;
    run_build(
        &state,
        BuildRequest::Ranking {
            lead_type,
            lead_scope,
            lead_id,
            participant_type,
            participant_scope,
            participant_id,
            date_time,
            position,
        },
    )
    .await
}

async fn run_build(state: &AppState, request: BuildRequest) -> Result<Json<Value>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("http_build", %request_id);
    let report = state.processor.build(request, None).instrument(span).await?;
    Ok(Json(report_body(&report)))
}

fn report_body(report: &BuildReport) -> Value {
    let mut body = json!({
        "state": report.state,
        "document": report.document.to_document(),
        "reconcile": {
            "attempted": report.reconcile.attempted,
            "applied": report.reconcile.applied,
            "failed": report.reconcile.failed,
            "repaired": report.reconcile.repaired,
        }
    });
    if let Some(warning) = &report.reconcile.warning {
        body["warning"] = json!(warning);
    }
    if report.partial {
        body["partial"] = json!(true);
    }
    body
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListBody {
    targets: Vec<String>,
    #[serde(default)]
    total_max: Option<usize>,
    #[serde(default)]
    per_type_max: HashMap<String, usize>,
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default)]
    deadline_ms: Option<u64>,
}

async fn list(
    State(state): State<AppState>,
    Path((root_type, root_key)): Path<(String, String)>,
    Json(body): Json<ListBody>,
) -> Result<Json<Value>, ApiError> {
    let root_type: EntityType = root_type.parse()?;

    let mut targets = Vec::new();
    for name in &body.targets {
        let target: EntityType = name
            .parse()
            .map_err(|_| AggregationError::no_path(root_type.api_name(), name))?;
        targets.push(target);
    }

    let mut per_type = HashMap::new();
    for (name, limit) in &body.per_type_max {
        let target: EntityType = name.parse()?;
        per_type.insert(target, *limit);
    }

    let sort_by = match &body.sort_by {
        Some(name) => name.parse::<SortBy>()?,
        None => SortBy::default(),
    };

    let query = ListQuery {
        root_type,
        root_key,
        targets,
        limits: ListLimits {
            total_max: body.total_max,
            per_type,
        },
        sort_by,
        deadline: body.deadline_ms.map(Duration::from_millis),
    };
    let result = state.executor.execute(&query).await?;
    let value = serde_json::to_value(&result).map_err(|e| AggregationError::InvalidInput {
        reason: e.to_string(),
    })?;
    Ok(Json(value))
}

#[derive(Debug, Default, Deserialize)]
struct FetchParams {
    aggregation: Option<String>,
}

fn parse_participant_type(name: &str) -> Result<EntityType, AggregationError> {
    if name.eq_ignore_ascii_case("sp") {
        return Ok(EntityType::SportsPerson);
    }
    name.parse()
}

/// The one-hop traversal behind each legacy aggregation code.
fn legacy_target(code: &str) -> Option<EntityType> {
    match code {
        "cs" => Some(EntityType::Stage),
        "se" => Some(EntityType::Event),
        "ev" => Some(EntityType::Venue),
        "ekm" => Some(EntityType::KeyMoment),
        _ => None,
    }
}

async fn fetch_entity(
    State(state): State<AppState>,
    Path((entity_type, scope, id)): Path<(String, String, String)>,
    Query(params): Query<FetchParams>,
) -> Result<Json<Value>, ApiError> {
    let entity_type: EntityType = entity_type.parse()?;
    let mut document = state.fetcher.by_external(entity_type, &scope, &id).await?;

    if let Some(codes) = &params.aggregation {
        let mut aggregations = serde_json::Map::new();
        for code in codes.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let target = legacy_target(code).ok_or_else(|| AggregationError::InvalidInput {
                reason: format!("unknown aggregation: {code}"),
            })?;
            let query = ListQuery {
                root_type: entity_type,
                root_key: encode_entity_key(&id, &scope),
                targets: vec![target],
                limits: ListLimits::unbounded(),
                sort_by: SortBy::InsertionOrder,
                deadline: None,
            };
            let merged = match state.executor.execute(&query).await {
                Ok(result) => result
                    .results
                    .get(target.api_name())
                    .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
                    .unwrap_or(Value::Null),
                // No materialised root yet: the traversal has nothing to
                // walk, the fetch itself still succeeds.
                Err(err) if err.is_not_found() => json!({"items": [], "overflow": Value::Null}),
                Err(err) => return Err(err.into()),
            };
            aggregations.insert(code.to_string(), merged);
        }
        if let Some(obj) = document.as_object_mut() {
            obj.insert("aggregations".to_string(), Value::Object(aggregations));
        }
    }

    Ok(Json(document))
}
