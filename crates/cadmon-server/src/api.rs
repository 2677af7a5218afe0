use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cadmon_alarm::engine::Engine;
use cadmon_common::types::{AlarmState, Sample, Severity, Transition};
use cadmon_metric::error::SeriesError;
use cadmon_notify::manager::NotificationManager;
use cadmon_storage::StateStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<Engine>>,
    pub store: Arc<StateStore>,
    pub notifier: Arc<NotificationManager>,
    pub start_time: DateTime<Utc>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/series/:name/buckets", post(append_bucket))
        .route("/v1/alarms", get(list_alarms))
        .route("/v1/composites", get(list_composites))
        .route("/v1/transitions", get(list_transitions))
        .route("/v1/health", get(health))
        .with_state(state)
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

fn series_error(err: SeriesError) -> ApiError {
    let status = match &err {
        SeriesError::DuplicateBucket { .. } => StatusCode::CONFLICT,
        SeriesError::UnknownSeries(_) => StatusCode::NOT_FOUND,
        SeriesError::OutOfOrderBucket { .. } | SeriesError::MisalignedBucket { .. } => {
            StatusCode::BAD_REQUEST
        }
    };
    ApiError {
        status,
        message: err.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct AppendRequest {
    bucket_start: DateTime<Utc>,
    /// Omitted or null means the collector explicitly reports the bucket
    /// as missing.
    #[serde(default)]
    count: Option<u64>,
}

#[derive(Debug, Serialize)]
struct AppendResponse {
    accepted: bool,
    transitions: Vec<Transition>,
}

async fn append_bucket(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<AppendRequest>,
) -> Result<Json<AppendResponse>, ApiError> {
    let sample = match req.count {
        Some(c) => Sample::Count(c),
        None => Sample::Missing,
    };

    // Evaluation is synchronous and allocation-light; the lock is held for
    // no I/O.
    let (transitions, alarm_snapshot) = {
        let mut engine = state
            .engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let transitions = engine
            .append(&name, req.bucket_start, sample)
            .map_err(series_error)?;
        let snapshot: Vec<(String, AlarmState, Option<DateTime<Utc>>)> = engine
            .alarms()
            .map(|a| (a.name().to_string(), a.state(), a.last_evaluated()))
            .collect();
        (transitions, snapshot)
    };

    if let Err(e) = state.store.record_bucket(&name, req.bucket_start, req.count) {
        tracing::error!(series = %name, error = %e, "failed to persist bucket");
    }
    for (alarm, alarm_state, at_bucket) in &alarm_snapshot {
        if let Err(e) = state
            .store
            .upsert_alarm_state(alarm, *alarm_state, *at_bucket)
        {
            tracing::error!(alarm = %alarm, error = %e, "failed to persist alarm state");
        }
    }
    for transition in &transitions {
        if let Err(e) = state.store.record_transition(transition) {
            tracing::error!(name = %transition.name(), error = %e, "failed to persist transition");
        }
    }

    // Delivery happens off the request path; the collector never waits on
    // a webhook.
    if !transitions.is_empty() {
        let notifier = state.notifier.clone();
        let to_send = transitions.clone();
        tokio::spawn(async move {
            for transition in &to_send {
                notifier.dispatch(transition).await;
            }
        });
    }

    Ok(Json(AppendResponse {
        accepted: true,
        transitions,
    }))
}

#[derive(Debug, Serialize)]
struct AlarmStatus {
    name: String,
    state: AlarmState,
    severity: Severity,
    expression: String,
    last_evaluated: Option<DateTime<Utc>>,
}

async fn list_alarms(State(state): State<AppState>) -> Json<Vec<AlarmStatus>> {
    let engine = state
        .engine
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let alarms = engine
        .alarms()
        .map(|a| AlarmStatus {
            name: a.name().to_string(),
            state: a.state(),
            severity: a.severity(),
            expression: a.rule.expression.clone(),
            last_evaluated: a.last_evaluated(),
        })
        .collect();
    Json(alarms)
}

#[derive(Debug, Serialize)]
struct CompositeStatus {
    name: String,
    state: AlarmState,
    severity: Severity,
    rule: String,
}

async fn list_composites(State(state): State<AppState>) -> Json<Vec<CompositeStatus>> {
    let engine = state
        .engine
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let composites = engine
        .composites()
        .map(|(def, composite_state)| CompositeStatus {
            name: def.name.clone(),
            state: composite_state,
            severity: def.severity,
            rule: def.rule_text.clone(),
        })
        .collect();
    Json(composites)
}

#[derive(Debug, Deserialize)]
struct TransitionQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    100
}

async fn list_transitions(
    State(state): State<AppState>,
    Query(query): Query<TransitionQuery>,
) -> Result<Json<Vec<Transition>>, ApiError> {
    let limit = query.limit.min(1000);
    let transitions = state
        .store
        .list_transitions(limit, query.offset)
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        })?;
    Ok(Json(transitions))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime_secs = (Utc::now() - state.start_time).num_seconds();
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": uptime_secs,
    }))
}
