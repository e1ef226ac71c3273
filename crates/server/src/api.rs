//! HTTP handlers. Thin adapters: parse/validate the request, call the sync
//! workflows or the analytics service, map domain errors to status codes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use adflux_core::{ObjectType, Resolution, SyncError};

use crate::state::AppState;
use crate::sync;

// ── Helpers ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

fn error_body(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    error_body(StatusCode::BAD_REQUEST, message)
}

fn not_found(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    error_body(StatusCode::NOT_FOUND, message)
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn sync_error(e: SyncError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        SyncError::Configuration(_) => StatusCode::CONFLICT,
        SyncError::Upstream(_) => StatusCode::BAD_GATEWAY,
        SyncError::DataIntegrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, e.to_string())
}

// ── Health & diagnostics ─────────────────────────────────────────

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

pub async fn scheduler_metrics(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.scheduler.metrics()))
}

pub async fn scheduler_failed(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.scheduler.failed_jobs()))
}

// ── Sync endpoints ───────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SyncStructureRequest {
    /// Overrides the vaulted ad account when set.
    pub ad_account_id: Option<String>,
}

pub async fn sync_structure(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<SyncStructureRequest>,
) -> ApiResult<Json<sync::StructureSyncReport>> {
    let report = sync::sync_structure(&state, tenant_id, request.ad_account_id.as_deref())
        .await
        .map_err(sync_error)?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncInsightsRequest {
    /// Restricts the sync to one campaign; otherwise all open campaigns.
    pub campaign_id: Option<String>,
}

pub async fn sync_insights(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<SyncInsightsRequest>,
) -> ApiResult<Json<sync::InsightSyncReport>> {
    let report = sync::sync_insights(&state, tenant_id, request.campaign_id.as_deref())
        .await
        .map_err(sync_error)?;
    Ok(Json(report))
}

// ── Analytics endpoints ──────────────────────────────────────────

fn default_limit() -> usize {
    1_000
}

#[derive(Debug, Deserialize)]
pub struct TimeSeriesQuery {
    pub campaign_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub async fn timeseries(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<TimeSeriesQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    if query.to < query.from {
        return Err(bad_request("to must not precede from"));
    }
    let points = state
        .analytics
        .get_time_series(
            tenant_id,
            &query.campaign_id,
            query.from,
            query.to,
            query.resolution,
            query.limit,
        )
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({
        "campaign_id": query.campaign_id,
        "resolution": query.resolution,
        "points": points,
    })))
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub campaign_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

pub async fn timeseries_with_structure(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Json<adflux_analytics::TimeSeriesWithStructure>> {
    if query.to < query.from {
        return Err(bad_request("to must not precede from"));
    }
    let joined = state
        .analytics
        .get_time_series_with_structure(tenant_id, &query.campaign_id, query.from, query.to)
        .await
        .map_err(internal_error)?;
    Ok(Json(joined))
}

pub async fn window_metrics(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Json<adflux_analytics::WindowMetrics>> {
    if query.to < query.from {
        return Err(bad_request("to must not precede from"));
    }
    let metrics = state
        .analytics
        .get_metrics_for_window(tenant_id, &query.campaign_id, query.from, query.to)
        .await
        .map_err(internal_error)?;
    match metrics {
        Some(metrics) => Ok(Json(metrics)),
        None => Err(not_found(format!(
            "no data for campaign {} in window",
            query.campaign_id
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    /// Defaults to now (the current version).
    pub ts: Option<DateTime<Utc>>,
}

pub async fn snapshot_at(
    State(state): State<Arc<AppState>>,
    Path((tenant_id, object_type, external_id)): Path<(Uuid, String, String)>,
    Query(query): Query<SnapshotQuery>,
) -> ApiResult<Json<adflux_core::StructureSnapshot>> {
    let object_type: ObjectType = object_type
        .parse()
        .map_err(|e: String| bad_request(e))?;
    let ts = query.ts.unwrap_or_else(Utc::now);
    let snapshot = state
        .analytics
        .get_structure_at_time(tenant_id, object_type, &external_id, ts)
        .await
        .map_err(internal_error)?;
    match snapshot {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(not_found(format!(
            "no {object_type} snapshot for {external_id} at {ts}"
        ))),
    }
}

pub async fn active_campaigns(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Vec<adflux_analytics::ActiveCampaign>>> {
    let campaigns = state
        .analytics
        .get_active_campaigns_with_metrics(tenant_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(campaigns))
}
