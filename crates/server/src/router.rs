//! HTTP router construction.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/scheduler/metrics", get(api::scheduler_metrics))
        .route("/scheduler/failed", get(api::scheduler_failed))
        .route(
            "/tenants/{tenant_id}/sync/structure",
            post(api::sync_structure),
        )
        .route(
            "/tenants/{tenant_id}/sync/insights",
            post(api::sync_insights),
        )
        .route("/tenants/{tenant_id}/timeseries", get(api::timeseries))
        .route(
            "/tenants/{tenant_id}/timeseries/structure",
            get(api::timeseries_with_structure),
        )
        .route("/tenants/{tenant_id}/metrics", get(api::window_metrics))
        .route(
            "/tenants/{tenant_id}/snapshots/{object_type}/{external_id}",
            get(api::snapshot_at),
        )
        .route(
            "/tenants/{tenant_id}/campaigns/active",
            get(api::active_campaigns),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
