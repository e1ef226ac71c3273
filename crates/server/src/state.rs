use std::sync::Arc;

use sqlx::PgPool;

use adflux_analytics::AnalyticsService;
use adflux_core::Config;
use adflux_provider::{AdsApiClient, CredentialVault};
use adflux_reconstruct::Reconstructor;
use adflux_scheduler::JobScheduler;
use adflux_store::{InsightLedger, PointStore, SnapshotStore};

pub struct AppState {
    pub config: Config,
    /// None when PostgreSQL is not configured (in-memory dev mode).
    pub pg_pool: Option<PgPool>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub ledger: Arc<dyn InsightLedger>,
    pub points: Arc<dyn PointStore>,
    pub analytics: Arc<AnalyticsService>,
    pub reconstructor: Arc<Reconstructor>,
    pub ads_client: Arc<dyn AdsApiClient>,
    pub vault: Arc<dyn CredentialVault>,
    pub scheduler: JobScheduler,
}
