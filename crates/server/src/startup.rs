//! App assembly: stores (PostgreSQL or in-memory), provider client, vault,
//! scheduler wiring, and the graceful-shutdown signal.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use adflux_analytics::AnalyticsService;
use adflux_core::Config;
use adflux_provider::{HttpAdsClient, ProviderCredentials, StaticVault};
use adflux_reconstruct::Reconstructor;
use adflux_scheduler::{JobScheduler, SchedulerConfig};
use adflux_store::{
    InsightLedger, MemoryInsightLedger, MemoryPointStore, MemorySnapshotStore, PgInsightLedger,
    PgPointStore, PgSnapshotStore, PointStore, SnapshotStore,
};

use crate::db;
use crate::jobs;
use crate::state::AppState;

/// Build the fully wired application state: connect storage, seed the vault,
/// register queue handlers, install the repeating polls.
pub async fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let pg_pool = db::init_pg_pool(&config.postgres).await;

    let (snapshots, ledger, points): (
        Arc<dyn SnapshotStore>,
        Arc<dyn InsightLedger>,
        Arc<dyn PointStore>,
    ) = match &pg_pool {
        Some(pool) => (
            Arc::new(PgSnapshotStore::new(pool.clone())),
            Arc::new(PgInsightLedger::new(pool.clone())),
            Arc::new(PgPointStore::new(pool.clone())),
        ),
        None => (
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(MemoryInsightLedger::new()),
            Arc::new(MemoryPointStore::new()),
        ),
    };

    let vault = build_vault(&config);
    let ads_client = Arc::new(HttpAdsClient::new(
        config.provider.api_base.clone(),
        config.provider.api_version.clone(),
    ));

    let scheduler = JobScheduler::new(SchedulerConfig {
        retry: config.retry,
        ..SchedulerConfig::default()
    });

    let state = Arc::new(AppState {
        analytics: Arc::new(AnalyticsService::new(snapshots.clone(), points.clone())),
        reconstructor: Arc::new(Reconstructor::new(ledger.clone(), points.clone())),
        config,
        pg_pool,
        snapshots,
        ledger,
        points,
        ads_client,
        vault: Arc::new(vault),
        scheduler,
    });

    jobs::register_handlers(state.clone());
    jobs::install_polls(&state).await?;

    Ok(state)
}

/// Static vault seeded from the dev credentials in config. Empty when none
/// are set; no polls get installed then.
fn build_vault(config: &Config) -> StaticVault {
    let (Some(tenant), Some(token), Some(account)) = (
        config.provider.dev_tenant_id.as_deref(),
        config.provider.dev_access_token.as_deref(),
        config.provider.dev_account_id.as_deref(),
    ) else {
        warn!("no dev provider credentials configured — vault starts empty");
        return StaticVault::new();
    };

    match tenant.parse::<Uuid>() {
        Ok(tenant_id) => {
            info!(tenant_id = %tenant_id, "dev tenant connected");
            StaticVault::new().with_tenant(
                tenant_id,
                ProviderCredentials {
                    access_token: token.to_string(),
                    external_account_id: account.to_string(),
                },
            )
        }
        Err(_) => {
            warn!("ADS_DEV_TENANT_ID is not a UUID — vault starts empty");
            StaticVault::new()
        }
    }
}

/// Resolves on ctrl-c or SIGTERM, then stops the scheduler so no new job
/// occurrences fire during connection draining.
pub async fn shutdown_signal(scheduler: JobScheduler) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
    scheduler.shutdown();
}
