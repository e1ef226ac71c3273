//! The two ingestion workflows: structure sync (SCD2 change detection over
//! campaigns/ad sets/ads) and insight sync (ledger append plus incremental
//! reconstruction).
//!
//! Both are partial-success: a failing object or campaign is recorded in the
//! report and its siblings continue. Only a vault miss or a total provider
//! failure fails the whole call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use adflux_core::{ObjectType, SyncError};
use adflux_provider::ProviderCredentials;
use adflux_reconstruct::ReconstructionSummary;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LevelCounts {
    pub total: u64,
    pub created: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct StructureSyncReport {
    pub campaigns: LevelCounts,
    pub ad_sets: LevelCounts,
    pub ads: LevelCounts,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CampaignInsightOutcome {
    pub campaign_id: String,
    pub insight_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    pub reconstruction: ReconstructionSummary,
}

#[derive(Debug, Default, Serialize)]
pub struct InsightSyncReport {
    pub campaigns: Vec<CampaignInsightOutcome>,
    pub errors: Vec<String>,
}

/// Vault lookup; a tenant without a provider connection is a configuration
/// error and fails the caller immediately.
pub async fn resolve_credentials(
    state: &AppState,
    tenant_id: Uuid,
) -> Result<ProviderCredentials, SyncError> {
    state
        .vault
        .get_decrypted_secrets(tenant_id)
        .await?
        .ok_or_else(|| {
            SyncError::Configuration(format!("tenant {tenant_id} has no provider connection"))
        })
}

/// Fetch the account's campaigns and, per campaign, its ad sets and ads,
/// running each object through snapshot change detection.
pub async fn sync_structure(
    state: &AppState,
    tenant_id: Uuid,
    ad_account_override: Option<&str>,
) -> Result<StructureSyncReport, SyncError> {
    let mut creds = resolve_credentials(state, tenant_id).await?;
    if let Some(account) = ad_account_override {
        creds.external_account_id = account.to_string();
    }

    let campaigns = state.ads_client.fetch_structure(&creds).await?;
    let mut report = StructureSyncReport::default();

    for campaign in &campaigns {
        let Some(campaign_id) = campaign.get("id").and_then(Value::as_str) else {
            report.errors.push("campaign object without id".into());
            continue;
        };
        report.campaigns.total += 1;
        match state
            .snapshots
            .create_if_changed(tenant_id, ObjectType::Campaign, campaign_id, campaign)
            .await
        {
            Ok(outcome) if outcome.created => report.campaigns.created += 1,
            Ok(_) => {}
            Err(e) => {
                report.errors.push(format!("campaign {campaign_id}: {e}"));
                continue;
            }
        }

        match state.ads_client.fetch_ad_sets(&creds, campaign_id).await {
            Ok(ad_sets) => {
                upsert_level(state, tenant_id, ObjectType::AdSet, &ad_sets, &mut report).await;
            }
            Err(e) => report
                .errors
                .push(format!("ad sets of {campaign_id}: {e}")),
        }
        match state.ads_client.fetch_ads(&creds, campaign_id).await {
            Ok(ads) => {
                upsert_level(state, tenant_id, ObjectType::Ad, &ads, &mut report).await;
            }
            Err(e) => report.errors.push(format!("ads of {campaign_id}: {e}")),
        }
    }

    info!(
        tenant_id = %tenant_id,
        campaigns = report.campaigns.total,
        created = report.campaigns.created + report.ad_sets.created + report.ads.created,
        errors = report.errors.len(),
        "structure sync complete"
    );
    Ok(report)
}

async fn upsert_level(
    state: &AppState,
    tenant_id: Uuid,
    object_type: ObjectType,
    objects: &[Value],
    report: &mut StructureSyncReport,
) {
    let mut counts = LevelCounts::default();
    for object in objects {
        let Some(external_id) = object.get("id").and_then(Value::as_str) else {
            report
                .errors
                .push(format!("{object_type} object without id"));
            continue;
        };
        counts.total += 1;
        match state
            .snapshots
            .create_if_changed(tenant_id, object_type, external_id, object)
            .await
        {
            Ok(outcome) if outcome.created => counts.created += 1,
            Ok(_) => {}
            Err(e) => report
                .errors
                .push(format!("{object_type} {external_id}: {e}")),
        }
    }
    let level = match object_type {
        ObjectType::Campaign => &mut report.campaigns,
        ObjectType::AdSet => &mut report.ad_sets,
        ObjectType::Ad => &mut report.ads,
    };
    level.total += counts.total;
    level.created += counts.created;
}

/// Fetch and append one campaign's current insight payload.
pub async fn ingest_one(
    state: &AppState,
    tenant_id: Uuid,
    creds: &ProviderCredentials,
    campaign_id: &str,
) -> Result<adflux_core::RawInsightRecord, SyncError> {
    let payload = state
        .ads_client
        .fetch_daily_insights(creds, campaign_id)
        .await?;
    let record = state
        .ledger
        .ingest(tenant_id, campaign_id, &payload)
        .await
        .map_err(SyncError::from)?;
    Ok(record)
}

/// Insight sync with inline reconstruction, used by the sync-now endpoint.
/// With no campaign named, every open campaign of the tenant is synced.
pub async fn sync_insights(
    state: &AppState,
    tenant_id: Uuid,
    campaign_id: Option<&str>,
) -> Result<InsightSyncReport, SyncError> {
    let creds = resolve_credentials(state, tenant_id).await?;

    let targets: Vec<String> = match campaign_id {
        Some(id) => vec![id.to_string()],
        None => state
            .snapshots
            .list_open(tenant_id, ObjectType::Campaign, None)
            .await
            .map_err(SyncError::from)?
            .into_iter()
            .map(|s| s.external_object_id)
            .collect(),
    };

    let mut report = InsightSyncReport::default();
    for campaign in &targets {
        let record = match ingest_one(state, tenant_id, &creds, campaign).await {
            Ok(record) => record,
            Err(e) => {
                warn!(tenant_id = %tenant_id, campaign_id = %campaign, error = %e, "insight sync failed for campaign");
                report.errors.push(format!("{campaign}: {e}"));
                continue;
            }
        };
        let reconstruction = match state
            .reconstructor
            .reconstruct_incremental(tenant_id, campaign)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                report
                    .errors
                    .push(format!("{campaign}: reconstruction: {e}"));
                continue;
            }
        };
        report.campaigns.push(CampaignInsightOutcome {
            campaign_id: campaign.clone(),
            insight_id: record.id,
            fetched_at: record.fetched_at,
            reconstruction,
        });
    }

    info!(
        tenant_id = %tenant_id,
        campaigns = report.campaigns.len(),
        errors = report.errors.len(),
        "insight sync complete"
    );
    Ok(report)
}
