//! Queue handlers and repeating-poll installation.
//!
//! Three queues: `structure-poll` and `insight-poll` run per tenant on
//! repeating definitions; successful insight ingestion enqueues exactly one
//! `reconstruct` job per campaign, keyed so reconstructions of the same
//! campaign never overlap.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use adflux_core::{ObjectType, SyncError};
use adflux_scheduler::{Job, JobError};

use crate::state::AppState;
use crate::sync;

pub const STRUCTURE_QUEUE: &str = "structure-poll";
pub const INSIGHT_QUEUE: &str = "insight-poll";
pub const RECONSTRUCT_QUEUE: &str = "reconstruct";

pub fn structure_key(tenant_id: Uuid) -> String {
    format!("structure:{tenant_id}")
}

pub fn insights_key(tenant_id: Uuid) -> String {
    format!("insights:{tenant_id}")
}

pub fn reconstruct_key(tenant_id: Uuid, campaign_id: &str) -> String {
    format!("reconstruct:{tenant_id}:{campaign_id}")
}

fn payload_tenant(payload: &Value) -> Result<Uuid, JobError> {
    payload
        .get("tenant_id")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| JobError::Fatal("job payload missing tenant_id".into()))
}

fn payload_str<'a>(payload: &'a Value, key: &str) -> Result<&'a str, JobError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| JobError::Fatal(format!("job payload missing {key}")))
}

/// Register the consumers for all three queues.
pub fn register_handlers(state: Arc<AppState>) {
    let structure_state = state.clone();
    state.scheduler.process(STRUCTURE_QUEUE, move |job: Job| {
        let state = structure_state.clone();
        async move {
            let tenant_id = payload_tenant(&job.payload)?;
            let report = sync::sync_structure(&state, tenant_id, None)
                .await
                .map_err(JobError::from)?;
            for error in &report.errors {
                warn!(tenant_id = %tenant_id, error = %error, "structure poll partial failure");
            }
            Ok(())
        }
    });

    let insight_state = state.clone();
    state.scheduler.process(INSIGHT_QUEUE, move |job: Job| {
        let state = insight_state.clone();
        async move {
            let tenant_id = payload_tenant(&job.payload)?;
            let creds = sync::resolve_credentials(&state, tenant_id)
                .await
                .map_err(JobError::from)?;

            let targets = state
                .snapshots
                .list_open(tenant_id, ObjectType::Campaign, None)
                .await
                .map_err(|e| JobError::from(SyncError::from(e)))?;

            let mut failures = Vec::new();
            let mut successes = 0usize;
            for campaign in &targets {
                let campaign_id = campaign.external_object_id.as_str();
                match sync::ingest_one(&state, tenant_id, &creds, campaign_id).await {
                    Ok(record) => {
                        successes += 1;
                        state.scheduler.enqueue_once_keyed(
                            RECONSTRUCT_QUEUE,
                            &reconstruct_key(tenant_id, campaign_id),
                            json!({
                                "tenant_id": tenant_id.to_string(),
                                "campaign_id": campaign_id,
                                "insight_id": record.id.to_string(),
                            }),
                        );
                    }
                    Err(e) => {
                        warn!(tenant_id = %tenant_id, campaign_id = %campaign_id, error = %e, "insight poll failed for campaign");
                        failures.push(format!("{campaign_id}: {e}"));
                    }
                }
            }

            // Partial failure is not a job failure: siblings got their data
            // and the next tick retries the rest. Only a fully failed poll
            // goes through the retry policy.
            if successes == 0 && !failures.is_empty() {
                return Err(JobError::Retryable(failures.join("; ")));
            }
            Ok(())
        }
    });

    let reconstruct_state = state.clone();
    state.scheduler.process(RECONSTRUCT_QUEUE, move |job: Job| {
        let state = reconstruct_state.clone();
        async move {
            let tenant_id = payload_tenant(&job.payload)?;
            let campaign_id = payload_str(&job.payload, "campaign_id")?;
            let summary = state
                .reconstructor
                .reconstruct_incremental(tenant_id, campaign_id)
                .await
                .map_err(|e| JobError::from(SyncError::from(e)))?;
            info!(
                tenant_id = %tenant_id,
                campaign_id = %campaign_id,
                points_created = summary.points_created,
                "reconstruction job complete"
            );
            Ok(())
        }
    });
}

/// Install the repeating structure and insight polls for every connected
/// tenant, each at its per-tenant interval (falling back to the process
/// defaults). Returns the number of tenants wired up.
pub async fn install_polls(state: &Arc<AppState>) -> Result<usize, SyncError> {
    let tenants = state.vault.connected_tenants().await?;
    for tenant_id in &tenants {
        let polling = &state.config.polling;
        let payload = json!({"tenant_id": tenant_id.to_string()});
        state.scheduler.schedule_repeating(
            STRUCTURE_QUEUE,
            &structure_key(*tenant_id),
            Duration::from_millis(polling.structure_interval_for(*tenant_id)),
            payload.clone(),
        );
        state.scheduler.schedule_repeating(
            INSIGHT_QUEUE,
            &insights_key(*tenant_id),
            Duration::from_millis(polling.insights_interval_for(*tenant_id)),
            payload,
        );
    }
    info!(tenants = tenants.len(), "repeating polls installed");
    Ok(tenants.len())
}
