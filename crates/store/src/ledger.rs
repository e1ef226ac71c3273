use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use adflux_core::RawInsightRecord;

use crate::error::StoreError;

/// Append-only store of fetched performance payloads.
///
/// No deduplication on ingest: repeated polls are expected and harmless
/// because reconstruction only looks at consecutive pairs, and an
/// adjacent-identical pair produces a zero-length interval.
#[async_trait]
pub trait InsightLedger: Send + Sync {
    /// Unconditional append with `fetched_at = now`.
    async fn ingest(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        payload: &Value,
    ) -> Result<RawInsightRecord, StoreError>;

    /// Records in `[from, to]`, ordered by `fetched_at` ascending.
    async fn query(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawInsightRecord>, StoreError>;
}
