use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use adflux_core::TimeSeriesPoint;

use crate::error::StoreError;

/// Dense per-second reconstructed points, unique on (campaign_id, ts).
///
/// Writes are insert-if-absent and therefore commutative and idempotent;
/// rerunning reconstruction over an overlapping window is safe.
#[async_trait]
pub trait PointStore: Send + Sync {
    /// Insert points, skipping any (campaign_id, ts) that already exists.
    /// Returns the number of rows actually inserted.
    async fn insert_batch(&self, points: &[TimeSeriesPoint]) -> Result<u64, StoreError>;

    /// Points in `[from, to]` ordered by `ts` ascending, capped at `limit`.
    async fn query_range(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TimeSeriesPoint>, StoreError>;

    /// The most recent point for a campaign. Doubles as the reconstruction
    /// cursor: the incremental window starts at this point's `ts`.
    async fn latest(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
    ) -> Result<Option<TimeSeriesPoint>, StoreError>;

    /// First point with `ts >= from`.
    async fn first_at_or_after(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Option<TimeSeriesPoint>, StoreError>;

    /// Last point with `ts <= to`.
    async fn last_at_or_before(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        to: DateTime<Utc>,
    ) -> Result<Option<TimeSeriesPoint>, StoreError>;
}
