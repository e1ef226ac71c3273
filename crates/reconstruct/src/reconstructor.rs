//! Drives reconstruction: reads the raw ledger, interpolates each adjacent
//! pair, and persists points in fixed-size insert-if-absent batches.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use adflux_core::{floor_to_second, TimeSeriesPoint};
use adflux_store::{InsightLedger, PointStore, StoreError};

use crate::extract::extract_metrics;
use crate::interpolate::{interpolate_pair, AnchorSample};

/// Default rows per insert batch. Bounds peak memory when a long gap
/// between polls synthesizes hundreds of thousands of points.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

#[derive(Debug, Clone, Serialize)]
pub struct ReconstructionSummary {
    pub points_created: u64,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub struct Reconstructor {
    ledger: Arc<dyn InsightLedger>,
    points: Arc<dyn PointStore>,
    batch_size: usize,
}

impl Reconstructor {
    pub fn new(ledger: Arc<dyn InsightLedger>, points: Arc<dyn PointStore>) -> Self {
        Self {
            ledger,
            points,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Reconstruct all pairs whose records fall in `[from, to]`.
    ///
    /// Rerunning over an overlapping window is idempotent: every write is
    /// insert-if-absent keyed by (campaign_id, ts).
    pub async fn reconstruct_range(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ReconstructionSummary, StoreError> {
        let records = self.ledger.query(tenant_id, campaign_id, from, to).await?;

        // Extraction failures stay in place as gaps: a bad record voids both
        // pairs it touches instead of letting its neighbors bridge over it.
        let samples: Vec<Option<AnchorSample>> = records
            .iter()
            .map(|r| match extract_metrics(&r.payload) {
                Some(metrics) => Some(AnchorSample {
                    record_id: r.id,
                    at: r.fetched_at,
                    metrics,
                }),
                None => {
                    warn!(
                        insight_id = %r.id,
                        campaign_id = %campaign_id,
                        "insight payload missing expected structure — record skipped"
                    );
                    None
                }
            })
            .collect();

        let mut created = 0u64;
        let mut window_from: Option<DateTime<Utc>> = None;
        let mut window_to: Option<DateTime<Utc>> = None;
        let mut buf: Vec<TimeSeriesPoint> = Vec::with_capacity(self.batch_size);

        for pair in samples.windows(2) {
            let (Some(first), Some(second)) = (&pair[0], &pair[1]) else {
                continue;
            };

            for point in interpolate_pair(tenant_id, campaign_id, first, second) {
                if window_from.is_none() {
                    window_from = Some(point.ts);
                }
                window_to = Some(point.ts);
                buf.push(point);
                if buf.len() >= self.batch_size {
                    created += self.points.insert_batch(&buf).await?;
                    buf.clear();
                }
            }
        }

        if !buf.is_empty() {
            created += self.points.insert_batch(&buf).await?;
        }

        debug!(
            campaign_id = %campaign_id,
            points_created = created,
            records = records.len(),
            "reconstruction pass complete"
        );

        Ok(ReconstructionSummary {
            points_created: created,
            from: window_from,
            to: window_to,
        })
    }

    /// Incremental mode: re-derive the window as `[latest persisted ts, now]`
    /// so the record behind the latest point is re-used as the anchor. The
    /// anchor's collision with the already-persisted row is absorbed by the
    /// insert-if-absent write.
    pub async fn reconstruct_incremental(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
    ) -> Result<ReconstructionSummary, StoreError> {
        let from = match self.points.latest(tenant_id, campaign_id).await? {
            Some(latest) => floor_to_second(latest.ts),
            None => Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now),
        };
        self.reconstruct_range(tenant_id, campaign_id, from, Utc::now())
            .await
    }
}
