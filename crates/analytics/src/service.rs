use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use adflux_core::{ObjectType, Resolution, StructureSnapshot, TimeSeriesPoint};
use adflux_store::{PointStore, SnapshotStore, StoreError};

/// Counter deltas between the boundary points of a window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowMetrics {
    pub campaign_id: String,
    /// Timestamps of the boundary points actually used (first at/after
    /// `from`, last at/before `to`).
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub window_seconds: i64,
    pub impressions: i64,
    pub spend: f64,
    pub clicks: i64,
    pub reach: i64,
}

/// A time series joined with the structure that was current at the window
/// midpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TimeSeriesWithStructure {
    pub points: Vec<TimeSeriesPoint>,
    /// Midpoint of the query window; all snapshots below are resolved as of
    /// this instant.
    pub structure_as_of: DateTime<Utc>,
    pub campaign: Option<StructureSnapshot>,
    pub ad_sets: Vec<StructureSnapshot>,
    pub ads: Vec<StructureSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveCampaign {
    pub snapshot: StructureSnapshot,
    pub latest_point: Option<TimeSeriesPoint>,
}

/// Upper bound on points materialized by any single query, regardless of
/// the caller-supplied limit.
pub const DEFAULT_SERIES_CAP: usize = 100_000;

pub struct AnalyticsService {
    snapshots: Arc<dyn SnapshotStore>,
    points: Arc<dyn PointStore>,
    series_cap: usize,
}

impl AnalyticsService {
    pub fn new(snapshots: Arc<dyn SnapshotStore>, points: Arc<dyn PointStore>) -> Self {
        Self {
            snapshots,
            points,
            series_cap: DEFAULT_SERIES_CAP,
        }
    }

    pub fn with_series_cap(mut self, cap: usize) -> Self {
        self.series_cap = cap.max(1);
        self
    }

    /// Points in `[from, to]` at the requested resolution, capped at `limit`.
    ///
    /// Minute/hour resolution is decimation: every 60th / 3600th stored
    /// second-point is returned as-is. The counters are cumulative, so a
    /// sampled point already reflects everything before it; re-aggregating
    /// would double count.
    pub async fn get_time_series(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        resolution: Resolution,
        limit: usize,
    ) -> Result<Vec<TimeSeriesPoint>, StoreError> {
        let stride = resolution.stride();
        let limit = limit.min(self.series_cap);
        let fetch = i64::try_from(limit.saturating_mul(stride)).unwrap_or(i64::MAX);
        let dense = self
            .points
            .query_range(tenant_id, campaign_id, from, to, fetch)
            .await?;
        debug!(
            campaign_id = %campaign_id,
            fetched = dense.len(),
            stride,
            "time series query"
        );
        Ok(dense.into_iter().step_by(stride).take(limit).collect())
    }

    /// Counter deltas over `[from, to]`, measured between the first stored
    /// point at/after `from` and the last at/before `to`. None when either
    /// boundary has no point.
    pub async fn get_metrics_for_window(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<WindowMetrics>, StoreError> {
        let Some(start) = self
            .points
            .first_at_or_after(tenant_id, campaign_id, from)
            .await?
        else {
            return Ok(None);
        };
        let Some(end) = self
            .points
            .last_at_or_before(tenant_id, campaign_id, to)
            .await?
        else {
            return Ok(None);
        };
        if end.ts < start.ts {
            // Window narrower than the gap between stored points.
            return Ok(None);
        }
        Ok(Some(WindowMetrics {
            campaign_id: campaign_id.to_string(),
            start_ts: start.ts,
            end_ts: end.ts,
            window_seconds: (end.ts - start.ts).num_seconds(),
            impressions: end.impressions_cum - start.impressions_cum,
            spend: end.spend_cum - start.spend_cum,
            clicks: end.clicks_cum - start.clicks_cum,
            reach: end.reach_cum - start.reach_cum,
        }))
    }

    /// Time series plus the campaign/ad-set/ad snapshots that were current
    /// at the midpoint of the window.
    pub async fn get_time_series_with_structure(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TimeSeriesWithStructure, StoreError> {
        let fetch = i64::try_from(self.series_cap).unwrap_or(i64::MAX);
        let points = self
            .points
            .query_range(tenant_id, campaign_id, from, to, fetch)
            .await?;
        let midpoint = from + (to - from) / 2;

        let campaign = self
            .snapshots
            .get_at(tenant_id, ObjectType::Campaign, campaign_id, midpoint)
            .await?;
        let ad_sets = self
            .children_at(tenant_id, ObjectType::AdSet, campaign_id, midpoint)
            .await?;
        let ads = self
            .children_at(tenant_id, ObjectType::Ad, campaign_id, midpoint)
            .await?;

        Ok(TimeSeriesWithStructure {
            points,
            structure_as_of: midpoint,
            campaign,
            ad_sets,
            ads,
        })
    }

    /// The snapshot version valid at `ts`, if any.
    pub async fn get_structure_at_time(
        &self,
        tenant_id: Uuid,
        object_type: ObjectType,
        external_object_id: &str,
        ts: DateTime<Utc>,
    ) -> Result<Option<StructureSnapshot>, StoreError> {
        self.snapshots
            .get_at(tenant_id, object_type, external_object_id, ts)
            .await
    }

    /// Open campaign snapshots that are active (payload `effective_status`
    /// or `status` is "ACTIVE"; campaigns carrying neither field count as
    /// active), each paired with its most recent point.
    pub async fn get_active_campaigns_with_metrics(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<ActiveCampaign>, StoreError> {
        let open = self
            .snapshots
            .list_open(tenant_id, ObjectType::Campaign, None)
            .await?;
        let mut out = Vec::new();
        for snapshot in open {
            let status = snapshot
                .payload
                .get("effective_status")
                .or_else(|| snapshot.payload.get("status"))
                .and_then(|s| s.as_str());
            let active = status
                .map(|s| s.eq_ignore_ascii_case("active"))
                .unwrap_or(true);
            if !active {
                continue;
            }
            let latest_point = self
                .points
                .latest(tenant_id, &snapshot.external_object_id)
                .await?;
            out.push(ActiveCampaign {
                snapshot,
                latest_point,
            });
        }
        Ok(out)
    }

    /// Children of a campaign, each resolved to the version valid at `ts`.
    /// Objects that did not exist yet at `ts` are omitted.
    async fn children_at(
        &self,
        tenant_id: Uuid,
        object_type: ObjectType,
        campaign_id: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vec<StructureSnapshot>, StoreError> {
        let open = self
            .snapshots
            .list_open(tenant_id, object_type, Some(campaign_id))
            .await?;
        let mut resolved = Vec::with_capacity(open.len());
        for child in open {
            if let Some(at_ts) = self
                .snapshots
                .get_at(tenant_id, object_type, &child.external_object_id, ts)
                .await?
            {
                resolved.push(at_ts);
            }
        }
        Ok(resolved)
    }
}
