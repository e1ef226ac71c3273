//! PostgreSQL implementations of the three stores.
//!
//! Plain-SQL `sqlx::query_as` over explicit row structs; the snapshot
//! close+create pair runs inside one transaction with the open row locked
//! `FOR UPDATE`, so concurrent pollers for the same object serialize and a
//! reader never observes zero or two open versions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use adflux_core::{ObjectType, RawInsightRecord, StructureSnapshot, TimeSeriesPoint};

use crate::error::StoreError;
use crate::ledger::InsightLedger;
use crate::points::PointStore;
use crate::snapshot::{ChangeReason, SnapshotOutcome, SnapshotStore};

// ── Row structs ─────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    tenant_id: Uuid,
    object_type: String,
    external_object_id: String,
    version: i32,
    payload: Value,
    valid_from: DateTime<Utc>,
    valid_to: Option<DateTime<Utc>>,
}

impl TryFrom<SnapshotRow> for StructureSnapshot {
    type Error = StoreError;

    fn try_from(row: SnapshotRow) -> Result<Self, StoreError> {
        let object_type: ObjectType = row
            .object_type
            .parse()
            .map_err(StoreError::Corrupt)?;
        Ok(StructureSnapshot {
            id: row.id,
            tenant_id: row.tenant_id,
            object_type,
            external_object_id: row.external_object_id,
            version: row.version,
            payload: row.payload,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InsightRow {
    id: Uuid,
    tenant_id: Uuid,
    campaign_id: String,
    fetched_at: DateTime<Utc>,
    payload: Value,
}

impl From<InsightRow> for RawInsightRecord {
    fn from(row: InsightRow) -> Self {
        RawInsightRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            campaign_id: row.campaign_id,
            fetched_at: row.fetched_at,
            payload: row.payload,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PointRow {
    tenant_id: Uuid,
    campaign_id: String,
    ts: DateTime<Utc>,
    impressions_cum: i64,
    spend_cum: f64,
    clicks_cum: i64,
    reach_cum: i64,
    is_interpolated: bool,
    source_insight_id: Option<Uuid>,
}

impl From<PointRow> for TimeSeriesPoint {
    fn from(row: PointRow) -> Self {
        TimeSeriesPoint {
            tenant_id: row.tenant_id,
            campaign_id: row.campaign_id,
            ts: row.ts,
            impressions_cum: row.impressions_cum,
            spend_cum: row.spend_cum,
            clicks_cum: row.clicks_cum,
            reach_cum: row.reach_cum,
            is_interpolated: row.is_interpolated,
            source_insight_id: row.source_insight_id,
        }
    }
}

const SNAPSHOT_COLUMNS: &str =
    "id, tenant_id, object_type, external_object_id, version, payload, valid_from, valid_to";

// ── Snapshot store ──────────────────────────────────────────────

pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn create_if_changed(
        &self,
        tenant_id: Uuid,
        object_type: ObjectType,
        external_object_id: &str,
        payload: &Value,
    ) -> Result<SnapshotOutcome, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let open = sqlx::query_as::<_, SnapshotRow>(
            "SELECT id, tenant_id, object_type, external_object_id, version,
                    payload, valid_from, valid_to
             FROM structure_snapshots
             WHERE tenant_id = $1 AND object_type = $2 AND external_object_id = $3
               AND valid_to IS NULL
             FOR UPDATE",
        )
        .bind(tenant_id)
        .bind(object_type.as_str())
        .bind(external_object_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (version, reason) = match open {
            None => (1, ChangeReason::New),
            Some(row) if row.payload == *payload => {
                tx.commit().await?;
                return Ok(SnapshotOutcome {
                    created: false,
                    snapshot: row.try_into()?,
                    reason: ChangeReason::Unchanged,
                });
            }
            Some(row) => {
                sqlx::query("UPDATE structure_snapshots SET valid_to = $1 WHERE id = $2")
                    .bind(now)
                    .bind(row.id)
                    .execute(&mut *tx)
                    .await?;
                (row.version + 1, ChangeReason::Changed)
            }
        };

        let inserted = sqlx::query_as::<_, SnapshotRow>(
            "INSERT INTO structure_snapshots
                 (id, tenant_id, object_type, external_object_id, version,
                  payload, valid_from, valid_to)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NULL)
             RETURNING id, tenant_id, object_type, external_object_id, version,
                       payload, valid_from, valid_to",
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(object_type.as_str())
        .bind(external_object_id)
        .bind(version)
        .bind(payload)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SnapshotOutcome {
            created: true,
            snapshot: inserted.try_into()?,
            reason,
        })
    }

    async fn get_at(
        &self,
        tenant_id: Uuid,
        object_type: ObjectType,
        external_object_id: &str,
        ts: DateTime<Utc>,
    ) -> Result<Option<StructureSnapshot>, StoreError> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS}
             FROM structure_snapshots
             WHERE tenant_id = $1 AND object_type = $2 AND external_object_id = $3
               AND valid_from <= $4 AND (valid_to IS NULL OR valid_to > $4)
             LIMIT 1"
        ))
        .bind(tenant_id)
        .bind(object_type.as_str())
        .bind(external_object_id)
        .bind(ts)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_open(
        &self,
        tenant_id: Uuid,
        object_type: ObjectType,
        parent_campaign_id: Option<&str>,
    ) -> Result<Vec<StructureSnapshot>, StoreError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS}
             FROM structure_snapshots
             WHERE tenant_id = $1 AND object_type = $2 AND valid_to IS NULL
               AND ($3::text IS NULL OR payload->>'campaign_id' = $3)
             ORDER BY external_object_id"
        ))
        .bind(tenant_id)
        .bind(object_type.as_str())
        .bind(parent_campaign_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// ── Insight ledger ──────────────────────────────────────────────

pub struct PgInsightLedger {
    pool: PgPool,
}

impl PgInsightLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InsightLedger for PgInsightLedger {
    async fn ingest(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        payload: &Value,
    ) -> Result<RawInsightRecord, StoreError> {
        let row = sqlx::query_as::<_, InsightRow>(
            "INSERT INTO raw_insights (id, tenant_id, campaign_id, fetched_at, payload)
             VALUES ($1, $2, $3, now(), $4)
             RETURNING id, tenant_id, campaign_id, fetched_at, payload",
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn query(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawInsightRecord>, StoreError> {
        let rows = sqlx::query_as::<_, InsightRow>(
            "SELECT id, tenant_id, campaign_id, fetched_at, payload
             FROM raw_insights
             WHERE tenant_id = $1 AND campaign_id = $2
               AND fetched_at >= $3 AND fetched_at <= $4
             ORDER BY fetched_at ASC",
        )
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// ── Point store ─────────────────────────────────────────────────

pub struct PgPointStore {
    pool: PgPool,
}

impl PgPointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const POINT_COLUMNS: &str = "tenant_id, campaign_id, ts, impressions_cum, spend_cum, \
                             clicks_cum, reach_cum, is_interpolated, source_insight_id";

#[async_trait]
impl PointStore for PgPointStore {
    async fn insert_batch(&self, points: &[TimeSeriesPoint]) -> Result<u64, StoreError> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut tenant_ids = Vec::with_capacity(points.len());
        let mut campaign_ids = Vec::with_capacity(points.len());
        let mut timestamps = Vec::with_capacity(points.len());
        let mut impressions = Vec::with_capacity(points.len());
        let mut spends = Vec::with_capacity(points.len());
        let mut clicks = Vec::with_capacity(points.len());
        let mut reaches = Vec::with_capacity(points.len());
        let mut interpolated = Vec::with_capacity(points.len());
        let mut sources = Vec::with_capacity(points.len());

        for p in points {
            tenant_ids.push(p.tenant_id);
            campaign_ids.push(p.campaign_id.clone());
            timestamps.push(p.ts);
            impressions.push(p.impressions_cum);
            spends.push(p.spend_cum);
            clicks.push(p.clicks_cum);
            reaches.push(p.reach_cum);
            interpolated.push(p.is_interpolated);
            sources.push(p.source_insight_id);
        }

        let result = sqlx::query(
            "INSERT INTO timeseries_points
                 (tenant_id, campaign_id, ts, impressions_cum, spend_cum,
                  clicks_cum, reach_cum, is_interpolated, source_insight_id)
             SELECT * FROM UNNEST
                 ($1::uuid[], $2::text[], $3::timestamptz[], $4::bigint[],
                  $5::double precision[], $6::bigint[], $7::bigint[],
                  $8::boolean[], $9::uuid[])
             ON CONFLICT (campaign_id, ts) DO NOTHING",
        )
        .bind(&tenant_ids)
        .bind(&campaign_ids)
        .bind(&timestamps)
        .bind(&impressions)
        .bind(&spends)
        .bind(&clicks)
        .bind(&reaches)
        .bind(&interpolated)
        .bind(&sources)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn query_range(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TimeSeriesPoint>, StoreError> {
        let rows = sqlx::query_as::<_, PointRow>(&format!(
            "SELECT {POINT_COLUMNS}
             FROM timeseries_points
             WHERE tenant_id = $1 AND campaign_id = $2 AND ts >= $3 AND ts <= $4
             ORDER BY ts ASC
             LIMIT $5"
        ))
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn latest(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
    ) -> Result<Option<TimeSeriesPoint>, StoreError> {
        let row = sqlx::query_as::<_, PointRow>(&format!(
            "SELECT {POINT_COLUMNS}
             FROM timeseries_points
             WHERE tenant_id = $1 AND campaign_id = $2
             ORDER BY ts DESC
             LIMIT 1"
        ))
        .bind(tenant_id)
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn first_at_or_after(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Option<TimeSeriesPoint>, StoreError> {
        let row = sqlx::query_as::<_, PointRow>(&format!(
            "SELECT {POINT_COLUMNS}
             FROM timeseries_points
             WHERE tenant_id = $1 AND campaign_id = $2 AND ts >= $3
             ORDER BY ts ASC
             LIMIT 1"
        ))
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(from)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn last_at_or_before(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        to: DateTime<Utc>,
    ) -> Result<Option<TimeSeriesPoint>, StoreError> {
        let row = sqlx::query_as::<_, PointRow>(&format!(
            "SELECT {POINT_COLUMNS}
             FROM timeseries_points
             WHERE tenant_id = $1 AND campaign_id = $2 AND ts <= $3
             ORDER BY ts DESC
             LIMIT 1"
        ))
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}
