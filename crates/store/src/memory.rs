//! In-memory store implementations backed by `tokio::sync::RwLock`.
//!
//! Used by unit and integration tests and by local development without a
//! database. Semantics match the PostgreSQL implementations: the snapshot
//! close+create pair happens under one write lock, point inserts are
//! insert-if-absent, and every read is tenant-filtered.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use adflux_core::{ObjectType, RawInsightRecord, StructureSnapshot, TimeSeriesPoint};

use crate::error::StoreError;
use crate::ledger::InsightLedger;
use crate::points::PointStore;
use crate::snapshot::{ChangeReason, SnapshotOutcome, SnapshotStore};

// ── Snapshot store ──────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySnapshotStore {
    rows: RwLock<Vec<StructureSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn create_if_changed(
        &self,
        tenant_id: Uuid,
        object_type: ObjectType,
        external_object_id: &str,
        payload: &Value,
    ) -> Result<SnapshotOutcome, StoreError> {
        let now = Utc::now();
        let mut rows = self.rows.write().await;

        let open_idx = rows.iter().position(|s| {
            s.tenant_id == tenant_id
                && s.object_type == object_type
                && s.external_object_id == external_object_id
                && s.valid_to.is_none()
        });

        let (version, reason) = match open_idx {
            None => (1, ChangeReason::New),
            Some(idx) => {
                if rows[idx].payload == *payload {
                    return Ok(SnapshotOutcome {
                        created: false,
                        snapshot: rows[idx].clone(),
                        reason: ChangeReason::Unchanged,
                    });
                }
                rows[idx].valid_to = Some(now);
                (rows[idx].version + 1, ChangeReason::Changed)
            }
        };

        let snapshot = StructureSnapshot {
            id: Uuid::new_v4(),
            tenant_id,
            object_type,
            external_object_id: external_object_id.to_string(),
            version,
            payload: payload.clone(),
            valid_from: now,
            valid_to: None,
        };
        rows.push(snapshot.clone());

        Ok(SnapshotOutcome {
            created: true,
            snapshot,
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
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|s| {
                s.tenant_id == tenant_id
                    && s.object_type == object_type
                    && s.external_object_id == external_object_id
                    && s.contains(ts)
            })
            .cloned())
    }

    async fn list_open(
        &self,
        tenant_id: Uuid,
        object_type: ObjectType,
        parent_campaign_id: Option<&str>,
    ) -> Result<Vec<StructureSnapshot>, StoreError> {
        let rows = self.rows.read().await;
        let mut open: Vec<StructureSnapshot> = rows
            .iter()
            .filter(|s| {
                s.tenant_id == tenant_id
                    && s.object_type == object_type
                    && s.valid_to.is_none()
                    && parent_campaign_id
                        .map(|parent| {
                            s.payload.get("campaign_id").and_then(Value::as_str) == Some(parent)
                        })
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        open.sort_by(|a, b| a.external_object_id.cmp(&b.external_object_id));
        Ok(open)
    }
}

// ── Insight ledger ──────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryInsightLedger {
    rows: RwLock<Vec<RawInsightRecord>>,
}

impl MemoryInsightLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: append with an explicit `fetched_at`.
    pub async fn ingest_at(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        payload: &Value,
        fetched_at: DateTime<Utc>,
    ) -> RawInsightRecord {
        let record = RawInsightRecord {
            id: Uuid::new_v4(),
            tenant_id,
            campaign_id: campaign_id.to_string(),
            fetched_at,
            payload: payload.clone(),
        };
        self.rows.write().await.push(record.clone());
        record
    }
}

#[async_trait]
impl InsightLedger for MemoryInsightLedger {
    async fn ingest(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        payload: &Value,
    ) -> Result<RawInsightRecord, StoreError> {
        Ok(self
            .ingest_at(tenant_id, campaign_id, payload, Utc::now())
            .await)
    }

    async fn query(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawInsightRecord>, StoreError> {
        let rows = self.rows.read().await;
        let mut out: Vec<RawInsightRecord> = rows
            .iter()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.campaign_id == campaign_id
                    && r.fetched_at >= from
                    && r.fetched_at <= to
            })
            .cloned()
            .collect();
        out.sort_by_key(|r| r.fetched_at);
        Ok(out)
    }
}

// ── Point store ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryPointStore {
    // Keyed by (campaign_id, ts seconds) — mirrors the unique index.
    rows: RwLock<BTreeMap<(String, i64), TimeSeriesPoint>>,
}

impl MemoryPointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<TimeSeriesPoint> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl PointStore for MemoryPointStore {
    async fn insert_batch(&self, points: &[TimeSeriesPoint]) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let mut inserted = 0u64;
        for p in points {
            let key = (p.campaign_id.clone(), p.ts.timestamp());
            if let std::collections::btree_map::Entry::Vacant(slot) = rows.entry(key) {
                slot.insert(p.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn query_range(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TimeSeriesPoint>, StoreError> {
        let rows = self.rows.read().await;
        let range = (campaign_id.to_string(), from.timestamp())
            ..=(campaign_id.to_string(), to.timestamp());
        Ok(rows
            .range(range)
            .map(|(_, p)| p)
            .filter(|p| p.tenant_id == tenant_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn latest(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
    ) -> Result<Option<TimeSeriesPoint>, StoreError> {
        let rows = self.rows.read().await;
        let range = (campaign_id.to_string(), i64::MIN)..=(campaign_id.to_string(), i64::MAX);
        Ok(rows
            .range(range)
            .rev()
            .map(|(_, p)| p)
            .find(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn first_at_or_after(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Option<TimeSeriesPoint>, StoreError> {
        let rows = self.rows.read().await;
        let range = (campaign_id.to_string(), from.timestamp())
            ..=(campaign_id.to_string(), i64::MAX);
        Ok(rows
            .range(range)
            .map(|(_, p)| p)
            .find(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn last_at_or_before(
        &self,
        tenant_id: Uuid,
        campaign_id: &str,
        to: DateTime<Utc>,
    ) -> Result<Option<TimeSeriesPoint>, StoreError> {
        let rows = self.rows.read().await;
        let range =
            (campaign_id.to_string(), i64::MIN)..=(campaign_id.to_string(), to.timestamp());
        Ok(rows
            .range(range)
            .rev()
            .map(|(_, p)| p)
            .find(|p| p.tenant_id == tenant_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn point(tenant: Uuid, campaign: &str, ts_secs: i64, impressions: i64) -> TimeSeriesPoint {
        TimeSeriesPoint {
            tenant_id: tenant,
            campaign_id: campaign.to_string(),
            ts: Utc.timestamp_opt(ts_secs, 0).single().unwrap(),
            impressions_cum: impressions,
            spend_cum: impressions as f64 / 100.0,
            clicks_cum: impressions / 10,
            reach_cum: impressions / 2,
            is_interpolated: true,
            source_insight_id: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_unchanged_writes_nothing() {
        let store = MemorySnapshotStore::new();
        let tenant = Uuid::new_v4();
        let payload = json!({"name": "Summer Sale", "status": "ACTIVE"});

        let first = store
            .create_if_changed(tenant, ObjectType::Campaign, "c1", &payload)
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.reason, ChangeReason::New);
        assert_eq!(first.snapshot.version, 1);

        let second = store
            .create_if_changed(tenant, ObjectType::Campaign, "c1", &payload)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.reason, ChangeReason::Unchanged);
        assert_eq!(second.snapshot.id, first.snapshot.id);
    }

    #[tokio::test]
    async fn test_snapshot_change_bumps_version_and_closes_prior() {
        let store = MemorySnapshotStore::new();
        let tenant = Uuid::new_v4();

        store
            .create_if_changed(tenant, ObjectType::Campaign, "c1", &json!({"status": "ACTIVE"}))
            .await
            .unwrap();
        let changed = store
            .create_if_changed(tenant, ObjectType::Campaign, "c1", &json!({"status": "PAUSED"}))
            .await
            .unwrap();

        assert!(changed.created);
        assert_eq!(changed.reason, ChangeReason::Changed);
        assert_eq!(changed.snapshot.version, 2);

        // Prior row is closed exactly where the new one opens.
        let before = changed.snapshot.valid_from - Duration::milliseconds(1);
        let prior = store
            .get_at(tenant, ObjectType::Campaign, "c1", before)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prior.version, 1);
        assert_eq!(prior.valid_to, Some(changed.snapshot.valid_from));
    }

    #[tokio::test]
    async fn test_snapshot_equality_ignores_key_order() {
        let store = MemorySnapshotStore::new();
        let tenant = Uuid::new_v4();

        let a: Value = serde_json::from_str(r#"{"name":"x","status":"ACTIVE"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"status":"ACTIVE","name":"x"}"#).unwrap();

        store
            .create_if_changed(tenant, ObjectType::AdSet, "s1", &a)
            .await
            .unwrap();
        let second = store
            .create_if_changed(tenant, ObjectType::AdSet, "s1", &b)
            .await
            .unwrap();

        // Canonical structural comparison: key order alone is not a change.
        assert_eq!(second.reason, ChangeReason::Unchanged);

        let changed = store
            .create_if_changed(tenant, ObjectType::AdSet, "s1", &json!({"name":"y","status":"ACTIVE"}))
            .await
            .unwrap();
        assert_eq!(changed.reason, ChangeReason::Changed);
    }

    #[tokio::test]
    async fn test_get_at_boundary_belongs_to_successor() {
        let store = MemorySnapshotStore::new();
        let tenant = Uuid::new_v4();

        let v1 = store
            .create_if_changed(tenant, ObjectType::Ad, "a1", &json!({"v": 1}))
            .await
            .unwrap();
        let v2 = store
            .create_if_changed(tenant, ObjectType::Ad, "a1", &json!({"v": 2}))
            .await
            .unwrap();

        let t1 = v2.snapshot.valid_from;
        let at_t1 = store
            .get_at(tenant, ObjectType::Ad, "a1", t1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(at_t1.version, 2);

        let before_first = v1.snapshot.valid_from - Duration::seconds(1);
        assert!(store
            .get_at(tenant, ObjectType::Ad, "a1", before_first)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_snapshot_tenant_isolation() {
        let store = MemorySnapshotStore::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        store
            .create_if_changed(tenant_a, ObjectType::Campaign, "c1", &json!({"v": 1}))
            .await
            .unwrap();

        assert!(store
            .get_at(tenant_b, ObjectType::Campaign, "c1", Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(store
            .list_open(tenant_b, ObjectType::Campaign, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_open_filters_by_parent_campaign() {
        let store = MemorySnapshotStore::new();
        let tenant = Uuid::new_v4();

        store
            .create_if_changed(tenant, ObjectType::AdSet, "s1", &json!({"campaign_id": "c1"}))
            .await
            .unwrap();
        store
            .create_if_changed(tenant, ObjectType::AdSet, "s2", &json!({"campaign_id": "c2"}))
            .await
            .unwrap();

        let children = store
            .list_open(tenant, ObjectType::AdSet, Some("c1"))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].external_object_id, "s1");

        let all = store.list_open(tenant, ObjectType::AdSet, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_ledger_orders_by_fetched_at() {
        let ledger = MemoryInsightLedger::new();
        let tenant = Uuid::new_v4();
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();

        ledger
            .ingest_at(tenant, "c1", &json!({"n": 2}), t0 + Duration::seconds(60))
            .await;
        ledger.ingest_at(tenant, "c1", &json!({"n": 1}), t0).await;
        ledger
            .ingest_at(tenant, "c1", &json!({"n": 3}), t0 + Duration::seconds(120))
            .await;

        let records = ledger
            .query(tenant, "c1", t0, t0 + Duration::seconds(120))
            .await
            .unwrap();
        let order: Vec<i64> = records
            .iter()
            .map(|r| r.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);

        // Other tenants see nothing.
        assert!(ledger
            .query(Uuid::new_v4(), "c1", t0, t0 + Duration::seconds(120))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_point_insert_is_insert_if_absent() {
        let store = MemoryPointStore::new();
        let tenant = Uuid::new_v4();

        let first = vec![point(tenant, "c1", 1000, 10), point(tenant, "c1", 1001, 11)];
        assert_eq!(store.insert_batch(&first).await.unwrap(), 2);

        // Overlapping rerun with a conflicting value: existing rows win.
        let rerun = vec![point(tenant, "c1", 1001, 999), point(tenant, "c1", 1002, 12)];
        assert_eq!(store.insert_batch(&rerun).await.unwrap(), 1);

        assert_eq!(store.len().await, 3);
        let kept = store
            .first_at_or_after(tenant, "c1", Utc.timestamp_opt(1001, 0).single().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.impressions_cum, 11);
    }

    #[tokio::test]
    async fn test_point_boundary_queries() {
        let store = MemoryPointStore::new();
        let tenant = Uuid::new_v4();
        store
            .insert_batch(&[
                point(tenant, "c1", 100, 1),
                point(tenant, "c1", 200, 2),
                point(tenant, "c1", 300, 3),
            ])
            .await
            .unwrap();

        let at_150 = store
            .first_at_or_after(tenant, "c1", Utc.timestamp_opt(150, 0).single().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(at_150.impressions_cum, 2);

        let at_250 = store
            .last_at_or_before(tenant, "c1", Utc.timestamp_opt(250, 0).single().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(at_250.impressions_cum, 2);

        let latest = store.latest(tenant, "c1").await.unwrap().unwrap();
        assert_eq!(latest.impressions_cum, 3);

        let ranged = store
            .query_range(
                tenant,
                "c1",
                Utc.timestamp_opt(100, 0).single().unwrap(),
                Utc.timestamp_opt(300, 0).single().unwrap(),
                2,
            )
            .await
            .unwrap();
        assert_eq!(ranged.len(), 2);
    }
}
