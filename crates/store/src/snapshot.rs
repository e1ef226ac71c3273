use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use adflux_core::{ObjectType, StructureSnapshot};

use crate::error::StoreError;

/// Why `create_if_changed` did or did not write a new version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// No prior version existed; version 1 inserted.
    New,
    /// Payload differed from the open version; old row closed, new inserted.
    Changed,
    /// Payload structurally equal to the open version; nothing written.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub created: bool,
    pub snapshot: StructureSnapshot,
    pub reason: ChangeReason,
}

/// SCD2-style versioned history of external object structure.
///
/// Rows are created and closed only through `create_if_changed`; nothing is
/// ever deleted, so points in time can always be resolved to the structure
/// that was current then.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Change detection: insert version 1 if the object is unseen, close the
    /// open version and insert its successor if the payload differs
    /// (atomically — a reader never observes zero or two open rows), or do
    /// nothing if the payload is structurally equal.
    ///
    /// Payload comparison is canonical structural equality; JSON key order
    /// does not cause a new version.
    async fn create_if_changed(
        &self,
        tenant_id: Uuid,
        object_type: ObjectType,
        external_object_id: &str,
        payload: &Value,
    ) -> Result<SnapshotOutcome, StoreError>;

    /// The version whose `[valid_from, valid_to)` interval contains `ts`
    /// (open interval treated as unbounded). None if the object had no
    /// snapshot yet at `ts`.
    async fn get_at(
        &self,
        tenant_id: Uuid,
        object_type: ObjectType,
        external_object_id: &str,
        ts: DateTime<Utc>,
    ) -> Result<Option<StructureSnapshot>, StoreError>;

    /// All open (current) snapshots of a type, optionally restricted to
    /// objects whose payload `campaign_id` field names the given campaign.
    async fn list_open(
        &self,
        tenant_id: Uuid,
        object_type: ObjectType,
        parent_campaign_id: Option<&str>,
    ) -> Result<Vec<StructureSnapshot>, StoreError>;
}
