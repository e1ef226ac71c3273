use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Structural level of an external ad object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Campaign,
    AdSet,
    Ad,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Campaign => "campaign",
            ObjectType::AdSet => "ad_set",
            ObjectType::Ad => "ad",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "campaign" => Ok(ObjectType::Campaign),
            "ad_set" | "adset" => Ok(ObjectType::AdSet),
            "ad" => Ok(ObjectType::Ad),
            other => Err(format!("unknown object type: {}", other)),
        }
    }
}

/// One SCD2-style version of an external object's structure.
///
/// Validity interval is `[valid_from, valid_to)`; `valid_to = None` marks
/// the open (current) version. At most one open row exists per
/// (tenant, object_type, external id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub object_type: ObjectType,
    pub external_object_id: String,
    pub version: i32,
    pub payload: Value,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl StructureSnapshot {
    /// Whether `ts` falls inside this version's validity interval.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.valid_from && self.valid_to.map(|end| ts < end).unwrap_or(true)
    }
}

/// One fetched performance payload, exactly as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInsightRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub campaign_id: String,
    pub fetched_at: DateTime<Utc>,
    pub payload: Value,
}

/// One second of reconstructed cumulative counters for a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub tenant_id: Uuid,
    pub campaign_id: String,
    pub ts: DateTime<Utc>,
    pub impressions_cum: i64,
    pub spend_cum: f64,
    pub clicks_cum: i64,
    pub reach_cum: i64,
    /// False for anchor points taken directly from a raw record.
    pub is_interpolated: bool,
    pub source_insight_id: Option<Uuid>,
}

/// Query resolution for the time-series read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Second,
    Minute,
    Hour,
}

impl Resolution {
    /// Decimation stride in stored second-points.
    pub fn stride(&self) -> usize {
        match self {
            Resolution::Second => 1,
            Resolution::Minute => 60,
            Resolution::Hour => 3_600,
        }
    }
}

/// Truncate a timestamp to whole-second precision.
pub fn floor_to_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp(), 0)
        .single()
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_snapshot_contains_half_open_interval() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(60);
        let snap = StructureSnapshot {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            object_type: ObjectType::Campaign,
            external_object_id: "123".into(),
            version: 1,
            payload: serde_json::json!({}),
            valid_from: t0,
            valid_to: Some(t1),
        };
        assert!(snap.contains(t0));
        assert!(snap.contains(t1 - Duration::seconds(1)));
        assert!(!snap.contains(t1));
    }

    #[test]
    fn test_open_snapshot_contains_future() {
        let t0 = Utc::now();
        let snap = StructureSnapshot {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            object_type: ObjectType::Ad,
            external_object_id: "a1".into(),
            version: 3,
            payload: serde_json::json!({}),
            valid_from: t0,
            valid_to: None,
        };
        assert!(snap.contains(t0 + Duration::days(365)));
        assert!(!snap.contains(t0 - Duration::seconds(1)));
    }

    #[test]
    fn test_object_type_round_trip() {
        for ot in [ObjectType::Campaign, ObjectType::AdSet, ObjectType::Ad] {
            assert_eq!(ot.as_str().parse::<ObjectType>().unwrap(), ot);
        }
        assert!("campaignz".parse::<ObjectType>().is_err());
    }

    #[test]
    fn test_floor_to_second_drops_nanos() {
        let ts = Utc.timestamp_opt(1_700_000_000, 987_654_321).single().unwrap();
        let floored = floor_to_second(ts);
        assert_eq!(floored.timestamp(), 1_700_000_000);
        assert_eq!(floored.timestamp_subsec_nanos(), 0);
    }
}
