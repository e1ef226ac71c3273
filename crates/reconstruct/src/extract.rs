//! Metric extraction from opaque provider insight payloads.

use serde_json::Value;

/// The four cumulative counters extracted per raw record.
///
/// "Cumulative" here means a sum over the daily buckets the provider
/// returned for the poll, not a guaranteed running total since campaign
/// start.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InsightMetrics {
    pub impressions: i64,
    pub spend: f64,
    pub clicks: i64,
    pub reach: i64,
}

/// The provider serializes most numbers as strings; accept both.
fn num_i64(v: Option<&Value>) -> i64 {
    match v {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn num_f64(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Sum of "link click" action entries in a bucket.
fn link_clicks(bucket: &Value) -> i64 {
    let Some(actions) = bucket.get("actions").and_then(Value::as_array) else {
        return 0;
    };
    actions
        .iter()
        .filter(|a| a.get("action_type").and_then(Value::as_str) == Some("link_click"))
        .map(|a| num_i64(a.get("value")))
        .sum()
}

/// Extract the four counters from a raw insight payload, summing any
/// multi-bucket breakdown present. Returns None when the payload does not
/// carry the expected `data` array — the caller skips every pair touching
/// such a record rather than interpolating across an unknown endpoint.
pub fn extract_metrics(payload: &Value) -> Option<InsightMetrics> {
    let buckets = payload.get("data")?.as_array()?;

    let mut metrics = InsightMetrics::default();
    for bucket in buckets {
        if !bucket.is_object() {
            return None;
        }
        metrics.impressions += num_i64(bucket.get("impressions"));
        metrics.spend += num_f64(bucket.get("spend"));
        metrics.reach += num_i64(bucket.get("reach"));
        metrics.clicks += link_clicks(bucket);
    }

    Some(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sums_multi_bucket_breakdown() {
        let payload = json!({
            "data": [
                {
                    "impressions": "100",
                    "spend": "1.50",
                    "reach": "80",
                    "actions": [
                        {"action_type": "link_click", "value": "7"},
                        {"action_type": "post_engagement", "value": "99"}
                    ],
                    "date_start": "2025-03-01",
                    "date_stop": "2025-03-01"
                },
                {
                    "impressions": "50",
                    "spend": "0.25",
                    "reach": "40",
                    "actions": [
                        {"action_type": "link_click", "value": "3"}
                    ],
                    "date_start": "2025-03-02",
                    "date_stop": "2025-03-02"
                }
            ]
        });

        let m = extract_metrics(&payload).unwrap();
        assert_eq!(m.impressions, 150);
        assert!((m.spend - 1.75).abs() < 1e-9);
        assert_eq!(m.reach, 120);
        assert_eq!(m.clicks, 10);
    }

    #[test]
    fn test_accepts_plain_numbers() {
        let payload = json!({
            "data": [{"impressions": 42, "spend": 0.5, "reach": 30}]
        });
        let m = extract_metrics(&payload).unwrap();
        assert_eq!(m.impressions, 42);
        assert_eq!(m.clicks, 0);
    }

    #[test]
    fn test_empty_data_is_zero_metrics() {
        let m = extract_metrics(&json!({"data": []})).unwrap();
        assert_eq!(m, InsightMetrics::default());
    }

    #[test]
    fn test_missing_or_malformed_structure_yields_none() {
        assert!(extract_metrics(&json!({"error": "rate limit"})).is_none());
        assert!(extract_metrics(&json!({"data": "not-an-array"})).is_none());
        assert!(extract_metrics(&json!({"data": ["not-an-object"]})).is_none());
        assert!(extract_metrics(&json!(null)).is_none());
    }

    #[test]
    fn test_unparseable_numbers_count_as_zero() {
        let payload = json!({
            "data": [{"impressions": "n/a", "spend": "", "reach": "10"}]
        });
        let m = extract_metrics(&payload).unwrap();
        assert_eq!(m.impressions, 0);
        assert_eq!(m.spend, 0.0);
        assert_eq!(m.reach, 10);
    }
}
