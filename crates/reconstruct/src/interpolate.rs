//! Linear per-second interpolation between two observed insight records.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use adflux_core::{floor_to_second, TimeSeriesPoint};

use crate::extract::InsightMetrics;

/// One raw record reduced to its extraction result: the observed time and
/// the four counters. The two samples of a pair become the exact anchors of
/// the synthesized interval.
#[derive(Debug, Clone)]
pub struct AnchorSample {
    pub record_id: Uuid,
    pub at: DateTime<Utc>,
    pub metrics: InsightMetrics,
}

/// Lazily yields the points of one reconciliation window. A multi-day gap
/// between polls expands to hundreds of thousands of points, so callers
/// drain this iterator in fixed-size chunks instead of collecting it.
pub struct PairPoints {
    tenant_id: Uuid,
    campaign_id: String,
    start: DateTime<Utc>,
    elapsed: i64,
    i: i64,
    first: InsightMetrics,
    second: InsightMetrics,
    first_id: Uuid,
    second_id: Uuid,
    d_impressions: f64,
    d_spend: f64,
    d_clicks: f64,
    d_reach: f64,
}

impl Iterator for PairPoints {
    type Item = TimeSeriesPoint;

    fn next(&mut self) -> Option<TimeSeriesPoint> {
        if self.i > self.elapsed {
            return None;
        }
        let i = self.i;
        self.i += 1;

        let ts = self.start + chrono::Duration::seconds(i);

        // Endpoints are exact observations, interior points are synthesized.
        let (point, is_interpolated, source) = if i == 0 {
            (self.first, false, Some(self.first_id))
        } else if i == self.elapsed {
            (self.second, false, Some(self.second_id))
        } else {
            let f = i as f64;
            let interpolated = InsightMetrics {
                impressions: (self.first.impressions as f64 + self.d_impressions * f).floor()
                    as i64,
                spend: self.first.spend + self.d_spend * f,
                clicks: (self.first.clicks as f64 + self.d_clicks * f).floor() as i64,
                reach: (self.first.reach as f64 + self.d_reach * f).floor() as i64,
            };
            (interpolated, true, None)
        };

        Some(TimeSeriesPoint {
            tenant_id: self.tenant_id,
            campaign_id: self.campaign_id.clone(),
            ts,
            impressions_cum: point.impressions,
            spend_cum: point.spend,
            clicks_cum: point.clicks,
            reach_cum: point.reach,
            is_interpolated,
            source_insight_id: source,
        })
    }
}

/// Interpolate between two chronologically adjacent samples.
///
/// Non-positive elapsed time (duplicate or out-of-order fetches) produces an
/// empty iterator. Decreasing counters are interpolated as-is — upstream
/// resets are intentionally not clamped.
pub fn interpolate_pair(
    tenant_id: Uuid,
    campaign_id: &str,
    first: &AnchorSample,
    second: &AnchorSample,
) -> PairPoints {
    let start = floor_to_second(first.at);
    let elapsed = floor_to_second(second.at).timestamp() - start.timestamp();

    // elapsed <= 0 makes `i > elapsed` true immediately: zero points.
    let span = elapsed.max(1) as f64;

    PairPoints {
        tenant_id,
        campaign_id: campaign_id.to_string(),
        start,
        elapsed: if elapsed <= 0 { -1 } else { elapsed },
        i: 0,
        first: first.metrics,
        second: second.metrics,
        first_id: first.record_id,
        second_id: second.record_id,
        d_impressions: (second.metrics.impressions - first.metrics.impressions) as f64 / span,
        d_spend: (second.metrics.spend - first.metrics.spend) / span,
        d_clicks: (second.metrics.clicks - first.metrics.clicks) as f64 / span,
        d_reach: (second.metrics.reach - first.metrics.reach) as f64 / span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(at_secs: i64, impressions: i64, spend: f64) -> AnchorSample {
        AnchorSample {
            record_id: Uuid::new_v4(),
            at: Utc.timestamp_opt(at_secs, 0).single().unwrap(),
            metrics: InsightMetrics {
                impressions,
                spend,
                clicks: impressions / 10,
                reach: impressions / 2,
            },
        }
    }

    #[test]
    fn test_linear_interpolation_one_per_second() {
        let tenant = Uuid::new_v4();
        let first = sample(0, 100, 1.0);
        let second = sample(60, 160, 4.0);

        let points: Vec<_> = interpolate_pair(tenant, "c1", &first, &second).collect();
        assert_eq!(points.len(), 61);

        for (i, p) in points.iter().enumerate() {
            assert_eq!(p.ts.timestamp(), i as i64);
            assert_eq!(p.impressions_cum, 100 + i as i64);
        }
        assert_eq!(points[30].impressions_cum, 130);
        assert!((points[30].spend_cum - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_anchor_flags_and_sources() {
        let first = sample(0, 100, 1.0);
        let second = sample(10, 110, 2.0);
        let points: Vec<_> =
            interpolate_pair(Uuid::new_v4(), "c1", &first, &second).collect();

        assert!(!points[0].is_interpolated);
        assert_eq!(points[0].source_insight_id, Some(first.record_id));
        assert!(!points[10].is_interpolated);
        assert_eq!(points[10].source_insight_id, Some(second.record_id));

        for p in &points[1..10] {
            assert!(p.is_interpolated);
            assert!(p.source_insight_id.is_none());
        }
    }

    #[test]
    fn test_non_positive_elapsed_yields_no_points() {
        let a = sample(100, 10, 0.1);
        let b = sample(100, 20, 0.2);
        assert_eq!(interpolate_pair(Uuid::new_v4(), "c1", &a, &b).count(), 0);

        let reversed = interpolate_pair(Uuid::new_v4(), "c1", &b, &sample(50, 5, 0.0));
        assert_eq!(reversed.count(), 0);
    }

    #[test]
    fn test_integer_metrics_floored_spend_fractional() {
        // 3 impressions over 2 seconds: delta = 1.5/s.
        let first = sample(0, 0, 0.0);
        let second = sample(2, 3, 0.3);
        let points: Vec<_> =
            interpolate_pair(Uuid::new_v4(), "c1", &first, &second).collect();

        assert_eq!(points.len(), 3);
        assert_eq!(points[1].impressions_cum, 1); // floor(1.5)
        assert!((points[1].spend_cum - 0.15).abs() < 1e-9);
        assert_eq!(points[2].impressions_cum, 3);
    }

    #[test]
    fn test_decreasing_counters_pass_through_unclamped() {
        let first = sample(0, 100, 5.0);
        let second = sample(10, 0, 0.0);
        let points: Vec<_> =
            interpolate_pair(Uuid::new_v4(), "c1", &first, &second).collect();

        assert_eq!(points[5].impressions_cum, 50);
        assert_eq!(points[10].impressions_cum, 0);
    }

    #[test]
    fn test_subsecond_timestamps_floor_to_second_grid() {
        let first = AnchorSample {
            record_id: Uuid::new_v4(),
            at: Utc.timestamp_opt(0, 900_000_000).single().unwrap(),
            metrics: InsightMetrics::default(),
        };
        let second = AnchorSample {
            record_id: Uuid::new_v4(),
            at: Utc.timestamp_opt(2, 100_000_000).single().unwrap(),
            metrics: InsightMetrics::default(),
        };
        let points: Vec<_> =
            interpolate_pair(Uuid::new_v4(), "c1", &first, &second).collect();
        let seconds: Vec<i64> = points.iter().map(|p| p.ts.timestamp()).collect();
        assert_eq!(seconds, vec![0, 1, 2]);
        assert!(points.iter().all(|p| p.ts.timestamp_subsec_nanos() == 0));
    }
}
