//! Read-side query service over the reconstructed time series and the
//! versioned structure snapshots.
//!
//! Everything here is a pure read: resolution handling is stride decimation
//! over stored second-points (never re-aggregation), window metrics are
//! boundary-point deltas, and structure joins resolve snapshots as of a
//! point in time.

pub mod service;

pub use service::{
    ActiveCampaign, AnalyticsService, TimeSeriesWithStructure, WindowMetrics,
    DEFAULT_SERIES_CAP,
};
