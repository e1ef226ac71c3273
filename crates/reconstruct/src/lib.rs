//! Time-series reconstruction: turns sparse raw insight records into a
//! dense per-second series of cumulative counters.
//!
//! Extraction reads the provider's opaque payload defensively; records that
//! do not match the expected shape yield no metrics and no interpolation
//! happens across them. Interpolation is linear between adjacent records,
//! with the two observed records kept as exact anchors.

pub mod extract;
pub mod interpolate;
pub mod reconstructor;

pub use extract::{extract_metrics, InsightMetrics};
pub use interpolate::{interpolate_pair, AnchorSample};
pub use reconstructor::{ReconstructionSummary, Reconstructor};
