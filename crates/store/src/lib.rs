//! Persistence layer: the versioned structure snapshot store, the
//! append-only raw insight ledger, and the reconstructed time-series point
//! store. Every trait method is tenant-scoped at the query level so no
//! caller can read another tenant's rows by omission.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod pg;
pub mod points;
pub mod snapshot;

pub use error::StoreError;
pub use ledger::InsightLedger;
pub use memory::{MemoryInsightLedger, MemoryPointStore, MemorySnapshotStore};
pub use pg::{PgInsightLedger, PgPointStore, PgSnapshotStore};
pub use points::PointStore;
pub use snapshot::{ChangeReason, SnapshotOutcome, SnapshotStore};
