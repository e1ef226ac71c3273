//! HTTP surface and workflow wiring: app state, sync workflows, queue
//! handlers, router, and startup.

pub mod api;
pub mod db;
pub mod jobs;
pub mod router;
pub mod startup;
pub mod state;
pub mod sync;
