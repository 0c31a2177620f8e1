//! Reconciliation engine
//!
//! Mirrors the legacy access-control database into the workforce service.
//! A run walks the steps in a fixed order (departments, posts, employees,
//! registration points, events); each step reloads the identity index of
//! its own kind, and dependent kinds are loaded on demand.

mod context;
mod employee;
mod entity;
pub mod events;
mod index;
mod pipeline;

pub use context::{RunContext, TrackedIndex};
pub use employee::{build_employee, EmployeeOutcome, EmployeeSyncer, INITIAL_CURSOR};
pub use entity::{materialize, partition, EntitySyncer, Partition, SyncOutcome};
pub use events::{dedup_key, fetch_start, EventImportReport, EventImporter, ImportWindow};
pub use index::IdentityIndex;
pub use pipeline::{Credentials, RunSummary, SyncRun};
