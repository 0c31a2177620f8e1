//! Attendance Bridge - access-control to workforce service sync
//!
//! Mirrors departments, posts, employees and readers of a legacy
//! access-control database into a session-based workforce management
//! service, then imports attendance events incrementally.

pub mod config;
pub mod error;
pub mod remote;
pub mod store;
pub mod sync;
pub mod types;

pub use config::{BridgeSettings, SyncConfig, SyncStep};
pub use error::{BridgeError, Result};
pub use sync::{Credentials, RunSummary, SyncRun};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
