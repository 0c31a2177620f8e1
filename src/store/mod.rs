//! Access-control database readers
//!
//! The reconciliation engine only reads from the source; nothing here
//! writes to it or migrates its schema.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::NaiveDateTime;

use crate::error::Result;
use crate::types::{DepartmentRow, EmployeeRow, EventRow, PostRow, ReaderRow};

/// Read access to the access-control database
pub trait LocalStore {
    fn list_departments(&self) -> Result<Vec<DepartmentRow>>;

    fn list_posts(&self) -> Result<Vec<PostRow>>;

    fn list_registration_points(&self) -> Result<Vec<ReaderRow>>;

    /// Up to `count` employees with a source id greater than `after_id`,
    /// ordered by source id
    fn list_employees_page(
        &self,
        after_id: i64,
        count: usize,
        include_photo: bool,
    ) -> Result<Vec<EmployeeRow>>;

    /// Events at or after `since`, in source order
    fn list_events_since(&self, since: NaiveDateTime) -> Result<Vec<EventRow>>;
}
