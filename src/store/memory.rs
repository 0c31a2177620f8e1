//! In-memory source store for tests and dry runs

use std::cell::RefCell;

use chrono::NaiveDateTime;

use super::LocalStore;
use crate::error::Result;
use crate::types::{DepartmentRow, EmployeeRow, EventRow, PostRow, ReaderRow};

/// Source rows held in vectors
///
/// Employee pages honor the same contract as the database reader:
/// `source_id > after_id`, ordered by id, at most `count` rows. Every page
/// request is recorded as `(after_id, count)`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub departments: Vec<DepartmentRow>,
    pub posts: Vec<PostRow>,
    pub readers: Vec<ReaderRow>,
    pub employees: Vec<EmployeeRow>,
    pub events: Vec<EventRow>,
    page_requests: RefCell<Vec<(i64, usize)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_requests(&self) -> Vec<(i64, usize)> {
        self.page_requests.borrow().clone()
    }
}

impl LocalStore for MemoryStore {
    fn list_departments(&self) -> Result<Vec<DepartmentRow>> {
        Ok(self.departments.clone())
    }

    fn list_posts(&self) -> Result<Vec<PostRow>> {
        Ok(self.posts.clone())
    }

    fn list_registration_points(&self) -> Result<Vec<ReaderRow>> {
        Ok(self.readers.clone())
    }

    fn list_employees_page(
        &self,
        after_id: i64,
        count: usize,
        include_photo: bool,
    ) -> Result<Vec<EmployeeRow>> {
        self.page_requests.borrow_mut().push((after_id, count));

        let mut page: Vec<EmployeeRow> = self
            .employees
            .iter()
            .filter(|row| row.source_id > after_id)
            .cloned()
            .collect();
        page.sort_by_key(|row| row.source_id);
        page.truncate(count);
        if !include_photo {
            for row in &mut page {
                row.photo = None;
            }
        }
        Ok(page)
    }

    fn list_events_since(&self, since: NaiveDateTime) -> Result<Vec<EventRow>> {
        Ok(self
            .events
            .iter()
            .filter(|row| row.occurred_at >= since)
            .cloned()
            .collect())
    }
}
