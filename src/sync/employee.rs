//! Paged employee reconciliation
//!
//! Employees are read in pages keyed by source id, so large directories
//! never sit in memory at once. Each page goes through the same
//! partition/create/update cycle as the other entity kinds, with Post and
//! Department resolved by index lookup and photos sent as detail records.

use serde::Serialize;

use super::context::RunContext;
use super::entity::{materialize, partition, SyncOutcome};
use super::index::IdentityIndex;
use crate::error::{BridgeError, Result};
use crate::remote::{EntityEndpoint, WorkforceService};
use crate::store::LocalStore;
use crate::types::{
    employee_key, Department, Employee, EmployeeDetailInfo, EmployeeRow, EntityKind, EntityRef,
    Oid, Post,
};

/// Cursor below every source id
pub const INITIAL_CURSOR: i64 = -1;

/// Counts reported by an employee sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmployeeOutcome {
    pub entities: SyncOutcome,
    /// Detail records written (only with photos)
    pub details: usize,
    pub pages: usize,
    /// Post or department texts that matched nothing in the indexes
    pub unresolved_references: usize,
}

/// Build the employee for a source row, resolving weak references
///
/// Returns the employee and the number of references that could not be
/// resolved. Blank titles or departments are not counted as unresolved.
pub fn build_employee(
    row: &EmployeeRow,
    departments: &IdentityIndex<Department>,
    posts: &IdentityIndex<Post>,
) -> (Employee, usize) {
    let mut unresolved = 0;

    let post = resolve(row.title.as_deref(), |key| posts.find(key).map(EntityRef::from));
    if post.is_none() && !is_blank(row.title.as_deref()) {
        tracing::debug!(source_id = row.source_id, title = ?row.title, "Post not found");
        unresolved += 1;
    }

    let department = resolve(row.department.as_deref(), |key| {
        departments.find(key).map(EntityRef::from)
    });
    if department.is_none() && !is_blank(row.department.as_deref()) {
        tracing::debug!(
            source_id = row.source_id,
            department = ?row.department,
            "Department not found"
        );
        unresolved += 1;
    }

    let employee = Employee {
        oid: Oid::unassigned(),
        integration_id: employee_key(row.source_id),
        name: row.first_name.clone().unwrap_or_default(),
        mid_name: row.middle_name.clone().unwrap_or_default(),
        last_name: row.last_name.clone().unwrap_or_default(),
        post,
        department,
    };
    (employee, unresolved)
}

fn resolve<F>(text: Option<&str>, lookup: F) -> Option<EntityRef>
where
    F: FnOnce(&str) -> Option<EntityRef>,
{
    let key = text?.trim();
    if key.is_empty() {
        return None;
    }
    lookup(key)
}

fn is_blank(text: Option<&str>) -> bool {
    text.map(|t| t.trim().is_empty()).unwrap_or(true)
}

/// Reconciles employees page by page
pub struct EmployeeSyncer<'a, R: ?Sized> {
    remote: &'a R,
}

impl<'a, R: WorkforceService + ?Sized> EmployeeSyncer<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self { remote }
    }

    pub fn sync<S: LocalStore + ?Sized>(
        &self,
        store: &S,
        ctx: &mut RunContext,
    ) -> Result<EmployeeOutcome> {
        let remote = self.remote;
        let session = ctx.session.clone();
        let include_photos = ctx.config.include_photos;
        let page_size = ctx.config.employee_page_size();
        let reload_page_size = ctx.config.reload_page_size;

        remote.heartbeat(&session)?;
        ctx.employees.reload(remote, &session, reload_page_size)?;
        ctx.departments.ensure_loaded(remote, &session, reload_page_size)?;
        ctx.posts.ensure_loaded(remote, &session, reload_page_size)?;

        let mut outcome = EmployeeOutcome {
            entities: SyncOutcome::empty(EntityKind::Employee),
            details: 0,
            pages: 0,
            unresolved_references: 0,
        };
        let mut cursor = INITIAL_CURSOR;

        loop {
            remote.heartbeat(&session)?;
            let rows = store.list_employees_page(cursor, page_size, include_photos)?;
            outcome.pages += 1;
            let fetched = rows.len();
            let last_seen = rows.iter().map(|row| row.source_id).max();

            let mut staged = Vec::with_capacity(fetched);
            for row in &rows {
                let (employee, unresolved) =
                    build_employee(row, &ctx.departments.index, &ctx.posts.index);
                outcome.unresolved_references += unresolved;
                let photo = if include_photos {
                    row.photo.clone()
                } else {
                    None
                };
                staged.push((employee, photo));
            }

            let split = partition(&ctx.employees.index, staged);
            let skipped = split.skipped_empty + split.skipped_duplicate;
            let created = materialize(remote, &session, &mut ctx.employees.index, split.fresh)?;
            let created_count = created.len();

            let batch: Vec<(Employee, Option<Vec<u8>>)> =
                split.existing.into_iter().chain(created).collect();
            let employees: Vec<Employee> = batch.iter().map(|(e, _)| e.clone()).collect();

            remote.heartbeat(&session)?;
            EntityEndpoint::<Employee>::update(remote, &session, &employees)?;
            if include_photos {
                // Rows without a photo leave the stored detail record alone
                let details: Vec<EmployeeDetailInfo> = batch
                    .into_iter()
                    .filter_map(|(employee, photo)| {
                        photo.map(|photo| EmployeeDetailInfo {
                            oid: employee.oid,
                            photo,
                        })
                    })
                    .collect();
                if !details.is_empty() {
                    remote.update_employee_details(&session, &details)?;
                    outcome.details += details.len();
                }
            }
            remote.heartbeat(&session)?;

            outcome.entities.absorb(SyncOutcome {
                kind: EntityKind::Employee,
                created: created_count,
                updated: employees.len(),
                skipped,
            });
            tracing::debug!(
                page = outcome.pages,
                cursor,
                fetched,
                created = created_count,
                "Synced employee page"
            );

            if fetched < page_size {
                break;
            }
            match last_seen {
                Some(max_id) if max_id > cursor => cursor = max_id,
                _ => return Err(BridgeError::PaginationStalled { cursor }),
            }
        }

        ctx.employees.imported = true;
        if outcome.unresolved_references > 0 {
            tracing::warn!(
                unresolved = outcome.unresolved_references,
                "Some employee posts or departments were not found and were left empty"
            );
        }
        tracing::info!(
            pages = outcome.pages,
            created = outcome.entities.created,
            updated = outcome.entities.updated,
            details = outcome.details,
            "Reconciled employees"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::remote::{MemoryService, RemoteCall};
    use crate::store::MemoryStore;
    use crate::types::{DepartmentRow, EventRow, PostRow, ReaderRow};
    use chrono::{NaiveDateTime, Utc};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Serves pre-built employee pages in order, ignoring the cursor
    struct ScriptedStore {
        pages: RefCell<VecDeque<Vec<EmployeeRow>>>,
        cursors: RefCell<Vec<i64>>,
    }

    impl ScriptedStore {
        fn new(pages: Vec<Vec<i64>>) -> Self {
            let pages = pages
                .into_iter()
                .map(|ids| ids.into_iter().map(|id| employee_row(id, None, None)).collect())
                .collect();
            Self {
                pages: RefCell::new(pages),
                cursors: RefCell::new(Vec::new()),
            }
        }
    }

    impl LocalStore for ScriptedStore {
        fn list_departments(&self) -> Result<Vec<DepartmentRow>> {
            Ok(Vec::new())
        }

        fn list_posts(&self) -> Result<Vec<PostRow>> {
            Ok(Vec::new())
        }

        fn list_registration_points(&self) -> Result<Vec<ReaderRow>> {
            Ok(Vec::new())
        }

        fn list_employees_page(
            &self,
            after_id: i64,
            _count: usize,
            _include_photo: bool,
        ) -> Result<Vec<EmployeeRow>> {
            self.cursors.borrow_mut().push(after_id);
            Ok(self.pages.borrow_mut().pop_front().unwrap_or_default())
        }

        fn list_events_since(&self, _since: NaiveDateTime) -> Result<Vec<EventRow>> {
            Ok(Vec::new())
        }
    }

    fn small_pages() -> SyncConfig {
        SyncConfig {
            page_size: 2,
            ..Default::default()
        }
    }

    fn employee_row(id: i64, dept: Option<&str>, title: Option<&str>) -> EmployeeRow {
        EmployeeRow {
            source_id: id,
            first_name: Some(format!("First{}", id)),
            middle_name: None,
            last_name: Some(format!("Last{}", id)),
            title: title.map(str::to_string),
            department: dept.map(str::to_string),
            photo: Some(vec![id as u8]),
        }
    }

    fn context(service: &MemoryService, config: SyncConfig) -> RunContext {
        let session = service.logon("sync", "pw").unwrap();
        RunContext::new(session, config, Utc::now())
    }

    #[test]
    fn test_build_employee_trims_and_resolves() {
        let mut departments = IdentityIndex::new();
        departments.add_if_not_exists(Department {
            oid: Oid::new("d-1"),
            integration_id: "IT".to_string(),
            name: "IT".to_string(),
        });
        let posts = IdentityIndex::new();

        let row = employee_row(7, Some("  IT "), Some("Engineer"));
        let (employee, unresolved) = build_employee(&row, &departments, &posts);

        assert_eq!(employee.integration_id, "7");
        assert_eq!(employee.department.unwrap().oid, Oid::new("d-1"));
        assert!(employee.post.is_none());
        assert_eq!(unresolved, 1);
    }

    #[test]
    fn test_blank_reference_is_not_unresolved() {
        let (employee, unresolved) = build_employee(
            &employee_row(1, Some("   "), None),
            &IdentityIndex::new(),
            &IdentityIndex::new(),
        );
        assert!(employee.department.is_none());
        assert_eq!(unresolved, 0);
    }

    #[test]
    fn test_missing_department_is_soft() {
        let service = MemoryService::new();
        let mut ctx = context(&service, SyncConfig::default());
        let mut store = MemoryStore::new();
        store.employees = vec![employee_row(1, Some("IT"), None)];

        let outcome = EmployeeSyncer::new(&service).sync(&store, &mut ctx).unwrap();

        assert_eq!(outcome.unresolved_references, 1);
        let stored = service.employees();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].department.is_none());
    }

    #[test]
    fn test_pagination_advances_cursor_until_short_page() {
        let service = MemoryService::new();
        let config = SyncConfig {
            page_size: 2,
            ..Default::default()
        };
        let mut ctx = context(&service, config);
        let mut store = MemoryStore::new();
        store.employees = (1..=5).map(|id| employee_row(id * 10, None, None)).collect();

        let outcome = EmployeeSyncer::new(&service).sync(&store, &mut ctx).unwrap();

        assert_eq!(store.page_requests(), vec![(-1, 2), (20, 2), (40, 2)]);
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.entities.created, 5);
        assert!(ctx.employees.imported);
    }

    #[test]
    fn test_exact_multiple_fetches_trailing_empty_page() {
        let service = MemoryService::new();
        let config = SyncConfig {
            page_size: 2,
            ..Default::default()
        };
        let mut ctx = context(&service, config);
        let mut store = MemoryStore::new();
        store.employees = (1..=4).map(|id| employee_row(id, None, None)).collect();

        let outcome = EmployeeSyncer::new(&service).sync(&store, &mut ctx).unwrap();

        assert_eq!(store.page_requests(), vec![(-1, 2), (2, 2), (4, 2)]);
        assert_eq!(outcome.entities.updated, 4);
    }

    #[test]
    fn test_photos_follow_main_update_order() {
        let service = MemoryService::new();
        let config = SyncConfig {
            include_photos: true,
            ..Default::default()
        };
        let mut store = MemoryStore::new();
        store.employees = vec![employee_row(1, None, None)];

        // First run creates employee 1
        let mut ctx = context(&service, config.clone());
        EmployeeSyncer::new(&service).sync(&store, &mut ctx).unwrap();

        // Second run: 1 exists, 2 is new
        store.employees.push(employee_row(2, None, None));
        service.clear_calls();
        let mut ctx = context(&service, config);
        let outcome = EmployeeSyncer::new(&service).sync(&store, &mut ctx).unwrap();

        assert_eq!(outcome.details, 2);
        let employees = service.employees();
        let oid_of = |key: &str| {
            employees
                .iter()
                .find(|e| e.integration_id == key)
                .map(|e| e.oid.clone())
                .unwrap()
        };
        let detail_call = service
            .calls()
            .into_iter()
            .find_map(|call| match call {
                RemoteCall::UpdateDetails { oids } => Some(oids),
                _ => None,
            })
            .unwrap();
        assert_eq!(detail_call, vec![oid_of("1"), oid_of("2")]);
        assert_eq!(service.detail_info(&oid_of("2")).unwrap().photo, vec![2]);
    }

    #[test]
    fn test_full_page_without_progress_stops() {
        let service = MemoryService::new();
        let mut ctx = context(&service, small_pages());
        let store = ScriptedStore::new(vec![vec![5, 5], vec![5, 5], vec![5, 5]]);

        let result = EmployeeSyncer::new(&service).sync(&store, &mut ctx);

        assert!(matches!(result, Err(BridgeError::PaginationStalled { cursor: 5 })));
        assert_eq!(*store.cursors.borrow(), vec![-1, 5]);
        assert!(!ctx.employees.imported);
    }

    #[test]
    fn test_id_repeated_across_pages_is_created_once() {
        let service = MemoryService::new();
        let mut ctx = context(&service, small_pages());
        let store = ScriptedStore::new(vec![vec![1, 2], vec![2, 3], vec![3]]);

        let outcome = EmployeeSyncer::new(&service).sync(&store, &mut ctx).unwrap();

        assert_eq!(*store.cursors.borrow(), vec![-1, 2, 3]);
        assert_eq!(outcome.entities.created, 3);
        let keys: Vec<String> = service
            .employees()
            .into_iter()
            .map(|e| e.integration_id)
            .collect();
        assert_eq!(keys, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_missing_photo_sends_no_detail_record() {
        let service = MemoryService::new();
        let config = SyncConfig {
            include_photos: true,
            ..Default::default()
        };
        let mut ctx = context(&service, config);
        let mut store = MemoryStore::new();
        let mut without_photo = employee_row(2, None, None);
        without_photo.photo = None;
        store.employees = vec![employee_row(1, None, None), without_photo];

        let outcome = EmployeeSyncer::new(&service).sync(&store, &mut ctx).unwrap();

        assert_eq!(outcome.details, 1);
        let sent: Vec<Vec<Oid>> = service
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::UpdateDetails { oids } => Some(oids),
                _ => None,
            })
            .collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 1);
        let with_photo = service.employees()[0].oid.clone();
        assert_eq!(sent[0][0], with_photo);
    }

    #[test]
    fn test_heartbeats_around_writes() {
        let service = MemoryService::new();
        let mut ctx = context(&service, SyncConfig::default());
        let mut store = MemoryStore::new();
        store.employees = vec![employee_row(1, None, None)];

        EmployeeSyncer::new(&service).sync(&store, &mut ctx).unwrap();

        let calls = service.calls();
        let update_at = calls
            .iter()
            .position(|call| matches!(call, RemoteCall::Update { .. }))
            .unwrap();
        assert_eq!(calls[update_at - 1], RemoteCall::Heartbeat);
        assert_eq!(calls[update_at + 1], RemoteCall::Heartbeat);
    }

    #[test]
    fn test_dependency_indexes_not_reloaded_after_import() {
        let service = MemoryService::new();
        let mut ctx = context(&service, SyncConfig::default());
        ctx.departments.imported = true;
        ctx.posts.imported = true;
        let store = MemoryStore::new();

        EmployeeSyncer::new(&service).sync(&store, &mut ctx).unwrap();

        let reloaded: Vec<EntityKind> = service
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::List { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(reloaded, vec![EntityKind::Employee]);
    }
}
