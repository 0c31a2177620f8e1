//! Workforce service abstraction
//!
//! The reconciliation engine talks to the remote service only through the
//! traits in this module. Every method is synchronous and blocking; a failed
//! call aborts the run, nothing here retries.
//!
//! - [`MemoryService`]: in-process service used by tests and dry runs
//! - [`RpcService`]: JSON-RPC over HTTP (requires the `rpc` feature)

mod memory;
#[cfg(feature = "rpc")]
mod rpc;

pub use memory::{MemoryService, RemoteCall};
#[cfg(feature = "rpc")]
pub use rpc::{RpcService, DEFAULT_TIMEOUT};

use crate::error::Result;
use crate::types::{
    Department, Employee, EmployeeDetailInfo, EventQuery, NewWorktimeEvent, Post,
    RegistrationPoint, Session, TimeZone, WorktimeEvent,
};

/// Create/update/list capability for one entity type
pub trait EntityEndpoint<T> {
    /// Create `count` blank entities; each returned entity has its Oid assigned
    fn create(&self, session: &Session, count: usize) -> Result<Vec<T>>;

    /// Persist attribute values of already created entities
    fn update(&self, session: &Session, items: &[T]) -> Result<()>;

    /// Page through the entities stored remotely
    fn list(&self, session: &Session, limit: usize, offset: usize) -> Result<Vec<T>>;
}

/// Session-scoped workforce management service
pub trait WorkforceService:
    EntityEndpoint<Department>
    + EntityEndpoint<Post>
    + EntityEndpoint<Employee>
    + EntityEndpoint<RegistrationPoint>
{
    fn logon(&self, login: &str, password: &str) -> Result<Session>;

    fn logout(&self, session: &Session) -> Result<()>;

    /// Keep-alive ping so long batches do not expire the session
    fn heartbeat(&self, session: &Session) -> Result<()>;

    fn update_employee_details(
        &self,
        session: &Session,
        details: &[EmployeeDetailInfo],
    ) -> Result<()>;

    fn time_zones(&self, session: &Session, limit: usize, offset: usize) -> Result<Vec<TimeZone>>;

    fn worktime_events(&self, session: &Session, query: &EventQuery) -> Result<Vec<WorktimeEvent>>;

    fn create_worktime_event(&self, session: &Session, event: &NewWorktimeEvent) -> Result<()>;
}

/// Fetch every entity of one type by paging until a short page
pub fn list_all<T, R>(remote: &R, session: &Session, page_size: usize) -> Result<Vec<T>>
where
    R: EntityEndpoint<T> + ?Sized,
{
    let page_size = page_size.max(1);
    let mut items = Vec::new();
    let mut offset = 0;
    loop {
        let page = remote.list(session, page_size, offset)?;
        let fetched = page.len();
        items.extend(page);
        if fetched < page_size {
            break;
        }
        offset += fetched;
    }
    Ok(items)
}

/// Fetch the whole time-zone catalog
pub fn list_time_zones<R>(remote: &R, session: &Session, page_size: usize) -> Result<Vec<TimeZone>>
where
    R: WorkforceService + ?Sized,
{
    let page_size = page_size.max(1);
    let mut zones = Vec::new();
    let mut offset = 0;
    loop {
        let page = remote.time_zones(session, page_size, offset)?;
        let fetched = page.len();
        zones.extend(page);
        if fetched < page_size {
            break;
        }
        offset += fetched;
    }
    Ok(zones)
}
