//! In-process workforce service
//!
//! Keeps entities, detail records and events in memory behind a mutex and
//! records every call, so reconciliation runs can be asserted on without a
//! network. Time zones are treated as UTC when storing events.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::{EntityEndpoint, WorkforceService};
use crate::error::{BridgeError, Result};
use crate::types::{
    Department, Employee, EmployeeDetailInfo, EntityKind, EventQuery, NewWorktimeEvent, Oid,
    Post, RegistrationPoint, Session, SyncEntity, TimeZone, WorktimeEvent,
};

/// A call received by [`MemoryService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Logon,
    Logout,
    Heartbeat,
    Create { kind: EntityKind, count: usize },
    Update { kind: EntityKind, names: Vec<String> },
    List { kind: EntityKind, limit: usize, offset: usize },
    UpdateDetails { oids: Vec<Oid> },
    TimeZones,
    WorktimeEvents,
    CreateEvent { dedup_key: String },
}

impl RemoteCall {
    fn method(&self) -> &'static str {
        match self {
            RemoteCall::Logon => "logon",
            RemoteCall::Logout => "logout",
            RemoteCall::Heartbeat => "heartbeat",
            RemoteCall::Create { .. } => "create",
            RemoteCall::Update { .. } => "update",
            RemoteCall::List { .. } => "list",
            RemoteCall::UpdateDetails { .. } => "update_details",
            RemoteCall::TimeZones => "time_zones",
            RemoteCall::WorktimeEvents => "worktime_events",
            RemoteCall::CreateEvent { .. } => "create_event",
        }
    }
}

#[derive(Default)]
struct State {
    departments: Vec<Department>,
    posts: Vec<Post>,
    employees: Vec<Employee>,
    points: Vec<RegistrationPoint>,
    details: HashMap<Oid, EmployeeDetailInfo>,
    time_zones: Vec<TimeZone>,
    events: Vec<WorktimeEvent>,
    dedup_keys: HashSet<String>,
    sessions: HashSet<String>,
    next_id: u64,
    calls: Vec<RemoteCall>,
    fail_on: Option<String>,
}

impl State {
    fn next_oid(&mut self, kind: EntityKind) -> Oid {
        self.next_id += 1;
        Oid::new(format!("{}-{:06}", kind.as_str(), self.next_id))
    }

    /// Record the call, then fail if it was armed to
    fn record(&mut self, call: RemoteCall) -> Result<()> {
        let method = call.method();
        self.calls.push(call);
        if self.fail_on.as_deref() == Some(method) {
            return Err(BridgeError::Remote(format!("{} failed", method)));
        }
        Ok(())
    }

    fn check_session(&self, session: &Session) -> Result<()> {
        if self.sessions.contains(session.token()) {
            Ok(())
        } else {
            Err(BridgeError::Remote("session is not logged on".to_string()))
        }
    }
}

/// Entities the memory service can store, with their display name for call logs
trait Stored: SyncEntity + Default {
    fn table(state: &mut State) -> &mut Vec<Self>;

    fn display_name(&self) -> String;
}

impl Stored for Department {
    fn table(state: &mut State) -> &mut Vec<Self> {
        &mut state.departments
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

impl Stored for Post {
    fn table(state: &mut State) -> &mut Vec<Self> {
        &mut state.posts
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

impl Stored for Employee {
    fn table(state: &mut State) -> &mut Vec<Self> {
        &mut state.employees
    }

    fn display_name(&self) -> String {
        self.integration_id.clone()
    }
}

impl Stored for RegistrationPoint {
    fn table(state: &mut State) -> &mut Vec<Self> {
        &mut state.points
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

/// Workforce service held entirely in memory
#[derive(Default)]
pub struct MemoryService {
    state: Mutex<State>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a time zone to the catalog
    pub fn with_time_zone(self, id: &str) -> Self {
        {
            let mut state = self.state.lock();
            let oid = Oid::new(format!("tz-{}", id.to_lowercase()));
            state.time_zones.push(TimeZone {
                oid,
                id: id.to_string(),
                name: id.to_string(),
            });
        }
        self
    }

    /// Make every subsequent call of `method` fail after being recorded
    pub fn fail_on(&self, method: &str) {
        self.state.lock().fail_on = Some(method.to_string());
    }

    /// Store an event as if it had been imported by an earlier run
    pub fn seed_event(&self, event: WorktimeEvent) {
        self.state.lock().events.push(event);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn departments(&self) -> Vec<Department> {
        self.state.lock().departments.clone()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.state.lock().posts.clone()
    }

    pub fn employees(&self) -> Vec<Employee> {
        self.state.lock().employees.clone()
    }

    pub fn registration_points(&self) -> Vec<RegistrationPoint> {
        self.state.lock().points.clone()
    }

    pub fn detail_info(&self, oid: &Oid) -> Option<EmployeeDetailInfo> {
        self.state.lock().details.get(oid).cloned()
    }

    pub fn events(&self) -> Vec<WorktimeEvent> {
        self.state.lock().events.clone()
    }

    pub fn time_zone_oid(&self, id: &str) -> Option<Oid> {
        self.state
            .lock()
            .time_zones
            .iter()
            .find(|zone| zone.id == id)
            .map(|zone| zone.oid.clone())
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }
}

impl<T: Stored> EntityEndpoint<T> for MemoryService {
    fn create(&self, session: &Session, count: usize) -> Result<Vec<T>> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.record(RemoteCall::Create {
            kind: T::KIND,
            count,
        })?;

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let mut entity = T::default();
            entity.set_oid(state.next_oid(T::KIND));
            created.push(entity);
        }
        T::table(&mut state).extend(created.iter().cloned());
        Ok(created)
    }

    fn update(&self, session: &Session, items: &[T]) -> Result<()> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.record(RemoteCall::Update {
            kind: T::KIND,
            names: items.iter().map(Stored::display_name).collect(),
        })?;

        let table = T::table(&mut state);
        for item in items {
            let slot = table
                .iter_mut()
                .find(|stored| stored.oid() == item.oid())
                .ok_or_else(|| {
                    BridgeError::Remote(format!("unknown {} oid '{}'", T::KIND, item.oid()))
                })?;
            *slot = item.clone();
        }
        Ok(())
    }

    fn list(&self, session: &Session, limit: usize, offset: usize) -> Result<Vec<T>> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.record(RemoteCall::List {
            kind: T::KIND,
            limit,
            offset,
        })?;

        Ok(T::table(&mut state)
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

impl WorkforceService for MemoryService {
    fn logon(&self, login: &str, _password: &str) -> Result<Session> {
        let mut state = self.state.lock();
        state.record(RemoteCall::Logon)?;
        state.next_id += 1;
        let token = format!("session-{}-{}", login, state.next_id);
        state.sessions.insert(token.clone());
        Ok(Session::new(token))
    }

    fn logout(&self, session: &Session) -> Result<()> {
        let mut state = self.state.lock();
        state.record(RemoteCall::Logout)?;
        state.sessions.remove(session.token());
        Ok(())
    }

    fn heartbeat(&self, session: &Session) -> Result<()> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.record(RemoteCall::Heartbeat)
    }

    fn update_employee_details(
        &self,
        session: &Session,
        details: &[EmployeeDetailInfo],
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.record(RemoteCall::UpdateDetails {
            oids: details.iter().map(|detail| detail.oid.clone()).collect(),
        })?;

        for detail in details {
            if !state.employees.iter().any(|e| e.oid == detail.oid) {
                return Err(BridgeError::Remote(format!(
                    "detail info for unknown employee '{}'",
                    detail.oid
                )));
            }
            state.details.insert(detail.oid.clone(), detail.clone());
        }
        Ok(())
    }

    fn time_zones(
        &self,
        session: &Session,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TimeZone>> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.record(RemoteCall::TimeZones)?;
        Ok(state
            .time_zones
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn worktime_events(
        &self,
        session: &Session,
        query: &EventQuery,
    ) -> Result<Vec<WorktimeEvent>> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.record(RemoteCall::WorktimeEvents)?;

        let mut matching: Vec<WorktimeEvent> = state
            .events
            .iter()
            .filter(|event| event.source_key == query.source_key)
            .filter(|event| event.time_utc >= query.from && event.time_utc <= query.to)
            .cloned()
            .collect();
        matching.sort_by_key(|event| event.time_utc);
        if query.descending {
            matching.reverse();
        }
        matching.truncate(query.count);
        Ok(matching)
    }

    fn create_worktime_event(&self, session: &Session, event: &NewWorktimeEvent) -> Result<()> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.record(RemoteCall::CreateEvent {
            dedup_key: event.dedup_key.clone(),
        })?;

        if !state.dedup_keys.insert(event.dedup_key.clone()) {
            return Ok(());
        }
        state.events.push(WorktimeEvent {
            employee_oid: event.employee_oid.clone(),
            registration_point_oid: event.registration_point_oid.clone(),
            time_utc: event.timestamp.and_utc(),
            time_zone_oid: event.time_zone_oid.clone(),
            source_key: event.source_key.clone(),
        });
        Ok(())
    }
}
