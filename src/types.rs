//! Core types for the attendance bridge
//!
//! Remote entities mirror what the workforce service stores; source rows
//! mirror what the access-control database returns.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier assigned by the workforce service
///
/// An empty Oid means the entity has not been created remotely yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(String);

impl Oid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Oid of an entity that does not exist remotely yet
    pub fn unassigned() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logon token for the workforce service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session(String);

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

/// Kinds of entities reconciled against the workforce service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Department,
    Post,
    Employee,
    RegistrationPoint,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Department => "department",
            EntityKind::Post => "post",
            EntityKind::Employee => "employee",
            EntityKind::RegistrationPoint => "registration_point",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote entity that can be matched to source rows by a business key
pub trait SyncEntity: Clone {
    const KIND: EntityKind;

    fn oid(&self) -> &Oid;

    fn set_oid(&mut self, oid: Oid);

    /// Natural key used to match source rows; empty means "cannot be matched"
    fn business_key(&self) -> &str;
}

/// Department in the workforce service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    #[serde(default)]
    pub oid: Oid,
    #[serde(default)]
    pub integration_id: String,
    #[serde(default)]
    pub name: String,
}

impl Department {
    /// Department named after a source value; the name doubles as integration id
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            oid: Oid::unassigned(),
            integration_id: name.clone(),
            name,
        }
    }
}

impl SyncEntity for Department {
    const KIND: EntityKind = EntityKind::Department;

    fn oid(&self) -> &Oid {
        &self.oid
    }

    fn set_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }

    fn business_key(&self) -> &str {
        &self.name
    }
}

/// Post (job title) in the workforce service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub oid: Oid,
    #[serde(default)]
    pub integration_id: String,
    #[serde(default)]
    pub name: String,
}

impl Post {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            oid: Oid::unassigned(),
            integration_id: name.clone(),
            name,
        }
    }
}

impl SyncEntity for Post {
    const KIND: EntityKind = EntityKind::Post;

    fn oid(&self) -> &Oid {
        &self.oid
    }

    fn set_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }

    fn business_key(&self) -> &str {
        &self.name
    }
}

/// Reader or door controller that registers passes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPoint {
    #[serde(default)]
    pub oid: Oid,
    /// Device address in the access-control network
    #[serde(default)]
    pub integration_id: String,
    #[serde(default)]
    pub name: String,
}

impl SyncEntity for RegistrationPoint {
    const KIND: EntityKind = EntityKind::RegistrationPoint;

    fn oid(&self) -> &Oid {
        &self.oid
    }

    fn set_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }

    fn business_key(&self) -> &str {
        &self.integration_id
    }
}

/// Weak reference from an employee to a department or post
///
/// Produced by an index lookup at the time the employee is built; it is a
/// copy of the Oid and name, never a handle into the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub oid: Oid,
    pub name: String,
}

impl From<&Department> for EntityRef {
    fn from(department: &Department) -> Self {
        Self {
            oid: department.oid.clone(),
            name: department.name.clone(),
        }
    }
}

impl From<&Post> for EntityRef {
    fn from(post: &Post) -> Self {
        Self {
            oid: post.oid.clone(),
            name: post.name.clone(),
        }
    }
}

/// Employee in the workforce service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    #[serde(default)]
    pub oid: Oid,
    /// Source numeric id in decimal
    #[serde(default)]
    pub integration_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mid_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub post: Option<EntityRef>,
    #[serde(default)]
    pub department: Option<EntityRef>,
}

impl SyncEntity for Employee {
    const KIND: EntityKind = EntityKind::Employee;

    fn oid(&self) -> &Oid {
        &self.oid
    }

    fn set_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }

    fn business_key(&self) -> &str {
        &self.integration_id
    }
}

/// Detail record paired 1:1 with an employee, carrying the photo
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDetailInfo {
    #[serde(default)]
    pub oid: Oid,
    #[serde(default)]
    pub photo: Vec<u8>,
}

/// Entry of the workforce service's time-zone catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeZone {
    pub oid: Oid,
    /// Platform time-zone identifier, matched exactly
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Attendance event as stored by the workforce service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktimeEvent {
    pub employee_oid: Oid,
    pub registration_point_oid: Oid,
    pub time_utc: DateTime<Utc>,
    pub time_zone_oid: Oid,
    pub source_key: String,
}

/// Event to be written to the workforce service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorktimeEvent {
    pub source_key: String,
    pub employee_oid: Oid,
    pub registration_point_oid: Oid,
    /// Source timestamp, interpreted in `time_zone_oid` by the service
    pub timestamp: NaiveDateTime,
    pub time_zone_oid: Oid,
    /// Stable key the service can use to ignore repeated deliveries
    pub dedup_key: String,
}

/// Query for worktime events already stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub time_zone_oid: Oid,
    pub filter: Option<String>,
    pub count: usize,
    pub descending: bool,
    pub source_key: String,
}

// ============================================================================
// Source rows
// ============================================================================

/// Department row from the access-control database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentRow {
    pub value: Option<String>,
}

/// Title row from the access-control database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRow {
    pub value: Option<String>,
}

/// Reader row from the access-control database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderRow {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Employee row from the access-control database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRow {
    pub source_id: i64,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    /// Only populated when the page was requested with photos
    #[serde(default)]
    pub photo: Option<Vec<u8>>,
}

/// Pass event row from the access-control database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    /// Source id of the employee who passed
    pub source_id: i64,
    /// Address of the reader that registered the pass
    pub reader_address: String,
    pub occurred_at: NaiveDateTime,
}

/// Turns a source row into a fresh remote entity with an unassigned Oid
pub trait SourceRow {
    type Entity: SyncEntity;

    fn to_entity(&self) -> Self::Entity;
}

impl SourceRow for DepartmentRow {
    type Entity = Department;

    fn to_entity(&self) -> Department {
        Department::named(self.value.clone().unwrap_or_default())
    }
}

impl SourceRow for PostRow {
    type Entity = Post;

    fn to_entity(&self) -> Post {
        Post::named(self.value.clone().unwrap_or_default())
    }
}

impl SourceRow for ReaderRow {
    type Entity = RegistrationPoint;

    fn to_entity(&self) -> RegistrationPoint {
        RegistrationPoint {
            oid: Oid::unassigned(),
            integration_id: self.address.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
        }
    }
}

/// Business key of an employee from its source id
pub fn employee_key(source_id: i64) -> String {
    source_id.to_string()
}
