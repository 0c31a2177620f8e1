//! Incremental attendance event import
//!
//! There is no local cursor. The high-water mark is the newest event the
//! workforce service holds for our source key; everything from seven days
//! before it is sent again. Delivery is therefore at-least-once at the
//! boundary, and each event carries a dedup key so the service can drop
//! repeats.
//!
//! The import runs in two phases:
//! 1. Bootstrapping: make sure employee and reader indexes exist, resolve
//!    the time zone, derive the fetch window.
//! 2. Streaming: one create call per source event, in source order.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::context::RunContext;
use crate::error::{BridgeError, Result};
use crate::remote::{list_time_zones, WorkforceService};
use crate::store::LocalStore;
use crate::types::{employee_key, EntityKind, EventQuery, NewWorktimeEvent, Oid, SyncEntity};

/// Where streaming starts and which zone events are written in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportWindow {
    pub time_zone_oid: Oid,
    /// Newest event already stored remotely for this source key
    pub high_water_mark: Option<DateTime<Utc>>,
    /// Source events at or after this instant are sent
    pub fetch_start: NaiveDateTime,
}

/// Result of an event import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventImportReport {
    /// None when the import was skipped because an index was empty
    pub window: Option<ImportWindow>,
    pub imported: usize,
}

impl EventImportReport {
    pub fn skipped(&self) -> bool {
        self.window.is_none()
    }
}

/// First source timestamp to fetch
///
/// Without a prior event the window starts at `epoch`; otherwise it starts
/// `overlap` before the high-water mark.
pub fn fetch_start(
    high_water_mark: Option<DateTime<Utc>>,
    epoch: NaiveDateTime,
    overlap: Duration,
) -> NaiveDateTime {
    match high_water_mark {
        None => epoch,
        Some(last) => last.naive_utc() - overlap,
    }
}

/// Stable identity of a source event for the service's duplicate check
pub fn dedup_key(
    source_key: &str,
    employee_key: &str,
    reader_address: &str,
    timestamp: NaiveDateTime,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_key.as_bytes());
    hasher.update(b"|");
    hasher.update(employee_key.as_bytes());
    hasher.update(b"|");
    hasher.update(reader_address.as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Imports source events into the workforce service
pub struct EventImporter<'a, R: ?Sized> {
    remote: &'a R,
}

impl<'a, R: WorkforceService + ?Sized> EventImporter<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self { remote }
    }

    pub fn import<S: LocalStore + ?Sized>(
        &self,
        store: &S,
        ctx: &mut RunContext,
    ) -> Result<EventImportReport> {
        match self.bootstrap(ctx)? {
            None => Ok(EventImportReport {
                window: None,
                imported: 0,
            }),
            Some(window) => {
                let imported = self.stream(store, ctx, &window)?;
                Ok(EventImportReport {
                    window: Some(window),
                    imported,
                })
            }
        }
    }

    /// Prepare indexes and derive the import window
    ///
    /// Returns `None` when there are no employees or no registration points
    /// to attach events to.
    pub fn bootstrap(&self, ctx: &mut RunContext) -> Result<Option<ImportWindow>> {
        let remote = self.remote;
        let session = ctx.session.clone();
        let page_size = ctx.config.reload_page_size;

        remote.heartbeat(&session)?;
        ctx.employees.ensure_loaded(remote, &session, page_size)?;
        ctx.registration_points.ensure_loaded(remote, &session, page_size)?;
        if ctx.employees.index.is_empty() || ctx.registration_points.index.is_empty() {
            tracing::info!(
                employees = ctx.employees.index.len(),
                registration_points = ctx.registration_points.index.len(),
                "Nothing to attach events to, skipping event import"
            );
            return Ok(None);
        }

        let zone_id = &ctx.config.time_zone_id;
        let time_zone_oid = list_time_zones(remote, &session, page_size)?
            .into_iter()
            .find(|zone| &zone.id == zone_id)
            .map(|zone| zone.oid)
            .ok_or_else(|| BridgeError::TimeZoneNotFound(zone_id.clone()))?;

        let today = ctx
            .started_at
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(ctx.started_at);
        let query = EventQuery {
            from: ctx.config.epoch.and_utc(),
            to: today,
            time_zone_oid: time_zone_oid.clone(),
            filter: None,
            count: 1,
            descending: true,
            source_key: ctx.config.source_key.clone(),
        };
        let high_water_mark = remote
            .worktime_events(&session, &query)?
            .into_iter()
            .next()
            .map(|event| event.time_utc);

        let window = ImportWindow {
            time_zone_oid,
            high_water_mark,
            fetch_start: fetch_start(
                high_water_mark,
                ctx.config.epoch,
                Duration::days(ctx.config.overlap_days),
            ),
        };
        tracing::info!(
            high_water_mark = ?window.high_water_mark,
            fetch_start = %window.fetch_start,
            "Derived event import window"
        );
        Ok(Some(window))
    }

    /// Send every source event in the window, one call per event
    pub fn stream<S: LocalStore + ?Sized>(
        &self,
        store: &S,
        ctx: &RunContext,
        window: &ImportWindow,
    ) -> Result<usize> {
        let rows = store.list_events_since(window.fetch_start)?;
        let mut imported = 0;

        for row in &rows {
            let person = employee_key(row.source_id);
            let employee = ctx.employees.index.find(&person).ok_or_else(|| {
                BridgeError::UnresolvedReference {
                    kind: EntityKind::Employee,
                    key: person.clone(),
                }
            })?;
            let point = ctx
                .registration_points
                .index
                .find(&row.reader_address)
                .ok_or_else(|| BridgeError::UnresolvedReference {
                    kind: EntityKind::RegistrationPoint,
                    key: row.reader_address.clone(),
                })?;

            let event = NewWorktimeEvent {
                source_key: ctx.config.source_key.clone(),
                employee_oid: employee.oid().clone(),
                registration_point_oid: point.oid().clone(),
                timestamp: row.occurred_at,
                time_zone_oid: window.time_zone_oid.clone(),
                dedup_key: dedup_key(
                    &ctx.config.source_key,
                    &person,
                    &row.reader_address,
                    row.occurred_at,
                ),
            };
            self.remote.create_worktime_event(&ctx.session, &event)?;
            imported += 1;
        }

        tracing::info!(imported, "Imported attendance events");
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SyncConfig, DEFAULT_SOURCE_KEY};
    use crate::remote::{MemoryService, RemoteCall};
    use crate::store::MemoryStore;
    use crate::types::{Employee, EventRow, RegistrationPoint, WorktimeEvent};
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_fetch_start_without_prior_event_is_epoch() {
        let epoch = at(1900, 1, 1, 0);
        assert_eq!(fetch_start(None, epoch, Duration::days(7)), epoch);
    }

    #[test]
    fn test_fetch_start_overlaps_seven_days() {
        let last = at(2024, 3, 10, 8).and_utc();
        let start = fetch_start(Some(last), at(1900, 1, 1, 0), Duration::days(7));
        assert_eq!(start, at(2024, 3, 3, 8));
    }

    #[test]
    fn test_dedup_key_is_stable_and_distinct() {
        let a = dedup_key("src", "1", "17", at(2024, 3, 1, 8));
        let b = dedup_key("src", "1", "17", at(2024, 3, 1, 8));
        let c = dedup_key("src", "1", "17", at(2024, 3, 1, 9));
        let d = dedup_key("src", "11", "7", at(2024, 3, 1, 8));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
    }

    fn seeded_context(service: &MemoryService) -> RunContext {
        let session = service.logon("sync", "pw").unwrap();
        let mut ctx = RunContext::new(session, SyncConfig::default(), Utc::now());
        ctx.employees.index.add_if_not_exists(Employee {
            oid: Oid::new("e-1"),
            integration_id: "1".to_string(),
            ..Default::default()
        });
        ctx.employees.imported = true;
        ctx.registration_points
            .index
            .add_if_not_exists(RegistrationPoint {
                oid: Oid::new("p-1"),
                integration_id: "17".to_string(),
                name: "Lobby".to_string(),
            });
        ctx.registration_points.imported = true;
        ctx
    }

    fn event(source_id: i64, reader: &str, occurred_at: NaiveDateTime) -> EventRow {
        EventRow {
            source_id,
            reader_address: reader.to_string(),
            occurred_at,
        }
    }

    #[test]
    fn test_streams_events_in_source_order() {
        let service = MemoryService::new().with_time_zone("UTC");
        let mut ctx = seeded_context(&service);
        let mut store = MemoryStore::new();
        store.events = vec![
            event(1, "17", at(2024, 3, 1, 8)),
            event(1, "17", at(2024, 3, 1, 17)),
        ];

        let report = EventImporter::new(&service).import(&store, &mut ctx).unwrap();

        assert_eq!(report.imported, 2);
        let stored = service.events();
        assert_eq!(stored[0].employee_oid, Oid::new("e-1"));
        assert_eq!(stored[1].time_utc, at(2024, 3, 1, 17).and_utc());
        assert!(!service
            .calls()
            .iter()
            .any(|call| matches!(call, RemoteCall::List { .. })));
    }

    #[test]
    fn test_unknown_employee_fails() {
        let service = MemoryService::new().with_time_zone("UTC");
        let mut ctx = seeded_context(&service);
        let mut store = MemoryStore::new();
        store.events = vec![event(2, "17", at(2024, 3, 1, 8))];

        let err = EventImporter::new(&service)
            .import(&store, &mut ctx)
            .unwrap_err();

        match err {
            BridgeError::UnresolvedReference { kind, key } => {
                assert_eq!(kind, EntityKind::Employee);
                assert_eq!(key, "2");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_high_water_mark_ignores_other_sources() {
        let service = MemoryService::new().with_time_zone("UTC");
        let tz = service.time_zone_oid("UTC").unwrap();
        for (source_key, day) in [(DEFAULT_SOURCE_KEY, 10), ("payroll-import", 20)] {
            service.seed_event(WorktimeEvent {
                employee_oid: Oid::new("e-1"),
                registration_point_oid: Oid::new("p-1"),
                time_utc: at(2024, 3, day, 8).and_utc(),
                time_zone_oid: tz.clone(),
                source_key: source_key.to_string(),
            });
        }
        let mut ctx = seeded_context(&service);

        let window = EventImporter::new(&service)
            .bootstrap(&mut ctx)
            .unwrap()
            .unwrap();

        assert_eq!(window.high_water_mark, Some(at(2024, 3, 10, 8).and_utc()));
        assert_eq!(window.fetch_start, at(2024, 3, 3, 8));
        assert_eq!(window.time_zone_oid, tz);
    }
}
