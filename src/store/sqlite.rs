//! SQLite reader for the access-control database
//!
//! Opens the database read-only. Timestamps are stored as text in
//! `YYYY-MM-DD HH:MM:SS` form, which also orders correctly as a string.

use std::path::Path;

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, Row};

use super::LocalStore;
use crate::error::{BridgeError, Result};
use crate::types::{DepartmentRow, EmployeeRow, EventRow, PostRow, ReaderRow};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Read-only connection to the access-control database
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open an existing database file read-only
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BridgeError::Config(format!(
                "source database not found: {}",
                path.display()
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        Self::from_connection(conn)
    }

    /// Wrap an already open connection
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA busy_timeout=30000;
            PRAGMA query_only=ON;
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query<T, F>(&self, sql: &str, params: impl rusqlite::Params, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }
}

/// Parse a source timestamp, accepting fractional seconds and a `T` separator
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let normalized = value.trim().replacen('T', " ", 1);
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| BridgeError::Store(format!("invalid timestamp '{}': {}", value, e)))
}

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

fn employee_from_row(row: &Row, include_photo: bool) -> rusqlite::Result<EmployeeRow> {
    Ok(EmployeeRow {
        source_id: row.get("host_user_id")?,
        first_name: row.get("first_name")?,
        middle_name: row.get("middle_name")?,
        last_name: row.get("last_name")?,
        title: row.get("title")?,
        department: row.get("dept")?,
        photo: if include_photo {
            row.get("photo")?
        } else {
            None
        },
    })
}

impl LocalStore for SqliteStore {
    fn list_departments(&self) -> Result<Vec<DepartmentRow>> {
        self.query("SELECT value FROM departments", [], |row| {
            Ok(DepartmentRow { value: row.get(0)? })
        })
    }

    fn list_posts(&self) -> Result<Vec<PostRow>> {
        self.query("SELECT value FROM titles", [], |row| {
            Ok(PostRow { value: row.get(0)? })
        })
    }

    fn list_registration_points(&self) -> Result<Vec<ReaderRow>> {
        self.query(
            "SELECT name, CAST(address AS TEXT) FROM readers",
            [],
            |row| {
                Ok(ReaderRow {
                    name: row.get(0)?,
                    address: row.get(1)?,
                })
            },
        )
    }

    fn list_employees_page(
        &self,
        after_id: i64,
        count: usize,
        include_photo: bool,
    ) -> Result<Vec<EmployeeRow>> {
        let sql = if include_photo {
            "SELECT host_user_id, first_name, middle_name, last_name, title, dept, photo
             FROM employees WHERE host_user_id > ?1 ORDER BY host_user_id LIMIT ?2"
        } else {
            "SELECT host_user_id, first_name, middle_name, last_name, title, dept
             FROM employees WHERE host_user_id > ?1 ORDER BY host_user_id LIMIT ?2"
        };
        self.query(sql, params![after_id, count as i64], |row| {
            employee_from_row(row, include_photo)
        })
    }

    fn list_events_since(&self, since: NaiveDateTime) -> Result<Vec<EventRow>> {
        let raw: Vec<(i64, String, String)> = self.query(
            "SELECT host_user_id, CAST(net_address AS TEXT), occurred_at
             FROM events WHERE replace(occurred_at, 'T', ' ') >= ?1
             ORDER BY replace(occurred_at, 'T', ' '), rowid",
            params![format_timestamp(since)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        raw.into_iter()
            .map(|(source_id, reader_address, occurred_at)| {
                Ok(EventRow {
                    source_id,
                    reader_address,
                    occurred_at: parse_timestamp(&occurred_at)?,
                })
            })
            .collect()
    }
}
