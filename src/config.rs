//! Run configuration and the XML settings document
//!
//! `SyncConfig` tunes a sync run. `BridgeSettings` is the flat settings
//! document exchanged with the host: a single root element with one
//! text-valued child per setting.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Source key tagging events written by this integration
pub const DEFAULT_SOURCE_KEY: &str = "access-control-bridge";

/// Steps of a sync run, in the order they execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    Departments,
    Posts,
    Employees,
    RegistrationPoints,
    Events,
}

impl SyncStep {
    pub const ALL: [SyncStep; 5] = [
        SyncStep::Departments,
        SyncStep::Posts,
        SyncStep::Employees,
        SyncStep::RegistrationPoints,
        SyncStep::Events,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::Departments => "departments",
            SyncStep::Posts => "posts",
            SyncStep::Employees => "employees",
            SyncStep::RegistrationPoints => "registration_points",
            SyncStep::Events => "events",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStep {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "departments" => Ok(SyncStep::Departments),
            "posts" | "titles" => Ok(SyncStep::Posts),
            "employees" => Ok(SyncStep::Employees),
            "registration_points" | "readers" => Ok(SyncStep::RegistrationPoints),
            "events" => Ok(SyncStep::Events),
            _ => Err(format!("Unknown sync step: {}", s)),
        }
    }
}

/// Tuning for a sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Tag written on every imported event and used to find the high-water mark
    #[serde(default = "default_source_key")]
    pub source_key: String,
    /// Propagate employee photos as detail records
    #[serde(default)]
    pub include_photos: bool,
    /// Employee page size when photos are included
    #[serde(default = "default_photo_page_size")]
    pub photo_page_size: usize,
    /// Employee page size without photos
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Page size used when reloading indexes from the workforce service
    #[serde(default = "default_reload_page_size")]
    pub reload_page_size: usize,
    /// Days of already imported events that are re-sent on every run
    #[serde(default = "default_overlap_days")]
    pub overlap_days: i64,
    /// Start of the event window when nothing has been imported yet
    #[serde(default = "default_epoch")]
    pub epoch: NaiveDateTime,
    /// Local time-zone id, matched exactly against the remote catalog
    #[serde(default = "default_time_zone")]
    pub time_zone_id: String,
    /// Steps to run; executed in their fixed order regardless of listing order
    #[serde(default = "default_steps")]
    pub steps: Vec<SyncStep>,
}

fn default_source_key() -> String {
    DEFAULT_SOURCE_KEY.to_string()
}

fn default_photo_page_size() -> usize {
    1000
}

fn default_page_size() -> usize {
    2000
}

fn default_reload_page_size() -> usize {
    10_000
}

fn default_overlap_days() -> i64 {
    7
}

fn default_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_steps() -> Vec<SyncStep> {
    SyncStep::ALL.to_vec()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_key: default_source_key(),
            include_photos: false,
            photo_page_size: default_photo_page_size(),
            page_size: default_page_size(),
            reload_page_size: default_reload_page_size(),
            overlap_days: default_overlap_days(),
            epoch: default_epoch(),
            time_zone_id: default_time_zone(),
            steps: default_steps(),
        }
    }
}

impl SyncConfig {
    /// Employee page size for the current photo setting
    pub fn employee_page_size(&self) -> usize {
        if self.include_photos {
            self.photo_page_size
        } else {
            self.page_size
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_key.trim().is_empty() {
            return Err(BridgeError::Config("source key must not be empty".to_string()));
        }
        if self.page_size == 0 || self.photo_page_size == 0 || self.reload_page_size == 0 {
            return Err(BridgeError::Config("page sizes must be positive".to_string()));
        }
        if self.overlap_days < 0 {
            return Err(BridgeError::Config(
                "overlap days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

const ROOT_ELEMENT: &str = "ROOT";
const SOURCE_CONNECTION: &str = "SourceConnectionString";
const SERVICE_LOGIN: &str = "ServiceLogin";
const SERVICE_PASSWORD: &str = "ServicePassword";
const SERVICE_ADDRESS: &str = "ServiceAddress";

/// Connection settings exchanged as an XML document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Connection string (a file path for SQLite) of the access-control database
    pub source_connection: String,
    pub service_login: String,
    pub service_password: String,
    /// Base URL of the workforce service endpoint
    pub service_address: String,
}

impl BridgeSettings {
    /// Parse a settings document
    ///
    /// An empty document yields `None`; a document missing any setting is an
    /// error.
    pub fn from_xml(xml: &str) -> Result<Option<Self>> {
        if xml.trim().is_empty() {
            return Ok(None);
        }

        // Setting values are kept verbatim, surrounding spaces included
        let mut reader = Reader::from_str(xml);

        // Element name -> text; elements without text map to ""
        let mut values: HashMap<String, String> = HashMap::new();
        let mut current: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    current = Some(element_name(e.local_name().as_ref())?);
                }
                Ok(Event::Empty(e)) => {
                    values.entry(element_name(e.local_name().as_ref())?).or_default();
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| BridgeError::Settings(e.to_string()))?;
                    match &current {
                        Some(name) if name != ROOT_ELEMENT => {
                            values.insert(name.clone(), text.into_owned());
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(e)) => {
                    let name = element_name(e.local_name().as_ref())?;
                    if name != ROOT_ELEMENT {
                        values.entry(name).or_default();
                    }
                    current = None;
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(BridgeError::Settings(format!(
                        "malformed settings at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
        }

        let mut require = |name: &str| {
            values
                .remove(name)
                .ok_or_else(|| BridgeError::Settings(format!("missing <{}> element", name)))
        };

        Ok(Some(Self {
            source_connection: require(SOURCE_CONNECTION)?,
            service_login: require(SERVICE_LOGIN)?,
            service_password: require(SERVICE_PASSWORD)?,
            service_address: require(SERVICE_ADDRESS)?,
        }))
    }

    /// Render the settings document
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());

        write_xml(&mut writer, Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
        for (name, value) in [
            (SOURCE_CONNECTION, &self.source_connection),
            (SERVICE_LOGIN, &self.service_login),
            (SERVICE_PASSWORD, &self.service_password),
            (SERVICE_ADDRESS, &self.service_address),
        ] {
            write_xml(&mut writer, Event::Start(BytesStart::new(name)))?;
            write_xml(&mut writer, Event::Text(BytesText::new(value)))?;
            write_xml(&mut writer, Event::End(BytesEnd::new(name)))?;
        }
        write_xml(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

        String::from_utf8(writer.into_inner()).map_err(|e| BridgeError::Settings(e.to_string()))
    }

    /// Load a settings file; an empty file yields `None`
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let xml = std::fs::read_to_string(path)?;
        Self::from_xml(&xml)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_xml()?)?;
        Ok(())
    }
}

fn element_name(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| BridgeError::Settings(e.to_string()))
}

fn write_xml(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| BridgeError::Settings(e.to_string()))
}
