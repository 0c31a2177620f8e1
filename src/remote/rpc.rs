//! JSON-RPC 2.0 client for the workforce service
//!
//! Every operation is one blocking POST to the service endpoint. A response
//! carrying an `error` object becomes [`BridgeError::Remote`]; transport
//! failures surface as [`BridgeError::Http`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{EntityEndpoint, WorkforceService};
use crate::error::{BridgeError, Result};
use crate::types::{
    Department, Employee, EmployeeDetailInfo, EventQuery, NewWorktimeEvent, Post,
    RegistrationPoint, Session, TimeZone, WorktimeEvent,
};

/// Per-request timeout; large batches of photos can take minutes
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Turn a decoded response into the method's result
fn decode<T: DeserializeOwned>(method: &str, response: RpcResponse) -> Result<T> {
    if let Some(error) = response.error {
        return Err(BridgeError::Remote(format!(
            "{} failed ({}): {}",
            method, error.code, error.message
        )));
    }
    Ok(serde_json::from_value(response.result.unwrap_or(Value::Null))?)
}

/// Entity collections exposed by the service as `Create*`, `Update*` and
/// `GetPack*` methods
trait RemoteCollection: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;
}

impl RemoteCollection for Department {
    const COLLECTION: &'static str = "Departments";
}

impl RemoteCollection for Post {
    const COLLECTION: &'static str = "Posts";
}

impl RemoteCollection for Employee {
    const COLLECTION: &'static str = "Employees";
}

impl RemoteCollection for RegistrationPoint {
    const COLLECTION: &'static str = "RegistrationPoints";
}

/// Workforce service reached over HTTP
pub struct RpcService {
    client: reqwest::blocking::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl RpcService {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(BridgeError::Config(
                "workforce service address is empty".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        tracing::trace!(method, id = request.id, "Sending RPC request");

        let response = self.client.post(&self.endpoint).json(&request).send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(BridgeError::Remote(format!(
                "{} returned status {}: {}",
                method, status, body
            )));
        }

        let response: RpcResponse = response.json()?;
        decode(method, response)
    }
}

impl<T: RemoteCollection> EntityEndpoint<T> for RpcService {
    fn create(&self, session: &Session, count: usize) -> Result<Vec<T>> {
        self.call(
            &format!("Create{}", T::COLLECTION),
            json!({ "session": session.token(), "count": count }),
        )
    }

    fn update(&self, session: &Session, items: &[T]) -> Result<()> {
        self.call(
            &format!("Update{}", T::COLLECTION),
            json!({ "session": session.token(), "items": items }),
        )
    }

    fn list(&self, session: &Session, limit: usize, offset: usize) -> Result<Vec<T>> {
        self.call(
            &format!("GetPack{}", T::COLLECTION),
            json!({ "session": session.token(), "limit": limit, "offset": offset }),
        )
    }
}

impl WorkforceService for RpcService {
    fn logon(&self, login: &str, password: &str) -> Result<Session> {
        let token: String = self.call("Logon", json!({ "login": login, "password": password }))?;
        Ok(Session::new(token))
    }

    fn logout(&self, session: &Session) -> Result<()> {
        self.call("Logout", json!({ "session": session.token() }))
    }

    fn heartbeat(&self, session: &Session) -> Result<()> {
        self.call("Heartbeat", json!({ "session": session.token() }))
    }

    fn update_employee_details(
        &self,
        session: &Session,
        details: &[EmployeeDetailInfo],
    ) -> Result<()> {
        self.call(
            "UpdateEmployeeDetailInfos",
            json!({ "session": session.token(), "items": details }),
        )
    }

    fn time_zones(&self, session: &Session, limit: usize, offset: usize) -> Result<Vec<TimeZone>> {
        self.call(
            "GetPackTimeZones",
            json!({ "session": session.token(), "limit": limit, "offset": offset }),
        )
    }

    fn worktime_events(&self, session: &Session, query: &EventQuery) -> Result<Vec<WorktimeEvent>> {
        self.call(
            "GetWorktimeEvents",
            json!({ "session": session.token(), "query": query }),
        )
    }

    fn create_worktime_event(&self, session: &Session, event: &NewWorktimeEvent) -> Result<()> {
        self.call(
            "CreateWorktimeEvent",
            json!({ "session": session.token(), "event": event }),
        )
    }
}
