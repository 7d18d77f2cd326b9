/*!
 * An in-memory controller.
 *
 * [`SimulatedController`] implements [`Transport`] by answering requests the
 * way a SNAP PAC or Groov EPIC controller would: it serves device and strategy
 * details, keeps tag values, and enforces the dialect's base path and
 * authentication. It is used by tests and demos that should not need real
 * hardware.
 */
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::trace;

use crate::dialect::Dialect;
use crate::endpoints::{ApiRequest, Method, TableRange};
use crate::error::{DeviceError, Result};
use crate::kinds::DataKind;
use crate::transport::{ApiResponse, Auth, HttpRequest, Transport};

#[derive(Debug, Clone)]
struct Tag {
    kind: DataKind,
    name: String,
    value: Value,
}

#[derive(Debug, Default)]
struct SimState {
    // Keyed by the relative path of the single-tag request.
    tags: BTreeMap<String, Tag>,
    requests: Vec<HttpRequest>,
    failures: VecDeque<DeviceError>,
    latency: Option<Duration>,
}

/// A simulated controller speaking one dialect
#[derive(Debug)]
pub struct SimulatedController {
    dialect: Dialect,
    key: String,
    secret: String,
    controller_type: String,
    state: Mutex<SimState>,
}

impl SimulatedController {
    /// A SNAP PAC controller accepting the given API key
    pub fn snap<K: Into<String>, S: Into<String>>(key: K, secret: S) -> Self {
        Self::new(Dialect::Snap, key.into(), secret.into(), "SNAP-PAC-R1")
    }

    /// A Groov EPIC controller accepting the given API key value
    pub fn groov<S: Into<String>>(secret: S) -> Self {
        Self::new(Dialect::Groov, String::new(), secret.into(), "groov EPIC PR1")
    }

    fn new(dialect: Dialect, key: String, secret: String, controller_type: &str) -> Self {
        Self {
            dialect,
            key,
            secret,
            controller_type: controller_type.to_string(),
            state: Mutex::new(SimState::default()),
        }
    }

    /// The dialect the simulator speaks
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Define or overwrite a tag
    pub fn set_value(&self, kind: DataKind, name: &str, value: Value) {
        let path = ApiRequest::read(kind, Some(name), TableRange::default()).path();
        self.lock().tags.insert(
            path,
            Tag {
                kind,
                name: name.to_string(),
                value,
            },
        );
    }

    /// Current value of a tag
    pub fn value(&self, kind: DataKind, name: &str) -> Option<Value> {
        let path = ApiRequest::read(kind, Some(name), TableRange::default()).path();
        self.lock().tags.get(&path).map(|tag| tag.value.clone())
    }

    /// Fail the next request with `err` before it reaches the controller logic
    pub fn fail_next(&self, err: DeviceError) {
        self.lock().failures.push_back(err);
    }

    /// Delay every response
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn authorized(&self, auth: &Auth) -> bool {
        match (self.dialect, auth) {
            (Dialect::Snap, Auth::Basic { user, password }) => {
                *user == self.key && *password == self.secret
            }
            (Dialect::Groov, Auth::ApiKeyHeader(key)) => *key == self.secret,
            _ => false,
        }
    }

    fn answer(&self, request: &HttpRequest) -> ApiResponse {
        let base = self.dialect.base_path();
        let path = match request.url.path().strip_prefix(base) {
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => return ApiResponse::new(404, json!("Not Found")),
        };

        if !self.authorized(&request.auth) {
            return ApiResponse::new(401, json!("Unauthorized"));
        }

        let query = |name: &str| {
            request
                .query
                .iter()
                .find(|(k, _)| k == name)
                .and_then(|(_, v)| v.parse::<usize>().ok())
        };

        match (request.method, path.as_str()) {
            (Method::Get, "/device") => ApiResponse::new(
                200,
                json!({
                    "controllerType": self.controller_type,
                    "firmwareVersion": "R10.5a",
                    "mac1": "00-A0-3D-00-00-01",
                    "upTimeSeconds": 1234.5
                }),
            ),
            (Method::Get, "/device/strategy") => ApiResponse::new(
                200,
                json!({"strategyName": "demo", "date": "2026-01-01", "time": "12:00:00", "crc": "0"}),
            ),
            (Method::Get, _) => self.read(&path, query("startIndex"), query("numElements")),
            (Method::Post, _) => self.write(&path, query("startIndex"), request.body.clone()),
        }
    }

    fn read(&self, path: &str, start: Option<usize>, count: Option<usize>) -> ApiResponse {
        let state = self.lock();

        if let Some(tag) = state.tags.get(path) {
            if tag.kind.is_table() {
                let items = tag.value.as_array().cloned().unwrap_or_default();
                let start = start.unwrap_or(0).min(items.len());
                let end = count.map_or(items.len(), |c| (start + c).min(items.len()));
                return ApiResponse::new(200, Value::Array(items[start..end].to_vec()));
            }
            return ApiResponse::new(200, json!({ "value": tag.value }));
        }

        let listing: Vec<Value> = state
            .tags
            .values()
            .filter(|tag| ApiRequest::read(tag.kind, None, TableRange::default()).path() == path)
            .map(|tag| {
                if tag.kind.is_table() {
                    let length = tag.value.as_array().map_or(0, Vec::len);
                    json!({"name": tag.name, "length": length})
                } else {
                    json!({"name": tag.name, "value": tag.value})
                }
            })
            .collect();

        let is_collection = DataKind::ALL
            .iter()
            .any(|kind| ApiRequest::read(*kind, None, TableRange::default()).path() == path);

        if is_collection {
            ApiResponse::new(200, Value::Array(listing))
        } else {
            undefined_tag()
        }
    }

    fn write(&self, path: &str, start: Option<usize>, body: Option<Value>) -> ApiResponse {
        let mut state = self.lock();
        let tag = match state.tags.get_mut(path) {
            Some(tag) => tag,
            None => return undefined_tag(),
        };

        let body = match body {
            Some(body) => body,
            None => return invalid_data(),
        };

        if tag.kind.is_table() {
            let values = match body {
                Value::Array(values) => values,
                _ => return invalid_data(),
            };
            let mut items = tag.value.as_array().cloned().unwrap_or_default();
            let start = start.unwrap_or(0);
            if start + values.len() > items.len() {
                return ApiResponse::new(400, json!({"errorCode": -12, "message": "Invalid table index."}));
            }
            for (i, value) in values.into_iter().enumerate() {
                items[start + i] = value;
            }
            tag.value = Value::Array(items);
        } else {
            match body.get("value") {
                Some(value) => tag.value = value.clone(),
                None => return invalid_data(),
            }
        }

        ApiResponse::new(200, json!({}))
    }
}

fn undefined_tag() -> ApiResponse {
    ApiResponse::new(404, json!({"errorCode": -28, "message": "Undefined tag."}))
}

fn invalid_data() -> ApiResponse {
    ApiResponse::new(400, json!({"errorCode": -8, "message": "Invalid data."}))
}

#[async_trait]
impl Transport for SimulatedController {
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse> {
        let (failure, latency) = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            (state.failures.pop_front(), state.latency)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let response = self.answer(&request);
        trace!(path = %request.url.path(), status = response.status, "Simulated response");
        Ok(response)
    }
}
