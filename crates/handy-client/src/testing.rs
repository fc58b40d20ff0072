//! Test utilities for handy-client
//!
//! - [`MockTransport`]: scripted responses, records every request
//! - [`FakeDevice`]: in-process imitation of the device API (axum)
//! - [`TestServer`]: serves a [`FakeDevice`] on an ephemeral port with a
//!   ready-to-use client

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

use crate::config::HandyConfig;
use crate::session::{LogLevel, Mode};
use crate::sync::now_ms;
use crate::transport::{failure_body, Transport};
use crate::{HandyClient, HandyError, Result};

// =============================================================================
// Mock Transport
// =============================================================================

type ScriptedResponse = Box<dyn FnOnce() -> String + Send>;

/// A file received by [`MockTransport::post_file`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub url: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl RecordedUpload {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Transport that replays scripted bodies in order.
///
/// Once the script is exhausted every request gets a transport failure body.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<String>>,
    uploads: Mutex<Vec<RecordedUpload>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fixed response body
    pub fn push_response(&self, body: impl Into<String>) {
        let body = body.into();
        self.script.lock().push_back(Box::new(move || body));
    }

    /// Queue a body computed when the request arrives
    pub fn push_with<F>(&self, respond: F)
    where
        F: FnOnce() -> String + Send + 'static,
    {
        self.script.lock().push_back(Box::new(respond));
    }

    /// URLs of all GET requests, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().clone()
    }

    /// Total number of requests of any kind
    pub fn call_count(&self) -> usize {
        self.requests.lock().len() + self.uploads.lock().len()
    }

    fn next_body(&self) -> String {
        match self.script.lock().pop_front() {
            Some(respond) => respond(),
            None => failure_body("no scripted response"),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &Url) -> String {
        self.requests.lock().push(url.to_string());
        self.next_body()
    }

    async fn post_file(&self, url: &Url, file_name: &str, bytes: Vec<u8>) -> String {
        self.uploads.lock().push(RecordedUpload {
            url: url.to_string(),
            file_name: file_name.to_string(),
            bytes,
        });
        self.next_body()
    }
}

// =============================================================================
// Fake Device
// =============================================================================

#[derive(Debug)]
struct DeviceState {
    key: String,
    mode: Mode,
    speed_percent: f64,
    stroke_percent: f64,
    position: f64,
    sync_offset: i64,
    loaded_url: Option<String>,
    playing: bool,
    server_skew_ms: i64,
    last_server_time: Option<i64>,
    device_error: Option<String>,
    http_error: Option<StatusCode>,
    calls: Vec<String>,
    uploads: Vec<(String, Vec<u8>)>,
}

/// In-process imitation of the device API.
///
/// Mode-sensitive endpoints reject requests made in the wrong mode, like the
/// real device does.
#[derive(Debug, Clone)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new(key: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                key: key.to_string(),
                mode: Mode::Off,
                speed_percent: 50.0,
                stroke_percent: 100.0,
                position: 0.0,
                sync_offset: 0,
                loaded_url: None,
                playing: false,
                server_skew_ms: 0,
                last_server_time: None,
                device_error: None,
                http_error: None,
                calls: Vec::new(),
                uploads: Vec::new(),
            })),
        }
    }

    /// Make the server clock run `skew_ms` ahead of the local clock
    pub fn with_server_skew(self, skew_ms: i64) -> Self {
        self.state.lock().server_skew_ms = skew_ms;
        self
    }

    pub fn with_mode(self, mode: Mode) -> Self {
        self.state.lock().mode = mode;
        self
    }

    /// Answer every command with a device-level failure
    pub fn fail_commands(&self, error: Option<&str>) {
        self.state.lock().device_error = error.map(String::from);
    }

    /// Answer every request with an HTTP error status
    pub fn fail_http(&self, status: Option<StatusCode>) {
        self.state.lock().http_error = status;
    }

    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// `serverTime` sent with the last play/pause request
    pub fn last_server_time(&self) -> Option<i64> {
        self.state.lock().last_server_time
    }

    /// Endpoint names of all commands received, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// `(file name, content)` of all uploads received
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().uploads.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/v1/{key}/{endpoint}", get(handle_command))
            .route("/api/sync/upload", post(handle_upload))
            .with_state(self.clone())
    }

    fn command(&self, key: &str, endpoint: &str, params: &HashMap<String, String>) -> Value {
        let mut state = self.state.lock();
        state.calls.push(endpoint.to_string());

        if key != state.key {
            return json!({"success": false, "error": "Machine not connected"});
        }
        if let Some(error) = &state.device_error {
            return json!({"success": false, "error": error});
        }

        let number = |name: &str| params.get(name).and_then(|v| v.parse::<f64>().ok());

        match endpoint {
            "setMode" => match number("mode").and_then(|m| Mode::from_code(m as i64)) {
                Some(mode) => {
                    state.mode = mode;
                    json!({"success": true, "mode": mode.code()})
                }
                None => json!({"success": false, "error": "Invalid mode"}),
            },
            "toggleMode" => match number("mode").and_then(|m| Mode::from_code(m as i64)) {
                Some(target) => {
                    state.mode = state.mode.toggled(target);
                    json!({"success": true, "mode": state.mode.code()})
                }
                None => json!({"success": false, "error": "Invalid mode"}),
            },
            "setSpeed" | "stepSpeed" if state.mode != Mode::Automatic => {
                json!({"success": false, "error": "Machine not in automatic mode"})
            }
            "setSpeed" => {
                let speed = number("speed").unwrap_or_default();
                state.speed_percent = match params.get("type").map(String::as_str) {
                    Some("mm/s") => speed / 4.0,
                    _ => speed,
                };
                json!({"success": true, "currentPosition": state.position})
            }
            "stepSpeed" => {
                let step = if params.get("step").map(String::as_str) == Some("true") {
                    10.0
                } else {
                    -10.0
                };
                state.speed_percent = (state.speed_percent + step).clamp(0.0, 100.0);
                // v1 reports step speeds at four times their mm/s value
                json!({
                    "success": true,
                    "speedPercent": state.speed_percent,
                    "speed": state.speed_percent * 4.0 * 4.0,
                })
            }
            "setStroke" => {
                let stroke = number("stroke").unwrap_or_default();
                state.stroke_percent = match params.get("type").map(String::as_str) {
                    Some("mm") => stroke / 2.0,
                    _ => stroke,
                };
                json!({"success": true, "currentPosition": state.position})
            }
            "stepStroke" => {
                let step = if params.get("step").map(String::as_str) == Some("true") {
                    10.0
                } else {
                    -10.0
                };
                state.stroke_percent = (state.stroke_percent + step).clamp(0.0, 100.0);
                json!({"success": true, "stroke": state.stroke_percent})
            }
            "getVersion" => json!({"success": true, "version": "2.1.0", "latest": "2.3.0"}),
            "getSettings" => json!({
                "success": true,
                "mode": state.mode.code(),
                "position": state.position,
                "speed": state.speed_percent,
                "stroke": state.stroke_percent,
            }),
            "getStatus" => json!({"success": true, "mode": state.mode.code()}),
            "getServerTime" => json!({"serverTime": now_ms() + state.server_skew_ms}),
            "syncPrepare" => match params.get("url") {
                Some(url) if !url.is_empty() => {
                    state.loaded_url = Some(url.clone());
                    state.mode = Mode::Sync;
                    json!({"success": true})
                }
                _ => json!({"success": false, "error": "Missing url"}),
            },
            "syncPlay" if state.mode != Mode::Sync => {
                json!({"success": false, "error": "Machine not in sync mode"})
            }
            "syncPlay" => {
                state.last_server_time = number("serverTime").map(|t| t as i64);
                if params.get("play").map(String::as_str) == Some("true") {
                    if state.loaded_url.is_none() {
                        return json!({"success": false, "error": "No sync file loaded"});
                    }
                    state.playing = true;
                    json!({"success": true, "playing": true, "setOffset": state.sync_offset})
                } else {
                    state.playing = false;
                    json!({"success": true, "playing": false})
                }
            }
            "syncOffset" => {
                state.sync_offset = number("offset").unwrap_or_default() as i64;
                json!({"success": true, "offset": state.sync_offset})
            }
            _ => json!({"success": false, "error": format!("Unknown endpoint {}", endpoint)}),
        }
    }

    fn upload(&self, file_name: String, bytes: Vec<u8>) -> Value {
        let mut state = self.state.lock();
        let size = bytes.len();
        let url = format!("https://files.example.test/sync/{}", file_name);
        state.uploads.push((file_name.clone(), bytes));
        json!({"url": url, "filename": file_name, "size": size})
    }

    fn http_error(&self) -> Option<StatusCode> {
        self.state.lock().http_error
    }
}

async fn handle_command(
    State(device): State<FakeDevice>,
    Path((key, endpoint)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(status) = device.http_error() {
        return (status, "unavailable").into_response();
    }
    Json(device.command(&key, &endpoint, &params)).into_response()
}

async fn handle_upload(State(device): State<FakeDevice>, mut multipart: Multipart) -> HttpResponse {
    if let Some(status) = device.http_error() {
        return (status, "unavailable").into_response();
    }
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some(crate::transport::UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        return match field.bytes().await {
            Ok(bytes) => Json(device.upload(file_name, bytes.to_vec())).into_response(),
            Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        };
    }
    Json(json!({"success": false, "error": "syncFile field missing"})).into_response()
}

// =============================================================================
// Test Server
// =============================================================================

/// A fake device server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: HandyClient,
    pub device: FakeDevice,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve `device` and build a client holding `key`
    ///
    /// ```ignore
    /// let server = TestServer::start(FakeDevice::new("key"), "key").await?;
    /// let mode = server.client.get_status().await?;
    /// ```
    pub async fn start(device: FakeDevice, key: &str) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| HandyError::Transport(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| HandyError::Transport(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let router = device.router();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        let config = HandyConfig::builder()
            .base_url(format!("http://{}/api/v1/", addr))
            .upload_url(format!("http://{}/api/sync/upload", addr))
            .connection_key(key)
            .log_level(LogLevel::Verbose)
            .request_timeout_ms(5_000)
            .connect_timeout_ms(2_000)
            .upload_timeout_ms(5_000)
            .build();
        let client = HandyClient::with_config(config)?;

        Ok(Self {
            addr,
            client,
            device,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
