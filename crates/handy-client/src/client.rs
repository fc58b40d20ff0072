//! Handy HTTP client implementation

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::HandyConfig;
use crate::error::{HandyError, Result};
use crate::response::Response;
use crate::session::{LogLevel, Mode, Session, SessionEvent};
use crate::transport::{failure_body, HttpTransport, Transport};
use crate::types::*;

/// Multiplier applied to the `speed` field of `stepSpeed` responses.
///
/// Compensates for the v1 API reporting step speeds at four times their real
/// value. Depends on the server version; revisit when the API is upgraded.
pub const STEP_SPEED_RAW_FACTOR: f64 = 0.25;

/// Stroke travel in mm at 100%
pub const MAX_STROKE_MM: f64 = 200.0;

/// Maximum speed in mm/s
pub const MAX_SPEED_MM_S: f64 = 400.0;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Handy device API client
///
/// Owns one [`Session`]. Clones share the session and the notification
/// channel, so several independent devices need several clients.
#[derive(Clone)]
pub struct HandyClient {
    transport: Arc<dyn Transport>,
    base_url: Url,
    upload_url: Url,
    session: Arc<RwLock<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl fmt::Debug for HandyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.session.read();
        f.debug_struct("HandyClient")
            .field("base_url", &self.base_url.as_str())
            .field("upload_url", &self.upload_url.as_str())
            .field("connection_key", &"[REDACTED]")
            .field("mode", &session.mode)
            .field("server_time_offset", &session.server_time_offset)
            .finish()
    }
}

impl HandyClient {
    /// Create a client for the public API with the given connection key
    pub fn new(connection_key: &str) -> Result<Self> {
        Self::with_config(HandyConfig::builder().connection_key(connection_key).build())
    }

    /// Create a client from configuration
    pub fn with_config(config: HandyConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.timeouts)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over a custom transport
    pub fn with_transport(config: HandyConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let base_url = Url::parse(&config.connection.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(HandyError::Config(format!(
                "Base URL cannot carry path segments: {}",
                base_url
            )));
        }
        let upload_url = Url::parse(&config.connection.upload_url)?;

        let session = Session::new(
            config.connection.connection_key.unwrap_or_default(),
            config.log_level,
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            transport,
            base_url,
            upload_url,
            session: Arc::new(RwLock::new(session)),
            events,
        })
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Subscribe to command lifecycle and mode notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn connection_key(&self) -> String {
        self.session.read().connection_key.clone()
    }

    pub fn set_connection_key(&self, key: impl Into<String>) {
        self.session.write().connection_key = key.into();
    }

    /// Last known mode of the device (may be stale)
    pub fn mode(&self) -> Mode {
        self.session.read().mode
    }

    /// Current clock offset in milliseconds (server minus local)
    pub fn server_time_offset(&self) -> i64 {
        self.session.read().server_time_offset
    }

    pub fn log_level(&self) -> LogLevel {
        self.session.read().log_level
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.session.write().log_level = level;
    }

    /// Forget the connection key, cached mode and clock offset
    pub fn reset_session(&self) {
        let mut session = self.session.write();
        let log_level = session.log_level;
        *session = Session::new(String::new(), log_level);
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload_url
    }

    // =========================================================================
    // Mode Commands
    // =========================================================================

    /// Set the device mode
    #[instrument(skip(self))]
    pub async fn set_mode(&self, mode: Mode) -> Result<Mode> {
        self.command(
            "Set Mode",
            "setMode",
            vec![("mode", mode.code().to_string())],
            |response| Ok(reported_mode(response)?.unwrap_or(mode)),
        )
        .await
        .map(|reported| self.settle_mode(reported))
    }

    /// Toggle between Off and `mode`
    #[instrument(skip(self))]
    pub async fn toggle_mode(&self, mode: Mode) -> Result<Mode> {
        let expected = self.mode().toggled(mode);
        self.command(
            "Toggle Mode",
            "toggleMode",
            vec![("mode", mode.code().to_string())],
            |response| Ok(reported_mode(response)?.unwrap_or(expected)),
        )
        .await
        .map(|reported| self.settle_mode(reported))
    }

    /// Run `action` in `required` mode, switching the device first if needed.
    ///
    /// When the cached mode differs, exactly one Set-Mode is issued and
    /// `action` only runs if it succeeds.
    pub async fn enforce_mode<T, F, Fut>(&self, required: Mode, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let current = self.mode();
        if current != required {
            debug!(%current, %required, "Switching mode before command");
            self.set_mode(required).await?;
        }
        action().await
    }

    // =========================================================================
    // Speed and Stroke
    // =========================================================================

    /// Set speed as a percentage of the maximum. Enters Automatic mode.
    #[instrument(skip(self))]
    pub async fn set_speed_percent(&self, percent: u8) -> Result<MotionStatus> {
        let percent = percent.min(100);
        self.enforce_mode(Mode::Automatic, || {
            self.command(
                "Set Speed (Percent)",
                "setSpeed",
                vec![("speed", percent.to_string()), ("type", "%".to_string())],
                motion_status,
            )
        })
        .await
    }

    /// Set speed in mm/s (0-400). Enters Automatic mode.
    #[instrument(skip(self))]
    pub async fn set_speed_mm(&self, speed_mm: f64) -> Result<MotionStatus> {
        let speed_mm = speed_mm.clamp(0.0, MAX_SPEED_MM_S);
        self.enforce_mode(Mode::Automatic, || {
            self.command(
                "Set Speed (mm/s)",
                "setSpeed",
                vec![
                    ("speed", format!("{:.0}", speed_mm)),
                    ("type", "mm/s".to_string()),
                ],
                motion_status,
            )
        })
        .await
    }

    /// Step speed up or down by 10%. Enters Automatic mode.
    #[instrument(skip(self))]
    pub async fn step_speed(&self, up: bool) -> Result<SpatialReading> {
        let command = if up { "Step Speed Up" } else { "Step Speed Down" };
        self.enforce_mode(Mode::Automatic, || {
            self.command(
                command,
                "stepSpeed",
                vec![("step", up.to_string())],
                |response| {
                    Ok(SpatialReading {
                        percent: response.require_f64("speedPercent")?,
                        raw: response.require_f64("speed")? * STEP_SPEED_RAW_FACTOR,
                    })
                },
            )
        })
        .await
    }

    /// Set stroke length as a percentage. Valid in Automatic and Sync mode.
    #[instrument(skip(self))]
    pub async fn set_stroke_percent(&self, percent: u8) -> Result<MotionStatus> {
        let percent = percent.min(100);
        self.command(
            "Set Stroke (Percent)",
            "setStroke",
            vec![("stroke", percent.to_string()), ("type", "%".to_string())],
            motion_status,
        )
        .await
    }

    /// Set stroke length in mm (0-200)
    #[instrument(skip(self))]
    pub async fn set_stroke_mm(&self, stroke_mm: f64) -> Result<MotionStatus> {
        let stroke_mm = stroke_mm.clamp(0.0, MAX_STROKE_MM);
        self.command(
            "Set Stroke (mm)",
            "setStroke",
            vec![
                ("stroke", format!("{:.0}", stroke_mm)),
                ("type", "mm".to_string()),
            ],
            motion_status,
        )
        .await
    }

    /// Step stroke length up or down by 10%
    #[instrument(skip(self))]
    pub async fn step_stroke(&self, up: bool) -> Result<SpatialReading> {
        let command = if up { "Step Stroke Up" } else { "Step Stroke Down" };
        self.command(
            command,
            "stepStroke",
            vec![("step", up.to_string())],
            |response| {
                let percent = response.require_f64("stroke")?;
                Ok(SpatialReading {
                    percent,
                    raw: percent * MAX_STROKE_MM / 100.0,
                })
            },
        )
        .await
    }

    // =========================================================================
    // Device Information
    // =========================================================================

    /// Installed and latest available firmware versions
    #[instrument(skip(self))]
    pub async fn get_version(&self) -> Result<VersionInfo> {
        self.command("Get Version", "getVersion", Vec::new(), |response| {
            Ok(VersionInfo {
                current: response.require_str("version")?.to_string(),
                latest: response.get_str("latest").unwrap_or_default().to_string(),
            })
        })
        .await
    }

    /// Mode, position, speed and stroke. Also refreshes the cached mode.
    #[instrument(skip(self))]
    pub async fn get_settings(&self) -> Result<DeviceSettings> {
        self.command("Get Settings", "getSettings", Vec::new(), |response| {
            Ok(DeviceSettings {
                mode: reported_mode(response)?
                    .ok_or_else(|| HandyError::missing_field("mode"))?,
                position: response.require_f64("position")?,
                speed: response.require_f64("speed")?,
                stroke: response.require_f64("stroke")?,
            })
        })
        .await
    }

    /// Current device mode. The cheapest way to check the device is online.
    #[instrument(skip(self))]
    pub async fn get_status(&self) -> Result<Mode> {
        self.command("Get Status", "getStatus", Vec::new(), |response| {
            reported_mode(response)?.ok_or_else(|| HandyError::missing_field("mode"))
        })
        .await
    }

    // =========================================================================
    // Command Pipeline
    // =========================================================================

    /// Run one command through the pipeline.
    ///
    /// Emits `CommandStarted` first and `CommandEnded` last on every path.
    /// Fails with [`HandyError::MissingCredential`] before calling `request`
    /// when no connection key is set. `request` receives the connection key
    /// and returns the raw response body; `project` maps a successful
    /// response to the command result.
    pub async fn dispatch<T, F, Fut, P>(
        &self,
        command: &'static str,
        request: F,
        project: P,
    ) -> Result<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = String>,
        P: FnOnce(&Response) -> Result<T>,
    {
        self.begin(command);
        let result = self.run_dispatch(command, request, project).await;
        self.finish(command, result)
    }

    async fn run_dispatch<T, F, Fut, P>(
        &self,
        command: &'static str,
        request: F,
        project: P,
    ) -> Result<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = String>,
        P: FnOnce(&Response) -> Result<T>,
    {
        let key = self.require_connection_key()?;
        let body = request(key).await;
        let response = self.parse_response(command, &body);
        response.validate()?;
        if let Some(mode) = reported_mode(&response).ok().flatten() {
            self.observe_mode(mode);
        }
        project(&response).map_err(|e| match e {
            HandyError::Projection(_) => e,
            other => HandyError::Projection(other.to_string()),
        })
    }

    /// GET a keyed endpoint through the pipeline
    async fn command<T, P>(
        &self,
        command: &'static str,
        endpoint: &'static str,
        params: Vec<(&'static str, String)>,
        project: P,
    ) -> Result<T>
    where
        P: FnOnce(&Response) -> Result<T>,
    {
        self.dispatch(
            command,
            move |key| self.get_endpoint(key, endpoint, params),
            project,
        )
        .await
    }

    pub(crate) async fn get_endpoint(
        &self,
        key: String,
        endpoint: &str,
        params: Vec<(&'static str, String)>,
    ) -> String {
        match self.endpoint_url(Some(&key), endpoint, &params) {
            Ok(url) => self.transport.get(&url).await,
            Err(e) => failure_body(e),
        }
    }

    /// Build `{base}/{key}/{endpoint}?params`, or `{base}/{endpoint}` without a key
    pub fn endpoint_url(
        &self,
        key: Option<&str>,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| HandyError::Config(format!("Invalid base URL: {}", self.base_url)))?;
            segments.pop_if_empty();
            if let Some(key) = key {
                segments.push(key);
            }
            segments.push(endpoint);
        }
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn require_connection_key(&self) -> Result<String> {
        let session = self.session.read();
        if session.has_connection_key() {
            Ok(session.connection_key.clone())
        } else {
            Err(HandyError::MissingCredential)
        }
    }

    /// Record an authoritative mode; notifies subscribers only on change
    pub(crate) fn observe_mode(&self, mode: Mode) {
        let changed = self.session.write().observe_mode(mode);
        if changed {
            debug!(%mode, "Mode changed");
            self.emit(SessionEvent::ModeChanged(mode));
        }
    }

    fn settle_mode(&self, mode: Mode) -> Mode {
        self.observe_mode(mode);
        mode
    }

    pub(crate) fn set_server_time_offset(&self, offset: i64) {
        self.session.write().server_time_offset = offset;
    }

    // =========================================================================
    // Notifications and Logging
    // =========================================================================

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    pub(crate) fn begin(&self, command: &'static str) {
        self.emit(SessionEvent::CommandStarted { command });
        if self.log_level() >= LogLevel::Verbose {
            info!("Beginning command {}", command);
        }
    }

    pub(crate) fn finish<T>(&self, command: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if self.log_level() >= LogLevel::Errors {
                error!("{} failed with error: {}", command, e);
            }
        }
        self.emit(SessionEvent::CommandEnded {
            command,
            success: result.is_ok(),
        });
        result
    }

    /// Fail `command` before any request is made
    pub(crate) fn reject<T>(&self, command: &'static str, error: HandyError) -> Result<T> {
        self.begin(command);
        self.finish(command, Err(error))
    }

    pub(crate) fn parse_response(&self, command: &'static str, body: &str) -> Response {
        let response = Response::parse(body);
        if self.log_level() >= LogLevel::Responses {
            if response.is_malformed() {
                warn!("{} returned an unparseable response: {}", command, body);
            } else {
                info!("{} response: {}", command, response.to_pretty_string());
            }
        }
        response
    }
}

/// Mode carried by a response, if any
fn reported_mode(response: &Response) -> Result<Option<Mode>> {
    match response.get_i64("mode") {
        None => Ok(None),
        Some(code) => Mode::from_code(code)
            .map(Some)
            .ok_or_else(|| HandyError::Projection(format!("unknown mode {}", code))),
    }
}

fn motion_status(response: &Response) -> Result<MotionStatus> {
    Ok(MotionStatus {
        current_position: response.require_f64("currentPosition")?,
    })
}
