//! Server clock synchronization and synchronized playback
//!
//! Playback of a prepared control file is scheduled in server time. The
//! client estimates the offset between the server clock and the local clock
//! with repeated round trips to `getServerTime`, then sends
//! `serverTime = local now + offset` with every play/pause request.

use tracing::{debug, info, instrument};

use crate::client::HandyClient;
use crate::error::{HandyError, Result};
use crate::response::Response;
use crate::session::{LogLevel, Mode};
use crate::types::{PlaybackState, PublishedFile};

/// Number of probes recommended by the API for a stable estimate.
///
/// Every probe counts against the device's hourly request quota.
pub const DEFAULT_SYNC_TRIPS: u32 = 30;

/// Time the device is given to download a control file
const SYNC_PREPARE_TIMEOUT_MS: u64 = 30_000;

const CLOCK_SYNC_COMMAND: &str = "Get Server Time";

/// One round trip to the server clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockProbe {
    /// Local time the request was sent (unix ms)
    pub departure_ms: i64,
    /// Local time the response arrived (unix ms)
    pub arrival_ms: i64,
    /// Server time reported in the response (unix ms)
    pub server_time_ms: i64,
}

impl ClockProbe {
    pub fn round_trip_ms(&self) -> i64 {
        self.arrival_ms - self.departure_ms
    }

    /// Estimated server time at arrival minus local arrival time.
    ///
    /// `None` when the reported server time is too far out to represent.
    pub fn offset_ms(&self) -> Option<i64> {
        self.server_time_ms
            .checked_add(self.round_trip_ms() / 2)?
            .checked_sub(self.arrival_ms)
    }
}

/// Truncating integer mean of the per-probe offsets.
///
/// `None` for no probes or when an offset or their sum overflows.
pub fn mean_offset(probes: &[ClockProbe]) -> Option<i64> {
    if probes.is_empty() {
        return None;
    }
    let total = probes
        .iter()
        .try_fold(0i64, |total, probe| total.checked_add(probe.offset_ms()?))?;
    Some(total / probes.len() as i64)
}

fn server_time_out_of_range() -> HandyError {
    HandyError::Projection("serverTime out of range".to_string())
}

/// Local wall clock in unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl HandyClient {
    // =========================================================================
    // Clock Synchronization
    // =========================================================================

    /// Estimate the server clock offset with `trips` round trips.
    ///
    /// The session offset is replaced only when every probe succeeds; any
    /// failure aborts the run and leaves the previous offset in place.
    #[instrument(skip(self))]
    pub async fn synchronize_clock(&self, trips: u32) -> Result<i64> {
        self.begin(CLOCK_SYNC_COMMAND);
        let result = self.run_clock_sync(trips).await;
        self.finish(CLOCK_SYNC_COMMAND, result)
    }

    async fn run_clock_sync(&self, trips: u32) -> Result<i64> {
        if trips == 0 {
            return Err(HandyError::InvalidInput(
                "clock sync needs at least one trip".to_string(),
            ));
        }
        let key = self.require_connection_key()?;

        let mut probes = Vec::with_capacity(trips as usize);
        for trip in 1..=trips {
            let departure_ms = now_ms();
            let body = self
                .get_endpoint(key.clone(), "getServerTime", Vec::new())
                .await;
            let arrival_ms = now_ms();

            let response = self.parse_response(CLOCK_SYNC_COMMAND, &body);
            let server_time_ms = server_time(&response).inspect_err(|_| {
                debug!(trip, trips, "Clock sync aborted");
            })?;

            let probe = ClockProbe {
                departure_ms,
                arrival_ms,
                server_time_ms,
            };
            if probe.offset_ms().is_none() {
                debug!(trip, trips, server_time_ms, "Clock sync aborted");
                return Err(server_time_out_of_range());
            }
            probes.push(probe);
        }

        let offset = mean_offset(&probes).ok_or_else(server_time_out_of_range)?;
        self.set_server_time_offset(offset);
        if self.log_level() >= LogLevel::Verbose {
            info!("Calculated server offset as {} milliseconds", offset);
        }
        Ok(offset)
    }

    // =========================================================================
    // Synchronized Playback
    // =========================================================================

    /// Load a hosted control file onto the device. Puts the device in Sync mode.
    ///
    /// When name and size match the file already loaded, the device skips
    /// the download.
    #[instrument(skip(self))]
    pub async fn sync_prepare(&self, file: &PublishedFile) -> Result<()> {
        let mut params = vec![("url", file.url.clone())];
        if !file.name.is_empty() {
            params.push(("name", file.name.clone()));
        }
        if let Some(size) = file.size_bytes.filter(|s| *s > 0) {
            params.push(("size", size.to_string()));
        }
        params.push(("timeout", SYNC_PREPARE_TIMEOUT_MS.to_string()));

        self.dispatch(
            "Sync Prepare",
            move |key| self.get_endpoint(key, "syncPrepare", params),
            |_| {
                self.observe_mode(Mode::Sync);
                Ok(())
            },
        )
        .await
    }

    /// Start playback of the prepared file at `time_ms` into the file.
    /// Enters Sync mode first if needed.
    #[instrument(skip(self))]
    pub async fn sync_play(&self, time_ms: u32) -> Result<PlaybackState> {
        const COMMAND: &str = "Sync Play";
        self.enforce_mode(Mode::Sync, || async move {
            let mut params = vec![("play", "true".to_string())];
            if time_ms > 0 {
                params.push(("time", time_ms.to_string()));
            }
            match self.server_time_param() {
                Ok(server_time) => params.extend(server_time),
                Err(e) => return self.reject(COMMAND, e),
            }

            self.dispatch(
                COMMAND,
                move |key| self.get_endpoint(key, "syncPlay", params),
                playback_state,
            )
            .await
        })
        .await
    }

    /// Pause playback of the prepared file
    #[instrument(skip(self))]
    pub async fn sync_pause(&self) -> Result<PlaybackState> {
        const COMMAND: &str = "Sync Pause";
        let mut params = vec![("play", "false".to_string())];
        match self.server_time_param() {
            Ok(server_time) => params.extend(server_time),
            Err(e) => return self.reject(COMMAND, e),
        }

        self.dispatch(
            COMMAND,
            move |key| self.get_endpoint(key, "syncPlay", params),
            playback_state,
        )
        .await
    }

    /// Shift device playback by `offset_ms` (may be negative) to match
    /// on-screen content. Returns the offset the device applied.
    #[instrument(skip(self))]
    pub async fn sync_offset(&self, offset_ms: i64) -> Result<i64> {
        let params = vec![("offset", offset_ms.to_string())];
        self.dispatch(
            "Sync Offset",
            move |key| self.get_endpoint(key, "syncOffset", params),
            |response| response.require_i64("offset"),
        )
        .await
    }

    /// `serverTime` query parameter, sent only once an offset is known
    fn server_time_param(&self) -> Result<Option<(&'static str, String)>> {
        let offset = self.server_time_offset();
        if offset == 0 {
            return Ok(None);
        }
        let server_time = now_ms()
            .checked_add(offset)
            .ok_or_else(server_time_out_of_range)?;
        Ok(Some(("serverTime", server_time.to_string())))
    }
}

fn playback_state(response: &Response) -> Result<PlaybackState> {
    Ok(PlaybackState {
        playing: response.require_bool("playing")?,
        offset_ms: response.get_i64("setOffset"),
    })
}

/// Extract the server time from a probe response.
///
/// `getServerTime` does not always carry a success flag, so only an explicit
/// failure or an error message counts as a device error here.
fn server_time(response: &Response) -> Result<i64> {
    if response.is_malformed() {
        return Err(HandyError::Device("Invalid response".to_string()));
    }
    if response.success() == Some(false) || response.error_message().is_some() {
        return Err(HandyError::Device(
            response.error_message().unwrap_or("Unknown error").to_string(),
        ));
    }
    response.require_i64("serverTime")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_offset() {
        // 40ms round trip; server was 1000ms ahead when it answered
        let probe = ClockProbe {
            departure_ms: 10_000,
            arrival_ms: 10_040,
            server_time_ms: 11_020,
        };
        assert_eq!(probe.round_trip_ms(), 40);
        assert_eq!(probe.offset_ms(), Some(11_020 + 20 - 10_040));
    }

    #[test]
    fn test_clock_offset_out_of_range() {
        let near_min = ClockProbe {
            departure_ms: 1_600_000_000_000,
            arrival_ms: 1_600_000_000_040,
            server_time_ms: i64::MIN,
        };
        assert_eq!(near_min.offset_ms(), None);
        assert_eq!(mean_offset(&[near_min]), None);

        // Each offset fits but their sum does not
        let near_max = ClockProbe {
            departure_ms: 0,
            arrival_ms: 0,
            server_time_ms: i64::MAX - 1,
        };
        assert_eq!(near_max.offset_ms(), Some(i64::MAX - 1));
        assert_eq!(mean_offset(&[near_max, near_max]), None);
    }

    #[test]
    fn test_mean_offset_truncates() {
        let probes = [
            ClockProbe {
                departure_ms: 0,
                arrival_ms: 10,
                server_time_ms: 105,
            }, // offset 100
            ClockProbe {
                departure_ms: 0,
                arrival_ms: 10,
                server_time_ms: 106,
            }, // offset 101
        ];
        assert_eq!(mean_offset(&probes), Some(100));

        let negative = [
            ClockProbe {
                departure_ms: 0,
                arrival_ms: 0,
                server_time_ms: -3,
            },
            ClockProbe {
                departure_ms: 0,
                arrival_ms: 0,
                server_time_ms: -4,
            },
        ];
        // -7 / 2 truncates toward zero
        assert_eq!(mean_offset(&negative), Some(-3));
        assert_eq!(mean_offset(&[]), None);
    }

    #[test]
    fn test_server_time_extraction() {
        let ok = Response::parse(r#"{"serverTime":1600000000000}"#);
        assert_eq!(server_time(&ok).unwrap(), 1_600_000_000_000);

        let failed = Response::parse(r#"{"success":false,"error":"Rate limited"}"#);
        match server_time(&failed) {
            Err(HandyError::Device(msg)) => assert_eq!(msg, "Rate limited"),
            other => panic!("unexpected {:?}", other),
        }

        let missing = Response::parse(r#"{"success":true}"#);
        assert!(matches!(
            server_time(&missing),
            Err(HandyError::Projection(_))
        ));
    }

    #[tokio::test]
    async fn test_server_time_param_overflow_is_rejected() {
        use crate::config::HandyConfig;
        use crate::session::SessionEvent;
        use crate::testing::MockTransport;
        use std::sync::Arc;

        let transport = Arc::new(MockTransport::new());
        let config = HandyConfig::builder().connection_key("abc123").build();
        let client = HandyClient::with_transport(config, transport.clone()).unwrap();
        client.observe_mode(Mode::Sync);
        client.set_server_time_offset(i64::MAX);
        let mut rx = client.subscribe();

        match client.sync_pause().await {
            Err(HandyError::Projection(msg)) => assert_eq!(msg, "serverTime out of range"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            client.sync_play(0).await,
            Err(HandyError::Projection(_))
        ));
        assert_eq!(transport.call_count(), 0);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                SessionEvent::CommandStarted {
                    command: "Sync Pause"
                },
                SessionEvent::CommandEnded {
                    command: "Sync Pause",
                    success: false
                },
                SessionEvent::CommandStarted {
                    command: "Sync Play"
                },
                SessionEvent::CommandEnded {
                    command: "Sync Play",
                    success: false
                },
            ]
        );
    }
}
