//! Integration tests for handy-client
//!
//! Most tests run the client against an in-process fake device over real
//! HTTP. Tests that need exact control over response bodies use the
//! scripted transport instead.

use std::sync::Arc;

use axum::http::StatusCode;
use handy_client::publish::serialize_pattern;
use handy_client::sync::now_ms;
use handy_client::testing::{FakeDevice, MockTransport, TestServer};
use handy_client::{
    ControlFileKind, HandyClient, HandyConfig, HandyError, Mode, PatternPoint, SessionEvent,
};
use tokio::sync::broadcast;

const KEY: &str = "testkey";

async fn create_test_server() -> TestServer {
    TestServer::start(FakeDevice::new(KEY), KEY).await.unwrap()
}

fn scripted_client(key: Option<&str>) -> (HandyClient, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let mut builder = HandyConfig::builder();
    if let Some(key) = key {
        builder = builder.connection_key(key);
    }
    let client = HandyClient::with_transport(builder.build(), transport.clone()).unwrap();
    (client, transport)
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn mode_changes(events: &[SessionEvent]) -> Vec<Mode> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ModeChanged(mode) => Some(*mode),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Command Pipeline
// =============================================================================

#[tokio::test]
async fn test_missing_key_sends_nothing() {
    let (client, transport) = scripted_client(None);
    let mut rx = client.subscribe();

    let result = client.set_mode(Mode::Automatic).await;
    assert!(matches!(result, Err(HandyError::MissingCredential)));
    assert_eq!(transport.call_count(), 0);

    assert_eq!(
        drain(&mut rx),
        vec![
            SessionEvent::CommandStarted {
                command: "Set Mode"
            },
            SessionEvent::CommandEnded {
                command: "Set Mode",
                success: false
            },
        ]
    );
}

#[tokio::test]
async fn test_dispatch_round_trip() {
    let (client, _transport) = scripted_client(Some(KEY));
    let mut rx = client.subscribe();

    let result = client
        .dispatch(
            "Read Mode",
            |key| async move {
                assert_eq!(key, KEY);
                r#"{"success":true,"mode":2}"#.to_string()
            },
            |response| response.require_i64("mode"),
        )
        .await;
    assert_eq!(result.unwrap(), 2);
    assert_eq!(client.mode(), Mode::Position);

    assert_eq!(
        drain(&mut rx),
        vec![
            SessionEvent::CommandStarted { command: "Read Mode" },
            SessionEvent::ModeChanged(Mode::Position),
            SessionEvent::CommandEnded {
                command: "Read Mode",
                success: true
            },
        ]
    );
}

#[tokio::test]
async fn test_device_failure_messages() {
    let (client, _transport) = scripted_client(Some(KEY));

    let cases = [
        (r#"{"success":false,"error":"Machine offline"}"#, "Machine offline"),
        (r#"{"success":false}"#, "Unknown error"),
        (r#"{"mode":1}"#, "Invalid response"),
        ("<html>bad gateway</html>", "Invalid response"),
    ];
    for (body, expected) in cases {
        let result = client
            .dispatch("Check", |_| async move { body.to_string() }, |_| Ok(()))
            .await;
        match result {
            Err(HandyError::Device(msg)) => assert_eq!(msg, expected, "body {}", body),
            other => panic!("unexpected {:?} for {}", other, body),
        }
    }
    // Failed responses are never trusted for the mode
    assert_eq!(client.mode(), Mode::Off);
}

#[tokio::test]
async fn test_wrong_key_is_device_error() {
    let server = TestServer::start(FakeDevice::new(KEY), "otherkey")
        .await
        .unwrap();

    match server.client.get_status().await {
        Err(HandyError::Device(msg)) => assert_eq!(msg, "Machine not connected"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_http_error_is_transport_failure() {
    let server = create_test_server().await;
    server.device.fail_http(Some(StatusCode::SERVICE_UNAVAILABLE));

    let err = server.client.get_status().await.unwrap_err();
    assert!(err.is_transport_failure(), "unexpected {:?}", err);
}

// =============================================================================
// Mode Commands
// =============================================================================

#[tokio::test]
async fn test_mode_change_notified_once() {
    let server = create_test_server().await;
    let mut rx = server.client.subscribe();

    assert_eq!(
        server.client.set_mode(Mode::Automatic).await.unwrap(),
        Mode::Automatic
    );
    server.client.set_mode(Mode::Automatic).await.unwrap();
    server.client.get_status().await.unwrap();

    assert_eq!(mode_changes(&drain(&mut rx)), vec![Mode::Automatic]);
    assert_eq!(server.device.mode(), Mode::Automatic);
}

#[tokio::test]
async fn test_toggle_mode() {
    let server = create_test_server().await;

    assert_eq!(
        server.client.toggle_mode(Mode::Automatic).await.unwrap(),
        Mode::Automatic
    );
    assert_eq!(
        server.client.toggle_mode(Mode::Automatic).await.unwrap(),
        Mode::Off
    );
    assert_eq!(server.client.mode(), Mode::Off);
}

#[tokio::test]
async fn test_get_settings_refreshes_mode() {
    let device = FakeDevice::new(KEY).with_mode(Mode::Position);
    let server = TestServer::start(device, KEY).await.unwrap();
    let mut rx = server.client.subscribe();

    let settings = server.client.get_settings().await.unwrap();
    assert_eq!(settings.mode, Mode::Position);
    assert_eq!(settings.stroke, 100.0);
    assert_eq!(server.client.mode(), Mode::Position);
    assert_eq!(mode_changes(&drain(&mut rx)), vec![Mode::Position]);
}

// =============================================================================
// Mode Enforcement
// =============================================================================

#[tokio::test]
async fn test_enforce_switches_mode_once() {
    let server = create_test_server().await;

    server.client.set_speed_percent(40).await.unwrap();
    server.client.set_speed_percent(60).await.unwrap();

    assert_eq!(
        server.device.calls(),
        vec!["setMode", "setSpeed", "setSpeed"]
    );
    assert_eq!(server.client.mode(), Mode::Automatic);
}

#[tokio::test]
async fn test_enforce_failure_skips_action() {
    let server = create_test_server().await;
    server.device.fail_commands(Some("Machine offline"));

    match server.client.step_speed(true).await {
        Err(HandyError::Device(msg)) => assert_eq!(msg, "Machine offline"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(server.device.calls(), vec!["setMode"]);
    assert_eq!(server.client.mode(), Mode::Off);
}

#[tokio::test]
async fn test_step_speed_against_device() {
    let server = create_test_server().await;

    let reading = server.client.step_speed(true).await.unwrap();
    // 60% of 400 mm/s
    assert_eq!(reading.percent, 60.0);
    assert_eq!(reading.raw, 240.0);
}

#[tokio::test]
async fn test_stroke_mm() {
    let server = create_test_server().await;

    server.client.set_stroke_mm(150.0).await.unwrap();
    let reading = server.client.step_stroke(false).await.unwrap();
    assert_eq!(reading.percent, 65.0);
    assert_eq!(reading.raw, 130.0);
}

// =============================================================================
// Clock Synchronization
// =============================================================================

#[tokio::test]
async fn test_clock_sync_estimates_offset() {
    let device = FakeDevice::new(KEY).with_server_skew(5_000);
    let server = TestServer::start(device, KEY).await.unwrap();

    let offset = server.client.synchronize_clock(5).await.unwrap();
    assert!((offset - 5_000).abs() < 500, "offset {}", offset);
    assert_eq!(server.client.server_time_offset(), offset);
    assert_eq!(server.device.calls().len(), 5);
}

#[tokio::test]
async fn test_clock_sync_failure_keeps_previous_offset() {
    let (client, transport) = scripted_client(Some(KEY));
    for _ in 0..3 {
        transport.push_with(|| format!(r#"{{"serverTime":{}}}"#, now_ms() + 2_000));
    }
    let offset = client.synchronize_clock(3).await.unwrap();
    assert!((offset - 2_000).abs() < 100, "offset {}", offset);

    transport.push_with(|| format!(r#"{{"serverTime":{}}}"#, now_ms() + 9_000));
    transport.push_response(r#"{"success":false,"error":"Rate limited"}"#);
    transport.push_with(|| format!(r#"{{"serverTime":{}}}"#, now_ms() + 9_000));

    match client.synchronize_clock(3).await {
        Err(HandyError::Device(msg)) => assert_eq!(msg, "Rate limited"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(client.server_time_offset(), offset);
    // The run stopped at the failing trip
    assert_eq!(transport.requests().len(), 5);
    assert!(transport.requests()[4].ends_with(&format!("/{}/getServerTime", KEY)));
}

#[tokio::test]
async fn test_clock_sync_first_trip_failure() {
    let (client, transport) = scripted_client(Some(KEY));
    transport.push_response(r#"{"error":"Machine offline"}"#);
    transport.push_with(|| format!(r#"{{"serverTime":{}}}"#, now_ms()));

    match client.synchronize_clock(2).await {
        Err(HandyError::Device(msg)) => assert_eq!(msg, "Machine offline"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(client.server_time_offset(), 0);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_clock_sync_last_trip_failure_discards_run() {
    let (client, transport) = scripted_client(Some(KEY));
    for _ in 0..2 {
        transport.push_with(|| format!(r#"{{"serverTime":{}}}"#, now_ms() + 7_000));
    }
    transport.push_response(r#"{"success":false,"error":"Rate limited"}"#);

    assert!(matches!(
        client.synchronize_clock(3).await,
        Err(HandyError::Device(_))
    ));
    assert_eq!(client.server_time_offset(), 0);
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn test_clock_sync_rejects_out_of_range_server_time() {
    let (client, transport) = scripted_client(Some(KEY));
    transport.push_with(|| format!(r#"{{"serverTime":{}}}"#, now_ms() + 1_000));
    client.synchronize_clock(1).await.unwrap();
    let previous = client.server_time_offset();

    transport.push_response(r#"{"serverTime":"-9223372036854775808"}"#);
    let mut rx = client.subscribe();

    match client.synchronize_clock(1).await {
        Err(HandyError::Projection(msg)) => assert_eq!(msg, "serverTime out of range"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(client.server_time_offset(), previous);
    assert_eq!(
        drain(&mut rx),
        vec![
            SessionEvent::CommandStarted {
                command: "Get Server Time"
            },
            SessionEvent::CommandEnded {
                command: "Get Server Time",
                success: false
            },
        ]
    );
}

#[tokio::test]
async fn test_clock_sync_rejects_zero_trips() {
    let (client, transport) = scripted_client(Some(KEY));

    assert!(matches!(
        client.synchronize_clock(0).await,
        Err(HandyError::InvalidInput(_))
    ));
    assert_eq!(transport.call_count(), 0);
}

// =============================================================================
// Publishing
// =============================================================================

#[tokio::test]
async fn test_empty_pattern_sends_nothing() {
    let (client, transport) = scripted_client(Some(KEY));
    let mut rx = client.subscribe();

    assert!(matches!(
        client.publish_pattern(&[], None).await,
        Err(HandyError::InvalidInput(_))
    ));
    assert_eq!(transport.call_count(), 0);
    assert_eq!(
        drain(&mut rx).last(),
        Some(&SessionEvent::CommandEnded {
            command: "Pattern to URL",
            success: false
        })
    );
}

#[tokio::test]
async fn test_publish_pattern() {
    let server = create_test_server().await;
    let points: Vec<PatternPoint> = vec![(0, 0).into(), (400, 100).into(), (800, 0).into()];

    let file = server
        .client
        .publish_pattern(&points, Some("wave.csv"))
        .await
        .unwrap();
    assert_eq!(file.name, "wave.csv");
    assert_eq!(file.url, "https://files.example.test/sync/wave.csv");

    let uploads = server.device.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "wave.csv");
    assert_eq!(
        String::from_utf8(uploads[0].1.clone()).unwrap(),
        serialize_pattern(&points).unwrap()
    );
    assert_eq!(file.size_bytes, Some(uploads[0].1.len() as u64));
}

#[tokio::test]
async fn test_publish_does_not_need_key() {
    let (client, transport) = scripted_client(None);
    transport.push_response(r#"{"url":"https://files.example.test/a.funscript"}"#);

    let file = client
        .publish_file(r#"{"actions":[]}"#, ControlFileKind::Funscript, None)
        .await
        .unwrap();
    assert_eq!(file.url, "https://files.example.test/a.funscript");
    assert!(file.name.ends_with(".funscript"));

    let uploads = transport.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].text(), r#"{"actions":[]}"#);
    assert!(uploads[0].url.ends_with("/api/sync/upload"));
}

#[tokio::test]
async fn test_publish_rejected_by_service() {
    let (client, transport) = scripted_client(Some(KEY));
    transport.push_response(r#"{"success":false,"error":"File too large"}"#);

    match client
        .publish_pattern(&[PatternPoint::new(0, 0)], Some("big.csv"))
        .await
    {
        Err(HandyError::Device(msg)) => assert_eq!(msg, "File too large"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(transport.uploads().len(), 1);
}

#[tokio::test]
async fn test_publish_malformed_response() {
    let (client, transport) = scripted_client(Some(KEY));
    transport.push_response("<html>502 Bad Gateway</html>");

    match client
        .publish_file("0,0", ControlFileKind::Csv, Some("a.csv"))
        .await
    {
        Err(HandyError::Device(msg)) => assert_eq!(msg, "Invalid response"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_without_url_returns_empty() {
    let (client, transport) = scripted_client(Some(KEY));
    transport.push_response(r#"{"filename":"x.csv"}"#);

    let file = client
        .publish_file("0,0\n100,100", ControlFileKind::Csv, Some("x.csv"))
        .await
        .unwrap();
    assert_eq!(file.url, "");
}

// =============================================================================
// Synchronized Playback
// =============================================================================

#[tokio::test]
async fn test_prepare_play_pause() {
    let server = create_test_server().await;
    let points: Vec<PatternPoint> = vec![(0, 0).into(), (500, 100).into()];

    let file = server.client.publish_pattern(&points, None).await.unwrap();
    server.client.sync_prepare(&file).await.unwrap();
    assert_eq!(server.client.mode(), Mode::Sync);
    assert_eq!(server.device.mode(), Mode::Sync);

    let state = server.client.sync_play(1_500).await.unwrap();
    assert!(state.playing);
    assert!(server.device.is_playing());
    // No offset known yet
    assert_eq!(server.device.last_server_time(), None);

    let state = server.client.sync_pause().await.unwrap();
    assert!(!state.playing);
    assert!(!server.device.is_playing());

    assert_eq!(
        server.device.calls(),
        vec!["syncPrepare", "syncPlay", "syncPlay"]
    );
}

#[tokio::test]
async fn test_play_sends_server_time_after_sync() {
    let device = FakeDevice::new(KEY).with_server_skew(60_000);
    let server = TestServer::start(device, KEY).await.unwrap();

    server.client.synchronize_clock(3).await.unwrap();
    let file = server
        .client
        .publish_pattern(&[PatternPoint::new(0, 50)], None)
        .await
        .unwrap();
    server.client.sync_prepare(&file).await.unwrap();
    server.client.sync_play(0).await.unwrap();

    let sent = server.device.last_server_time().unwrap();
    assert!((sent - (now_ms() + 60_000)).abs() < 1_000, "sent {}", sent);
}

#[tokio::test]
async fn test_play_enters_sync_mode_first() {
    let server = create_test_server().await;

    // Nothing prepared, so the device refuses to play after the mode switch
    match server.client.sync_play(0).await {
        Err(HandyError::Device(msg)) => assert_eq!(msg, "No sync file loaded"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(server.device.calls(), vec!["setMode", "syncPlay"]);
    assert_eq!(server.client.mode(), Mode::Sync);
}

#[tokio::test]
async fn test_sync_offset() {
    let server = create_test_server().await;

    assert_eq!(server.client.sync_offset(-250).await.unwrap(), -250);
}
