use compass_stream::{
    ConnectionEvent, ConnectionManager, ConnectionState, DisconnectReason, Error, HeadingMessage,
    OrientationState, SensorKind, SensorSample, SensorSource, SessionConfig, SessionController,
    SimulatedSettings, SimulatedSource, StopOutcome, StreamSettings, Subscription,
};
use futures_util::StreamExt;
use nalgebra::Vector3;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// What the test server observed, per connection id
#[derive(Debug, Clone, PartialEq)]
enum ServerEvent {
    Opened(usize),
    Text(usize, String),
    /// Close code and reason from the client's close frame, if one arrived
    Closed(usize, Option<(u16, String)>),
}

struct TestServer {
    address: String,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl TestServer {
    async fn next(&mut self) -> ServerEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("server event timed out")
            .expect("server stopped")
    }

    /// Next text frame, skipping lifecycle events
    async fn next_text(&mut self) -> String {
        loop {
            if let ServerEvent::Text(_, text) = self.next().await {
                return text;
            }
        }
    }

    /// Wait for connection `id` to close
    async fn closed(&mut self, id: usize) -> Option<(u16, String)> {
        loop {
            if let ServerEvent::Closed(closed_id, frame) = self.next().await {
                if closed_id == id {
                    return frame;
                }
            }
        }
    }

    /// Drain whatever has already arrived
    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

/// WebSocket server on an ephemeral port
///
/// With `close_after`, the server sends its own close frame once it has
/// received that many text frames on a connection.
async fn spawn_server(close_after: Option<usize>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}/compass", listener.local_addr().unwrap());
    let (tx, events) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut next_id = 0;
        while let Ok((stream, _)) = listener.accept().await {
            next_id += 1;
            let id = next_id;
            let tx = tx.clone();

            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                let _ = tx.send(ServerEvent::Opened(id));

                let mut received = 0;
                let mut close = None;
                while let Some(message) = ws.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            received += 1;
                            let _ = tx.send(ServerEvent::Text(id, text.to_string()));
                            if Some(received) == close_after {
                                let _ = ws.close(None).await;
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            close = frame.map(|f| (u16::from(f.code), f.reason.to_string()));
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
                let _ = tx.send(ServerEvent::Closed(id, close));
            });
        }
    });

    TestServer { address, events }
}

/// An address nothing listens on
async fn unused_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}/compass", listener.local_addr().unwrap());
    drop(listener);
    address
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("connection event timed out")
        .expect("event channel closed")
}

fn fast_settings(tick_ms: u64) -> StreamSettings {
    StreamSettings {
        tick_interval: Duration::from_millis(tick_ms),
        close_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

/// Reports both sensors but only ever delivers gravity
struct GravityOnlySource;

impl SensorSource for GravityOnlySource {
    fn has_sensor(&self, _kind: SensorKind) -> bool {
        true
    }

    fn subscribe(&self, sink: Arc<OrientationState>) -> compass_stream::Result<Subscription> {
        sink.record(SensorSample::gravity(Vector3::new(0.0, 0.0, 9.8)));
        Ok(Subscription::inert())
    }
}

#[tokio::test]
async fn test_streams_level_north_heading() {
    let mut server = spawn_server(None).await;
    let source = Arc::new(SimulatedSource::fixed(0.0));
    let (mut controller, mut events) = SessionController::new(source, fast_settings(50));

    controller
        .start(SessionConfig::new(server.address.clone(), false))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    for _ in 0..3 {
        let text = server.next_text().await;
        assert_eq!(text, r#"{"azimuth":0.0}"#);
        assert_eq!(HeadingMessage::decode(&text).unwrap().azimuth, 0.0);
    }

    let outcome = controller.stop().await.unwrap();
    let StopOutcome::Stopped(report) = outcome else {
        panic!("expected a stopped session, got {:?}", outcome);
    };
    assert!(report.frames_sent >= 3, "report {:?}", report);
    assert!(report.readings >= report.frames_sent);

    assert_eq!(server.closed(1).await, Some((1000, String::new())));
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected(DisconnectReason::Closed)
    );
    assert!(!controller.is_active());
}

#[tokio::test]
async fn test_calibrated_session_starts_at_zero() {
    let mut server = spawn_server(None).await;
    let source = Arc::new(SimulatedSource::fixed(90.0));
    let (mut controller, mut events) = SessionController::new(source, fast_settings(40));

    controller
        .start(SessionConfig::new(server.address.clone(), true))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    for _ in 0..2 {
        let heading = HeadingMessage::decode(&server.next_text().await).unwrap();
        assert_eq!(heading.azimuth, 0.0);
    }

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_calibrated_rotation_is_relative() {
    let mut server = spawn_server(None).await;
    let source = Arc::new(SimulatedSource::new(SimulatedSettings {
        start_heading: 200.0,
        rotation_rate: 90.0,
        sample_period: Duration::from_millis(5),
        ..Default::default()
    }));
    let (mut controller, mut events) = SessionController::new(source, fast_settings(50));

    controller
        .start(SessionConfig::new(server.address.clone(), true))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    // The device keeps turning clockwise from wherever it was zeroed, so
    // calibrated readings grow from zero instead of starting near 200°.
    let mut headings = Vec::new();
    for _ in 0..4 {
        headings.push(HeadingMessage::decode(&server.next_text().await).unwrap().azimuth);
    }
    controller.stop().await.unwrap();

    for heading in &headings {
        assert!((0.0..360.0).contains(heading), "headings {:?}", headings);
        assert!(*heading < 180.0, "headings {:?}", headings);
    }
    assert!(headings.windows(2).all(|w| w[1] > w[0]), "headings {:?}", headings);
}

#[tokio::test]
async fn test_no_reading_until_both_sensors_report() {
    let mut server = spawn_server(None).await;
    let (mut controller, mut events) =
        SessionController::new(Arc::new(GravityOnlySource), fast_settings(20));

    controller
        .start(SessionConfig::new(server.address.clone(), true))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let StopOutcome::Stopped(report) = controller.stop().await.unwrap() else {
        panic!("session should have been running");
    };
    assert!(report.ticks > 0);
    assert_eq!(report.readings, 0);
    assert_eq!(report.frames_sent, 0);
    assert_eq!(report.dropped_sends, 0);

    server.closed(1).await;
    assert!(
        !server
            .drain()
            .iter()
            .any(|e| matches!(e, ServerEvent::Text(..))),
        "no frame may be sent without a heading"
    );
}

#[tokio::test]
async fn test_missing_sensor_is_fatal_to_start() {
    let mut server = spawn_server(None).await;
    let source = Arc::new(SimulatedSource::new(SimulatedSettings {
        magnetometer: false,
        ..Default::default()
    }));
    let (mut controller, _events) = SessionController::new(source, fast_settings(20));

    let result = controller
        .start(SessionConfig::new(server.address.clone(), false))
        .await;
    assert!(matches!(
        result,
        Err(Error::SensorUnavailable(SensorKind::Magnetometer))
    ));
    assert!(!controller.is_active());

    // No connection was attempted
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.drain().is_empty());
}

#[tokio::test]
async fn test_zero_tick_interval_is_rejected_at_start() {
    let mut server = spawn_server(None).await;
    let source = Arc::new(SimulatedSource::fixed(0.0));
    let settings = StreamSettings {
        tick_interval: Duration::ZERO,
        ..Default::default()
    };
    let (mut controller, _events) = SessionController::new(source, settings);

    let result = controller
        .start(SessionConfig::new(server.address.clone(), false))
        .await;
    assert!(matches!(result, Err(Error::Config(_))), "got {:?}", result.err());
    assert!(!controller.is_active());
    assert_eq!(controller.stop().await.unwrap(), StopOutcome::NotRunning);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.drain().is_empty());
}

#[tokio::test]
async fn test_stop_without_session() {
    let source = Arc::new(SimulatedSource::fixed(0.0));
    let (mut controller, _events) = SessionController::new(source, fast_settings(20));
    assert_eq!(controller.stop().await.unwrap(), StopOutcome::NotRunning);
}

#[tokio::test]
async fn test_restart_replaces_previous_session() {
    let mut server = spawn_server(None).await;
    let source = Arc::new(SimulatedSource::fixed(45.0));
    let (mut controller, mut events) = SessionController::new(source, fast_settings(30));

    controller
        .start(SessionConfig::new(server.address.clone(), false))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);

    controller
        .start(SessionConfig::new(server.address.clone(), true))
        .await
        .unwrap();

    // The first connection is fully closed before the second one opens
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected(DisconnectReason::Closed)
    );
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(server.closed(1).await, Some((1000, String::new())));

    // The replacement session is calibrated
    let heading = HeadingMessage::decode(&server.next_text().await).unwrap();
    assert_eq!(heading.azimuth, 0.0);

    controller.stop().await.unwrap();
    assert_eq!(server.closed(2).await, Some((1000, String::new())));
}

#[tokio::test]
async fn test_stop_mid_cycle_finishes_within_one_tick() {
    let tick = Duration::from_millis(300);
    let mut server = spawn_server(None).await;
    let source = Arc::new(SimulatedSource::fixed(10.0));
    let (mut controller, mut events) = SessionController::new(
        source,
        StreamSettings {
            tick_interval: tick,
            ..Default::default()
        },
    );

    controller
        .start(SessionConfig::new(server.address.clone(), false))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    server.next_text().await;

    // Halfway to the next tick
    tokio::time::sleep(tick / 2).await;
    let started = Instant::now();
    let outcome = controller.stop().await.unwrap();
    let elapsed = started.elapsed();

    assert!(matches!(outcome, StopOutcome::Stopped(_)));
    assert!(elapsed < tick, "stop took {:?}", elapsed);
    assert_eq!(server.closed(1).await, Some((1000, String::new())));
}

#[tokio::test]
async fn test_unreachable_server_keeps_ticking() {
    let address = unused_address().await;
    let source = Arc::new(SimulatedSource::fixed(0.0));
    let (mut controller, mut events) = SessionController::new(source, fast_settings(20));

    controller
        .start(SessionConfig::new(address, false))
        .await
        .unwrap();

    let event = next_event(&mut events).await;
    assert!(
        matches!(
            event,
            ConnectionEvent::Disconnected(DisconnectReason::ConnectFailed(_))
        ),
        "got {:?}",
        event
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    let StopOutcome::Stopped(report) = controller.stop().await.unwrap() else {
        panic!("session should still be running after a connect failure");
    };
    assert!(report.readings > 0, "report {:?}", report);
    assert_eq!(report.frames_sent, 0);
    assert_eq!(report.dropped_sends, report.readings);

    // The failure was already reported; closing adds nothing
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_malformed_address_reports_connect_failure() {
    let source = Arc::new(SimulatedSource::fixed(0.0));
    let (mut controller, mut events) = SessionController::new(source, fast_settings(20));

    controller
        .start(SessionConfig::new("not a websocket url", false))
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected(DisconnectReason::ConnectFailed(_))
    ));
    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_server_close_is_reported() {
    let mut server = spawn_server(Some(2)).await;
    let source = Arc::new(SimulatedSource::fixed(0.0));
    let (mut controller, mut events) = SessionController::new(source, fast_settings(20));

    controller
        .start(SessionConfig::new(server.address.clone(), false))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected(DisconnectReason::ClosedByPeer)
    );

    // Loop survives the lost connection and still stops cleanly
    tokio::time::sleep(Duration::from_millis(60)).await;
    let StopOutcome::Stopped(report) = controller.stop().await.unwrap() else {
        panic!("session should still be running after the server closed");
    };
    assert!(report.dropped_sends > 0, "report {:?}", report);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_connection_manager_lifecycle() {
    let mut server = spawn_server(None).await;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut connection =
        ConnectionManager::connect(&server.address, &fast_settings(20), events_tx);

    // The I/O task has not run yet
    assert_eq!(connection.state(), ConnectionState::Connecting);
    assert!(!connection.send("early".to_owned()));

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(connection.send(r#"{"azimuth":12.5}"#.to_owned()));
    assert_eq!(server.next_text().await, r#"{"azimuth":12.5}"#);

    connection.close(1000, "bye").await;
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected(DisconnectReason::Closed)
    );
    assert_eq!(server.closed(1).await, Some((1000, "bye".to_owned())));

    assert_eq!(connection.frames_sent(), 1);
    assert_eq!(connection.dropped_sends(), 1);
    assert!(!connection.send("late".to_owned()));

    // Closing again is a no-op
    connection.close(1000, "").await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_close_with_unbounded_timeout() {
    let mut server = spawn_server(None).await;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let settings = StreamSettings {
        close_timeout: Duration::from_millis(u64::MAX),
        send_queue_capacity: usize::MAX,
        ..Default::default()
    };
    let mut connection = ConnectionManager::connect(&server.address, &settings, events_tx);

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    timeout(WAIT, connection.close(1000, ""))
        .await
        .expect("close should finish once the peer confirms");

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(server.closed(1).await, Some((1000, String::new())));
}
