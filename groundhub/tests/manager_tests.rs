use std::io::Cursor;
use std::sync::Once;
use std::time::Duration;

use portpicker::Port;
use serde_json::json;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use groundhub::bus::topics::{PLANE_STATUS, TELEMETRY};
use groundhub::bus::{Hub, RateLimit};
use groundhub::dialects::common::enums::MavMissionResult;
use groundhub::dialects::common::messages::{
    GlobalPositionInt, Heartbeat, MissionAck, MissionRequestInt,
};
use groundhub::dialects::Common;
use groundhub::mavio::io::{StdIoReader, TokioReader, TokioWriter};
use groundhub::mavio::protocol::{Versionless, V2};
use groundhub::mavio::{AsyncReceiver, AsyncSender, Frame, Receiver};
use groundhub::mavlink::{
    ConnectionManager, ConnectionState, ManagerConf, ManagerHandle, PipelineConf,
    TransportDescriptor,
};
use groundhub::telemetry::Telemetry;

static INIT: Once = Once::new();
const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Debug;
const HOST: &str = "127.0.0.1";
const RECONNECT_INTERVAL: Duration = Duration::from_millis(100);
const WAIT_DURATION: Duration = Duration::from_millis(50);
const WAIT_LONG_DURATION: Duration = Duration::from_secs(2);

fn initialize() {
    INIT.call_once(|| {
        env_logger::builder()
            // Suppress everything below `warn` for third-party modules
            .filter_level(log::LevelFilter::Warn)
            // Allow everything above `LOG_LEVEL` from current package
            .filter_module(env!("CARGO_PKG_NAME"), LOG_LEVEL)
            .init();
    });
}

fn unused_port() -> Port {
    portpicker::pick_unused_port().unwrap()
}

fn make_addr(port: Port) -> String {
    format!("{HOST}:{port}")
}

fn tcp_descriptor(port: Port) -> TransportDescriptor {
    format!("tcp:{}", make_addr(port)).parse().unwrap()
}

fn vehicle_frame<M: groundhub::mavio::protocol::Message>(message: &M) -> Frame<Versionless> {
    Frame::builder()
        .sequence(0)
        .system_id(1)
        .component_id(1)
        .version(V2)
        .message(message)
        .unwrap()
        .build()
        .into_versionless()
}

/// Same frame with a broken checksum.
fn corrupted(frame: &Frame<Versionless>) -> Frame<Versionless> {
    let mut bytes = vec![0u8; frame.size()];
    frame.serialize(&mut bytes).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;

    let mut receiver: Receiver<std::io::Error, StdIoReader<Cursor<Vec<u8>>>, Versionless> =
        Receiver::new(StdIoReader::new(Cursor::new(bytes)));
    receiver.recv().unwrap()
}

struct FakeVehicle {
    receiver: AsyncReceiver<std::io::Error, TokioReader<OwnedReadHalf>, Versionless>,
    sender: AsyncSender<std::io::Error, TokioWriter<OwnedWriteHalf>, Versionless>,
}

impl FakeVehicle {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = tokio::time::timeout(WAIT_LONG_DURATION, listener.accept())
            .await
            .unwrap()
            .unwrap();
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            receiver: AsyncReceiver::new(TokioReader::new(reader)),
            sender: AsyncSender::new(TokioWriter::new(writer)),
        }
    }

    async fn send<M: groundhub::mavio::protocol::Message>(&mut self, message: &M) {
        self.sender.send(&vehicle_frame(message)).await.unwrap();
    }

    async fn send_corrupted<M: groundhub::mavio::protocol::Message>(&mut self, message: &M) {
        self.sender
            .send(&corrupted(&vehicle_frame(message)))
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> Common {
        let frame = tokio::time::timeout(WAIT_LONG_DURATION, self.receiver.recv())
            .await
            .unwrap()
            .unwrap();
        frame.decode::<Common>().unwrap()
    }

    async fn recv_frame(&mut self, timeout: Duration) -> Option<Frame<Versionless>> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .ok()
            .and_then(|res| res.ok())
    }
}

fn spawn_manager(conf: ManagerConf, hub: &Hub) -> ManagerHandle {
    let (manager, handle) = ConnectionManager::new(conf, hub.clone());
    manager
        .with_default_pipeline(PipelineConf::default())
        .spawn();
    handle
}

async fn wait_connected(handle: &ManagerHandle) {
    tokio::time::timeout(
        WAIT_LONG_DURATION,
        handle.wait_for(ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn reconnects_once_vehicle_is_reachable() {
    initialize();
    let hub = Hub::with_default_topics();
    let port = unused_port();

    let handle = spawn_manager(
        ManagerConf::new(tcp_descriptor(port)).reconnect_interval(RECONNECT_INTERVAL),
        &hub,
    );

    // Several reconnection intervals against a closed port.
    tokio::time::sleep(RECONNECT_INTERVAL * 5).await;
    assert!(!handle.is_connected());
    assert!(!handle.is_shut_down());

    let listener = TcpListener::bind(make_addr(port)).await.unwrap();
    let _vehicle = FakeVehicle::accept(&listener).await;
    wait_connected(&handle).await;

    handle.shutdown();
    tokio::time::timeout(
        WAIT_LONG_DURATION,
        handle.wait_for(ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn broken_link_is_rebuilt() {
    initialize();
    let hub = Hub::with_default_topics();
    let port = unused_port();
    let listener = TcpListener::bind(make_addr(port)).await.unwrap();

    let handle = spawn_manager(
        ManagerConf::new(tcp_descriptor(port)).reconnect_interval(RECONNECT_INTERVAL),
        &hub,
    );
    let vehicle = FakeVehicle::accept(&listener).await;
    wait_connected(&handle).await;

    drop(vehicle);
    let _vehicle = FakeVehicle::accept(&listener).await;
    wait_connected(&handle).await;

    handle.shutdown();
}

#[tokio::test]
async fn frames_are_routed_and_decoded() {
    initialize();
    let hub = Hub::with_default_topics();
    let mut telemetry = hub.subscribe(TELEMETRY, RateLimit::Unlimited).unwrap();

    let plane_port = unused_port();
    let router_port = unused_port();
    let plane_listener = TcpListener::bind(make_addr(plane_port)).await.unwrap();
    let router_listener = TcpListener::bind(make_addr(router_port)).await.unwrap();

    let handle = spawn_manager(
        ManagerConf::new(tcp_descriptor(plane_port))
            .routers(vec![tcp_descriptor(router_port)])
            .reconnect_interval(RECONNECT_INTERVAL),
        &hub,
    );
    let mut vehicle = FakeVehicle::accept(&plane_listener).await;
    let mut router = FakeVehicle::accept(&router_listener).await;
    wait_connected(&handle).await;

    vehicle.send(&Heartbeat::default()).await;
    vehicle
        .send(&GlobalPositionInt {
            lat: 381_450_000,
            lon: -764_270_000,
            alt: 30_500,
            hdg: 18_000,
            ..Default::default()
        })
        .await;

    assert!(matches!(router.recv().await, Common::Heartbeat(_)));
    assert!(matches!(router.recv().await, Common::GlobalPositionInt(_)));
    // Nothing is echoed back to the vehicle.
    assert!(vehicle.recv_frame(WAIT_DURATION * 4).await.is_none());

    let sample: Telemetry = telemetry
        .recv_timeout(WAIT_LONG_DURATION)
        .await
        .unwrap()
        .decode()
        .unwrap();
    assert!((sample.latitude - 38.145).abs() < 1e-9);
    assert_eq!(sample.heading, 180.0);

    handle.shutdown();
}

#[tokio::test]
async fn mission_upload_against_scripted_vehicle() {
    initialize();
    let hub = Hub::with_default_topics();
    let mut status = hub.subscribe(PLANE_STATUS, RateLimit::Unlimited).unwrap();
    let port = unused_port();
    let listener = TcpListener::bind(make_addr(port)).await.unwrap();

    let handle = spawn_manager(
        ManagerConf::new(tcp_descriptor(port)).reconnect_interval(RECONNECT_INTERVAL),
        &hub,
    );
    let mut vehicle = FakeVehicle::accept(&listener).await;
    wait_connected(&handle).await;

    let envelope = json!({
        "type": "send",
        "rec": "mission_upload",
        "data": [
            {"latitude": 38.1462, "longitude": -76.4281, "altitude": 50.0},
            {"latitude": 38.1501, "longitude": -76.4302, "altitude": 60.0},
        ],
    });
    assert!(hub.handle_message(envelope.to_string().as_bytes()));

    match vehicle.recv().await {
        Common::MissionCount(msg) => assert_eq!(msg.count, 2),
        other => panic!("unexpected message: {other:?}"),
    }
    for seq in 0..2u16 {
        vehicle
            .send(&MissionRequestInt {
                target_system: 255,
                target_component: 190,
                seq,
                ..Default::default()
            })
            .await;
        match vehicle.recv().await {
            Common::MissionItemInt(msg) => {
                assert_eq!(msg.seq, seq);
                assert_eq!(msg.target_system, 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
    vehicle
        .send(&MissionAck {
            target_system: 255,
            target_component: 190,
            type_: MavMissionResult::MavMissionAccepted,
            ..Default::default()
        })
        .await;

    let message = status.recv_timeout(WAIT_LONG_DURATION).await.unwrap();
    assert_eq!(
        message.value(),
        &json!({"mission_upload": {"status": "accepted", "count": 2}})
    );

    handle.shutdown();
}

#[tokio::test]
async fn endpoints_can_be_replaced() {
    initialize();
    let hub = Hub::with_default_topics();
    let first_port = unused_port();
    let second_port = unused_port();
    let first = TcpListener::bind(make_addr(first_port)).await.unwrap();
    let second = TcpListener::bind(make_addr(second_port)).await.unwrap();

    let handle = spawn_manager(
        ManagerConf::new(tcp_descriptor(first_port)).reconnect_interval(RECONNECT_INTERVAL),
        &hub,
    );
    let _first_vehicle = FakeVehicle::accept(&first).await;
    wait_connected(&handle).await;

    handle
        .update_endpoints(tcp_descriptor(second_port), Vec::new())
        .await
        .unwrap();
    let _second_vehicle = FakeVehicle::accept(&second).await;
    wait_connected(&handle).await;

    handle.shutdown();
}

#[tokio::test]
async fn reconnect_attempts_respect_interval() {
    initialize();
    let hub = Hub::with_default_topics();
    let port = unused_port();
    let listener = TcpListener::bind(make_addr(port)).await.unwrap();

    let handle = spawn_manager(
        ManagerConf::new(tcp_descriptor(port)).reconnect_interval(RECONNECT_INTERVAL),
        &hub,
    );

    let mut accepted = Vec::new();
    for _ in 0..3 {
        let vehicle = FakeVehicle::accept(&listener).await;
        accepted.push(Instant::now());
        drop(vehicle);
    }

    for pair in accepted.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= RECONNECT_INTERVAL, "reconnected after {gap:?}");
    }

    handle.shutdown();
}

#[tokio::test]
async fn invalid_frame_streak_rebuilds_links() {
    initialize();
    let hub = Hub::with_default_topics();
    let port = unused_port();
    let listener = TcpListener::bind(make_addr(port)).await.unwrap();

    let handle = spawn_manager(
        ManagerConf::new(tcp_descriptor(port))
            .reconnect_interval(RECONNECT_INTERVAL)
            .decode_error_threshold(2),
        &hub,
    );
    let mut vehicle = FakeVehicle::accept(&listener).await;
    wait_connected(&handle).await;

    for _ in 0..3 {
        vehicle.send_corrupted(&Heartbeat::default()).await;
    }

    // The vehicle keeps its connection open, the manager gives up on it anyway.
    let _rebuilt = FakeVehicle::accept(&listener).await;
    wait_connected(&handle).await;

    handle.shutdown();
}

#[tokio::test]
async fn valid_frames_reset_invalid_streak() {
    initialize();
    let hub = Hub::with_default_topics();
    let port = unused_port();
    let listener = TcpListener::bind(make_addr(port)).await.unwrap();

    let handle = spawn_manager(
        ManagerConf::new(tcp_descriptor(port))
            .reconnect_interval(RECONNECT_INTERVAL)
            .decode_error_threshold(2),
        &hub,
    );
    let mut vehicle = FakeVehicle::accept(&listener).await;
    wait_connected(&handle).await;

    for _ in 0..3 {
        vehicle.send_corrupted(&Heartbeat::default()).await;
        vehicle.send_corrupted(&Heartbeat::default()).await;
        vehicle.send(&Heartbeat::default()).await;
    }

    let reconnect = tokio::time::timeout(RECONNECT_INTERVAL * 4, listener.accept()).await;
    assert!(reconnect.is_err(), "links were rebuilt");
    assert!(handle.is_connected());

    handle.shutdown();
}
