//! Command channel round trips against a live server

use crate::harness::TestServer;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use vahana_link::devices::mock::{SHOT_LEFT_DEG, SHOT_MACZ_DEG, SHOT_NEUTRAL_DEG};
use vahana_link::{Client, Command, ErrorKind, Response, Telemetry};

#[test]
fn test_flight_sequence() {
    let server = TestServer::start();
    let client = server.client();

    let t = client.telemetry().unwrap();
    assert!(!t.misc.armed);
    assert!(!t.misc.in_air);
    assert!(t.misc.health);

    client.arm_takeoff(12.0).unwrap();
    client.goto(47.3977, 8.5456, 25.0, 180.0).unwrap();
    client.hold().unwrap();

    let t = client.telemetry().unwrap();
    assert!(t.misc.in_air);
    assert_eq!(t.position.alt_rel, 25.0);
    assert_eq!(t.position.lat, 47.3977);
    assert_eq!(t.angles.yaw, 180.0);

    client.offboard_start().unwrap();
    client.offboard_cmd(1.0, 0.0, -8.0).unwrap();
    client.offboard_stop().unwrap();
    assert_eq!(client.telemetry().unwrap().position.alt_rel, 8.0);

    client.rtl().unwrap();
    let t = client.telemetry().unwrap();
    assert!(!t.misc.in_air);
    assert_eq!(t.position.alt_rel, 0.0);
}

#[test]
fn test_declined_actions() {
    let server = TestServer::start();
    let client = server.client();

    // Not armed
    let err = client.takeoff(10.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LogicalFailure);

    // On the ground
    assert_eq!(client.land().unwrap_err().kind(), ErrorKind::LogicalFailure);
    assert_eq!(
        client.offboard_cmd(0.0, 0.0, -1.0).unwrap_err().kind(),
        ErrorKind::LogicalFailure
    );

    // Raw channel reports the literal as a response, not an error
    assert_eq!(client.send(&Command::Land).unwrap(), Response::Failure);
}

#[test]
fn test_actuator_and_shots() {
    let server = TestServer::start();
    let client = server.client();

    client.actuator(3, 0.25).unwrap();
    assert_eq!(
        client.actuator(42, 0.25).unwrap_err().kind(),
        ErrorKind::LogicalFailure
    );

    client.shot_left().unwrap();
    client.shot_right().unwrap();
    client.shot_parch().unwrap();
    client.shot_macz().unwrap();
    client.shot_neutral().unwrap();
}

#[test]
fn test_shot_positions_reach_driver() {
    use std::time::Duration;
    use vahana_link::devices::mock::{DEFAULT_HOME, MockVehicle};
    use vahana_link::devices::camera::SyntheticCamera;

    let vehicle = MockVehicle::new(DEFAULT_HOME, Duration::ZERO);
    let servo = vehicle.servo_log();

    let mut config = vahana_link::Config::default();
    config.network.bind_address = "127.0.0.1:0".to_string();
    config.network.photo_port = crate::harness::free_udp_port();
    config.network.telemetry_port = config.network.photo_port.wrapping_add(1);
    let handle = vahana_link::Server::new(
        config,
        Box::new(vehicle),
        Box::new(SyntheticCamera::new(16, 16, 50)),
    )
    .start()
    .unwrap();

    let client = Client::connect(handle.control_addr());
    client.shot_left().unwrap();
    client.shot_macz().unwrap();

    assert_eq!(
        *servo.lock(),
        vec![SHOT_LEFT_DEG, SHOT_NEUTRAL_DEG, SHOT_MACZ_DEG, SHOT_NEUTRAL_DEG]
    );
    handle.stop();
}

#[test]
fn test_duplicate_subscriptions_fail() {
    let server = TestServer::start();
    let client = server.client();

    client.sub_photo().unwrap();
    let err = client.sub_photo().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LogicalFailure);
    assert_eq!(server.handle.photo_registry().len(), 1);

    client.add_udp().unwrap();
    assert_eq!(client.add_udp().unwrap_err().kind(), ErrorKind::LogicalFailure);

    let expected = std::net::SocketAddr::new(
        server.addr().ip(),
        server.config.network.telemetry_port,
    );
    assert_eq!(server.handle.telemetry_registry().snapshot(), vec![expected]);
}

#[test]
fn test_legacy_get() {
    let server = TestServer::start();

    let mut stream = TcpStream::connect(server.addr()).unwrap();
    stream.write_all(b"get").unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).unwrap();

    let telemetry: Telemetry = serde_json::from_slice(&reply).unwrap();
    assert!(telemetry.misc.health);

    // Original field names on the wire
    let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert!(value["misc"]["inAir"].is_boolean());
    assert!(value["position"]["alt_rel"].is_number());
}

#[test]
fn test_connection_refused_is_fatal() {
    // Bind then drop to get a port nobody listens on
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let client = Client::connect(addr);
    let err = client.rtl().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[test]
fn test_concurrent_clients() {
    let server = TestServer::start();
    let client = server.client();

    let threads: Vec<_> = (0..4)
        .map(|i| {
            let client = client.clone();
            std::thread::spawn(move || {
                for _ in 0..5 {
                    client.actuator(i + 1, 0.1 * i as f32).unwrap();
                    client.telemetry().unwrap();
                }
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }
}
