//! Push-channel delivery: photos, telemetry, lossy links

use crate::harness::{HarnessConfig, TestServer, free_udp_port};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use vahana_link::core::FrameSource;
use vahana_link::devices::camera::SyntheticCamera;
use vahana_link::streaming::fragment::{LossPolicy, split};
use vahana_link::streaming::{
    FramePublisher, FrameReceiver, ImageDecoder, RawDecoder, SubscriberRegistry, TelemetryDecoder,
};

fn receiver<D: vahana_link::streaming::FrameDecoder>(
    decoder: D,
    policy: LossPolicy,
) -> (FrameReceiver<D>, SocketAddr) {
    let rx = FrameReceiver::bind("127.0.0.1:0", decoder, policy).unwrap();
    rx.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
    let addr = rx.local_addr().unwrap();
    (rx, addr)
}

#[test]
fn test_receive_photo() {
    let server = TestServer::start();
    let client = server.client();

    let photo = client.receive_photo(Duration::from_secs(3)).unwrap();
    assert_eq!((photo.width(), photo.height()), (64, 48));

    // The requester was not subscribed by asking for a photo
    assert!(server.handle.photo_registry().is_empty());
}

#[test]
fn test_broadcast_reaches_every_subscriber() {
    let server = TestServer::start_with(HarnessConfig {
        capture_interval: Duration::from_millis(30),
        ..HarnessConfig::default()
    });

    let (mut a, a_addr) = receiver(ImageDecoder, LossPolicy::Splice);
    let (mut b, b_addr) = receiver(ImageDecoder, LossPolicy::Splice);
    let registry = server.handle.photo_registry();
    assert!(registry.register(a_addr));
    assert!(registry.register(b_addr));
    assert!(!registry.register(a_addr));

    // Receivers join mid-stream and resynchronize on their own
    let img_a = a.receive_frame().unwrap();
    let img_b = b.receive_frame().unwrap();
    assert_eq!((img_a.width(), img_a.height()), (64, 48));
    assert_eq!((img_b.width(), img_b.height()), (64, 48));
    assert!(a.is_aligned() && b.is_aligned());
}

#[test]
fn test_telemetry_push() {
    let telemetry_port = free_udp_port();
    let server = TestServer::start_with(HarnessConfig {
        telemetry_port,
        ..HarnessConfig::default()
    });
    let client = server.client();

    let mut rx = FrameReceiver::bind(
        ("127.0.0.1", telemetry_port),
        TelemetryDecoder,
        LossPolicy::StrictCountdown,
    )
    .unwrap();
    rx.set_read_timeout(Some(Duration::from_secs(3))).unwrap();

    client.add_udp().unwrap();
    let first = rx.receive_frame().unwrap();
    assert!(!first.misc.in_air);

    client.arm_takeoff(30.0).unwrap();
    let airborne = (0..100)
        .map(|_| rx.receive_frame().unwrap())
        .find(|t| t.misc.in_air)
        .expect("telemetry push never reported the takeoff");
    assert_eq!(airborne.position.alt_rel, 30.0);
}

#[test]
fn test_multi_fragment_frames_survive_fanout() {
    let registry = SubscriberRegistry::shared();
    let (mut a, a_addr) = receiver(RawDecoder, LossPolicy::StrictCountdown);
    let (mut b, b_addr) = receiver(RawDecoder, LossPolicy::StrictCountdown);
    registry.register(a_addr);
    registry.register(b_addr);

    let mut publisher = FramePublisher::bind_ephemeral(512).unwrap();
    let frames: Vec<Vec<u8>> = (0..3u8)
        .map(|i| (0..4000u32).map(|j| (j as u8).wrapping_mul(i + 1)).collect())
        .collect();

    for frame in &frames {
        let report = publisher.send_frame(frame, &registry.snapshot()).unwrap();
        assert_eq!(report.fragments, 8);
        assert_eq!(report.sent, 16);
    }

    // Unaligned receivers spend the first frame finding a boundary
    for expected in &frames[1..] {
        assert_eq!(&a.receive_frame().unwrap(), expected);
        assert_eq!(&b.receive_frame().unwrap(), expected);
    }
}

#[test]
fn test_lossy_link_then_recovery() {
    let (rx, addr) = receiver(ImageDecoder, LossPolicy::StrictCountdown);
    let mut rx = rx.assume_aligned();
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

    let mut camera = SyntheticCamera::new(320, 240, 90);
    let jpeg = camera.capture().unwrap();
    let max_chunk = jpeg.len() / 4 + 1;

    let mut buf = Vec::new();
    let fragments = split(&jpeg, max_chunk).unwrap();
    assert!(fragments.len() >= 4);

    // Lose the second fragment of the first frame
    for (i, frag) in fragments.iter().enumerate() {
        if i != 1 {
            frag.encode_into(&mut buf);
            sender.send_to(&buf, addr).unwrap();
        }
    }
    // Spurious empty datagram between frames is harmless at a boundary
    sender.send_to(&[], addr).unwrap();
    for frag in &fragments {
        frag.encode_into(&mut buf);
        sender.send_to(&buf, addr).unwrap();
    }

    let image = rx.receive_frame().unwrap();
    assert_eq!((image.width(), image.height()), (320, 240));
    assert_eq!(rx.discarded_frames(), 1);
}
