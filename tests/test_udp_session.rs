//! End-to-end tests over real UDP sockets on loopback.

mod common;

use std::net::SocketAddr;

use common::StubInput;
use rampart_netplay::{
    Config, Event, Frame, GameInput, NonBlockingSocket, PeerConnection, PlayerHandle,
    ProtocolOptions, StateStore, TimeSyncOptions, UdpNonBlockingSocket,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UdpStubConfig;

impl Config for UdpStubConfig {
    type Input = StubInput;
    type Address = SocketAddr;
}

struct NullStore;

impl StateStore for NullStore {
    fn checksum(&self, _frame: Frame) -> Option<u32> {
        None
    }
}

fn loopback_pair() -> (UdpNonBlockingSocket, SocketAddr, UdpNonBlockingSocket, SocketAddr) {
    let socket_a = UdpNonBlockingSocket::bind_to_port(0).expect("bind failed");
    let socket_b = UdpNonBlockingSocket::bind_to_port(0).expect("bind failed");
    let addr_a: SocketAddr = format!("127.0.0.1:{}", socket_a.local_addr().expect("no addr").port())
        .parse()
        .expect("bad addr");
    let addr_b: SocketAddr = format!("127.0.0.1:{}", socket_b.local_addr().expect("no addr").port())
        .parse()
        .expect("bad addr");
    (socket_a, addr_a, socket_b, addr_b)
}

fn create_connection(peer_addr: SocketAddr, seed: u64) -> PeerConnection<UdpStubConfig> {
    common::init_tracing();
    PeerConnection::new(
        peer_addr,
        PlayerHandle::new(1),
        2,
        Box::new(NullStore),
        ProtocolOptions {
            rng_seed: Some(seed),
            sync_first_retry_interval: web_time::Duration::from_millis(5),
            sync_retry_interval: web_time::Duration::from_millis(5),
            ..ProtocolOptions::default()
        },
        TimeSyncOptions::default(),
    )
}

fn tick(connection: &mut PeerConnection<UdpStubConfig>, socket: &mut UdpNonBlockingSocket) {
    for (_, packet) in socket.receive_all() {
        connection.handle_message(&packet);
    }
    connection.update();
    connection.send_all_messages(socket);
}

#[test]
fn peers_synchronize_over_loopback_udp() {
    let (mut socket_a, addr_a, mut socket_b, addr_b) = loopback_pair();

    let mut a = create_connection(addr_b, 17);
    let mut b = create_connection(addr_a, 18);
    a.synchronize();
    b.synchronize();

    // Loopback delivery can lag, so retry with short sleeps.
    for _ in 0..200 {
        tick(&mut a, &mut socket_a);
        tick(&mut b, &mut socket_b);
        if a.is_running() && b.is_running() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    assert!(a.is_running(), "A never finished the handshake");
    assert!(b.is_running(), "B never finished the handshake");

    // One input makes it across the real socket.
    let _ = a.send_input(GameInput::new(Frame::new(0), StubInput { inp: 77 }));
    let mut delivered = None;
    for _ in 0..200 {
        tick(&mut a, &mut socket_a);
        tick(&mut b, &mut socket_b);
        delivered = b.poll_events().find_map(|event| match event {
            Event::Input(input) => Some(input),
            _ => None,
        });
        if delivered.is_some() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    assert_eq!(
        delivered,
        Some(GameInput::new(Frame::new(0), StubInput { inp: 77 }))
    );
}
