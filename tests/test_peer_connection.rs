//! End-to-end peer connection tests over in-memory sockets.
//!
//! Each test drives the full host loop (receive, update, send, poll events)
//! on both ends of a socket pair.

mod common;

use common::{
    create_connection, synchronize_pair, test_options, tick, FixedStore, InMemorySocket, StubInput,
};
use rampart_netplay::{
    Event, Frame, GameInput, ProtocolOptions, ProtocolStatus, SendInputResult,
};
use web_time::Duration;

fn running_pair() -> (
    rampart_netplay::PeerConnection<common::StubConfig>,
    InMemorySocket,
    rampart_netplay::PeerConnection<common::StubConfig>,
    InMemorySocket,
) {
    let (mut socket_a, mut socket_b) = InMemorySocket::pair();
    let mut a = create_connection(1, test_options(100), Box::new(FixedStore(0xAAAA)));
    let mut b = create_connection(0, test_options(200), Box::new(FixedStore(0xAAAA)));
    synchronize_pair(&mut a, &mut socket_a, &mut b, &mut socket_b);
    let _ = a.poll_events().count();
    let _ = b.poll_events().count();
    (a, socket_a, b, socket_b)
}

#[test]
fn handshake_completes_and_reports_progress() {
    let (mut socket_a, mut socket_b) = InMemorySocket::pair();
    let mut a = create_connection(1, test_options(1), Box::new(FixedStore(0)));
    let mut b = create_connection(0, test_options(2), Box::new(FixedStore(0)));

    synchronize_pair(&mut a, &mut socket_a, &mut b, &mut socket_b);

    for connection in [&mut a, &mut b] {
        let events: Vec<_> = connection.poll_events().collect();
        assert!(events.contains(&Event::Connected));

        // Progress counts are monotone and end at total/total.
        let counts: Vec<u32> = events
            .iter()
            .filter_map(|event| match event {
                Event::Synchronizing { count, .. } => Some(*count),
                _ => None,
            })
            .collect();
        assert!(!counts.is_empty());
        assert!(counts.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(
            counts.last(),
            Some(&ProtocolOptions::default().number_of_sync_roundtrips)
        );
    }
}

#[test]
fn handshake_fails_without_a_peer() {
    let (mut socket_a, _socket_b) = InMemorySocket::pair();
    let mut a = create_connection(
        1,
        ProtocolOptions {
            max_sync_retries: 4,
            ..test_options(3)
        },
        Box::new(FixedStore(0)),
    );

    a.synchronize();
    for _ in 0..10 {
        tick(&mut a, &mut socket_a);
    }

    let failures = a
        .poll_events()
        .filter(|event| matches!(event, Event::SynchronizationFailure))
        .count();
    assert_eq!(failures, 1);
    assert_eq!(a.status(), ProtocolStatus::Syncing);
}

#[test]
fn input_window_flows_and_retires_on_ack() {
    let (mut a, mut socket_a, mut b, mut socket_b) = running_pair();

    for frame in 10..=15 {
        assert_eq!(
            a.send_input(GameInput::new(
                Frame::new(frame),
                StubInput { inp: frame as u32 }
            )),
            SendInputResult::Ok
        );
    }
    tick(&mut a, &mut socket_a);
    tick(&mut b, &mut socket_b);

    let inputs: Vec<_> = b
        .poll_events()
        .filter_map(|event| match event {
            Event::Input(input) => Some(input),
            _ => None,
        })
        .collect();
    assert_eq!(inputs.len(), 6);
    assert_eq!(inputs.first().map(|input| input.frame), Some(Frame::new(10)));
    assert_eq!(inputs.last().map(|input| input.frame), Some(Frame::new(15)));

    // B's acknowledgement drains A's pending window.
    tick(&mut a, &mut socket_a);
    let stats = a.network_stats().unwrap();
    assert_eq!(stats.pending_input_count, 0);
    assert_eq!(stats.last_acked_frame, Frame::new(15));
}

#[test]
fn lost_acks_leave_window_pending_until_redelivery() {
    let (mut a, mut socket_a, mut b, mut socket_b) = running_pair();

    // B's outbound traffic (including acks) disappears.
    socket_b.drop_outbound = true;

    for frame in 0..4 {
        let _ = a.send_input(GameInput::new(Frame::new(frame), StubInput::default()));
    }
    tick(&mut a, &mut socket_a);
    tick(&mut b, &mut socket_b);
    assert_eq!(a.network_stats().unwrap().pending_input_count, 4);

    // Deliveries resume; the next exchange retires the window, and the
    // duplicate window B received is not delivered twice.
    socket_b.drop_outbound = false;
    let _ = a.send_input(GameInput::new(Frame::new(4), StubInput::default()));
    tick(&mut a, &mut socket_a);
    tick(&mut b, &mut socket_b);
    tick(&mut a, &mut socket_a);

    assert_eq!(a.network_stats().unwrap().pending_input_count, 0);
    let delivered = b
        .poll_events()
        .filter(|event| matches!(event, Event::Input(_)))
        .count();
    assert_eq!(delivered, 5);
}

#[test]
fn silence_interrupts_then_disconnects_exactly_once() {
    let options = ProtocolOptions {
        disconnect_notify_start: Duration::from_millis(5),
        disconnect_timeout: Duration::from_millis(25),
        ..test_options(100)
    };
    let (mut socket_a, mut socket_b) = InMemorySocket::pair();
    let mut a = create_connection(1, options, Box::new(FixedStore(0)));
    let mut b = create_connection(0, test_options(200), Box::new(FixedStore(0)));
    synchronize_pair(&mut a, &mut socket_a, &mut b, &mut socket_b);
    let _ = a.poll_events().count();

    // B goes silent; only A keeps ticking.
    std::thread::sleep(std::time::Duration::from_millis(10));
    for _ in 0..5 {
        tick(&mut a, &mut socket_a);
    }
    let events: Vec<_> = a.poll_events().collect();
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, Event::NetworkInterrupted { .. }))
            .count(),
        1
    );
    assert_eq!(a.status(), ProtocolStatus::Running);

    std::thread::sleep(std::time::Duration::from_millis(30));
    for _ in 0..5 {
        tick(&mut a, &mut socket_a);
    }
    let events: Vec<_> = a.poll_events().collect();
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, Event::Disconnected))
            .count(),
        1
    );
    assert_eq!(a.status(), ProtocolStatus::Disconnected);

    // Terminal state stays quiet.
    for _ in 0..5 {
        tick(&mut a, &mut socket_a);
    }
    assert_eq!(a.poll_events().count(), 0);
}

#[test]
fn mismatched_state_checksums_raise_desync() {
    let (mut socket_a, mut socket_b) = InMemorySocket::pair();
    let options = ProtocolOptions {
        consistency_check_interval: Duration::from_millis(1),
        ..test_options(7)
    };
    let mut a = create_connection(1, options, Box::new(FixedStore(0xABCD_1234)));
    let mut b = create_connection(0, test_options(8), Box::new(FixedStore(0xFFFF_FFFF)));
    synchronize_pair(&mut a, &mut socket_a, &mut b, &mut socket_b);

    // Feed A enough remote frames that a probe frame exists.
    for frame in 0..=20 {
        let _ = b.send_input(GameInput::new(Frame::new(frame), StubInput::default()));
    }
    tick(&mut b, &mut socket_b);
    tick(&mut a, &mut socket_a);

    // Let the probe interval elapse, then run the probe round-trip.
    std::thread::sleep(std::time::Duration::from_millis(2));
    tick(&mut a, &mut socket_a);
    tick(&mut b, &mut socket_b);
    tick(&mut a, &mut socket_a);

    let desyncs: Vec<_> = a
        .poll_events()
        .filter_map(|event| match event {
            Event::DesyncDetected {
                frame,
                local_checksum,
                remote_checksum,
            } => Some((frame, local_checksum, remote_checksum)),
            _ => None,
        })
        .collect();
    assert_eq!(desyncs, vec![(Frame::new(12), 0xABCD_1234, 0xFFFF_FFFF)]);
}

#[test]
fn matching_state_checksums_raise_nothing() {
    let (mut socket_a, mut socket_b) = InMemorySocket::pair();
    let options = ProtocolOptions {
        consistency_check_interval: Duration::from_millis(1),
        ..test_options(9)
    };
    let mut a = create_connection(1, options, Box::new(FixedStore(0xABCD_1234)));
    let mut b = create_connection(0, test_options(10), Box::new(FixedStore(0xABCD_1234)));
    synchronize_pair(&mut a, &mut socket_a, &mut b, &mut socket_b);

    for frame in 0..=20 {
        let _ = b.send_input(GameInput::new(Frame::new(frame), StubInput::default()));
    }
    tick(&mut b, &mut socket_b);
    tick(&mut a, &mut socket_a);

    std::thread::sleep(std::time::Duration::from_millis(2));
    tick(&mut a, &mut socket_a);
    tick(&mut b, &mut socket_b);
    tick(&mut a, &mut socket_a);

    assert!(!a
        .poll_events()
        .any(|event| matches!(event, Event::DesyncDetected { .. })));
}

#[test]
fn explicit_disconnect_reaches_terminal_state() {
    let (mut a, mut socket_a, _b, _socket_b) = running_pair();
    a.disconnect();
    assert_eq!(a.status(), ProtocolStatus::Disconnecting);

    std::thread::sleep(std::time::Duration::from_millis(
        ProtocolOptions::default().shutdown_time.as_millis() as u64 + 10,
    ));
    tick(&mut a, &mut socket_a);
    assert_eq!(a.status(), ProtocolStatus::Disconnected);

    let events: Vec<_> = a.poll_events().collect();
    assert!(events.contains(&Event::Disconnected));
}
