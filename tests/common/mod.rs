//! Common test infrastructure shared across integration tests.

// Each integration test binary compiles this module separately and uses a
// different subset of it.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use rampart_netplay::{
    BufferReader, BufferWriter, Config, Frame, NonBlockingSocket, PeerConnection, PlayerHandle,
    ProtocolOptions, StateStore, TimeSyncOptions, WireDecode, WireEncode, WireError,
};

/// Iterations of the pump loop that comfortably cover a full handshake.
pub const MAX_SYNC_ITERATIONS: usize = 50;

/// Installs a process-wide test logger; repeated calls are no-ops.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct StubInput {
    pub inp: u32,
}

impl WireEncode for StubInput {
    fn encode(&self, w: &mut BufferWriter<'_>) {
        w.put_u32(self.inp);
    }
}

impl WireDecode for StubInput {
    fn decode(r: &mut BufferReader<'_>) -> Result<Self, WireError> {
        Ok(Self { inp: r.get_u32()? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubConfig;

impl Config for StubConfig {
    type Input = StubInput;
    type Address = usize;
}

/// A state store answering every frame with the same checksum.
pub struct FixedStore(pub u32);

impl StateStore for FixedStore {
    fn checksum(&self, _frame: Frame) -> Option<u32> {
        Some(self.0)
    }
}

type Inbox = Arc<Mutex<VecDeque<(usize, Vec<u8>)>>>;

/// An in-memory datagram socket. Delivery is instant and lossless unless
/// `drop_outbound` is set.
pub struct InMemorySocket {
    local: usize,
    inbox: Inbox,
    peers: HashMap<usize, Inbox>,
    pub drop_outbound: bool,
}

impl InMemorySocket {
    /// Creates two sockets wired to each other, with addresses 0 and 1.
    #[must_use]
    pub fn pair() -> (InMemorySocket, InMemorySocket) {
        let inbox_a: Inbox = Arc::default();
        let inbox_b: Inbox = Arc::default();
        let a = InMemorySocket {
            local: 0,
            inbox: Arc::clone(&inbox_a),
            peers: HashMap::from([(1, Arc::clone(&inbox_b))]),
            drop_outbound: false,
        };
        let b = InMemorySocket {
            local: 1,
            inbox: inbox_b,
            peers: HashMap::from([(0, inbox_a)]),
            drop_outbound: false,
        };
        (a, b)
    }
}

impl NonBlockingSocket<usize> for InMemorySocket {
    fn send_to(&mut self, buf: &[u8], addr: &usize) {
        if self.drop_outbound {
            return;
        }
        if let Some(peer) = self.peers.get(addr) {
            peer.lock().push_back((self.local, buf.to_vec()));
        }
    }

    fn receive_all(&mut self) -> Vec<(usize, Vec<u8>)> {
        self.inbox.lock().drain(..).collect()
    }
}

/// Options with a fixed seed and instant handshake retries, suitable for
/// deterministic in-process tests.
#[must_use]
pub fn test_options(seed: u64) -> ProtocolOptions {
    ProtocolOptions {
        rng_seed: Some(seed),
        sync_first_retry_interval: web_time::Duration::ZERO,
        sync_retry_interval: web_time::Duration::ZERO,
        ..ProtocolOptions::default()
    }
}

/// Creates a connection to the in-memory peer at `peer_addr`.
#[must_use]
pub fn create_connection(
    peer_addr: usize,
    options: ProtocolOptions,
    store: Box<dyn StateStore>,
) -> PeerConnection<StubConfig> {
    init_tracing();
    PeerConnection::new(
        peer_addr,
        PlayerHandle::new(peer_addr),
        2,
        store,
        options,
        TimeSyncOptions::default(),
    )
}

/// One full host-loop iteration: receive, update, send.
pub fn tick(connection: &mut PeerConnection<StubConfig>, socket: &mut InMemorySocket) {
    for (_, packet) in socket.receive_all() {
        connection.handle_message(&packet);
    }
    connection.update();
    connection.send_all_messages(socket);
}

/// Pumps both connections until both report running, panicking if the
/// handshake never completes.
pub fn synchronize_pair(
    a: &mut PeerConnection<StubConfig>,
    socket_a: &mut InMemorySocket,
    b: &mut PeerConnection<StubConfig>,
    socket_b: &mut InMemorySocket,
) {
    a.synchronize();
    b.synchronize();
    for _ in 0..MAX_SYNC_ITERATIONS {
        tick(a, socket_a);
        tick(b, socket_b);
        if a.is_running() && b.is_running() {
            return;
        }
    }
    panic!("connections failed to synchronize");
}
