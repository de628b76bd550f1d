//! Connection lifecycle and the shared per-peer state record.
//!
//! # State Machine Diagram
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                Peer Connection State Machine                   │
//! │                                                                │
//! │  ┌─────────┐  handshake complete   ┌─────────┐                 │
//! │  │ Syncing │ ─────────────────────►│ Running │                 │
//! │  └─────────┘                       └────┬────┘                 │
//! │                                         │ disconnect(),       │
//! │                                         │ consistency timeout │
//! │                                         ▼                      │
//! │                                 ┌───────────────┐              │
//! │                                 │ Disconnecting │              │
//! │                                 └───────┬───────┘              │
//! │                                         │ shutdown_time        │
//! │                                         ▼                      │
//! │                                 ┌──────────────┐               │
//! │                                 │ Disconnected │  (terminal)   │
//! │                                 └──────────────┘               │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The status only ever moves forward; `Disconnected` is terminal and a
//! connection never re-enters `Syncing`. Silence beyond the disconnect
//! timeout jumps straight from `Running` to `Disconnected`.

use parking_lot::Mutex;
use tracing::warn;
use web_time::{Duration, Instant};

use crate::network::messages::PeerStatus;
use crate::network::network_stats::DirectionStats;
use crate::Frame;

/// Lifecycle stage of one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolStatus {
    /// Exchanging sync request/reply packets to establish the connection.
    Syncing,
    /// Normal operation: exchanging inputs, quality reports and consistency
    /// probes.
    Running,
    /// A disconnect has been requested; waiting out the shutdown grace
    /// period before the hard cutover.
    Disconnecting,
    /// Terminal. All inbound messages are dropped and nothing is sent.
    Disconnected,
}

impl ProtocolStatus {
    /// Whether the connection has reached its terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ProtocolStatus::Disconnected)
    }

    const fn rank(self) -> u8 {
        match self {
            ProtocolStatus::Syncing => 0,
            ProtocolStatus::Running => 1,
            ProtocolStatus::Disconnecting => 2,
            ProtocolStatus::Disconnected => 3,
        }
    }
}

/// Idempotence guards for the two disconnect notifications.
///
/// These are the only fields with two genuine concurrent writers (the host's
/// update tick and a session layer observing the connection from another
/// thread), so they sit behind their own lock.
#[derive(Debug, Default)]
pub struct DisconnectFlags {
    /// The interrupted-connection notification has been dispatched.
    pub notify_sent: bool,
    /// The disconnected notification has been dispatched.
    pub event_sent: bool,
}

/// Bookkeeping for the in-flight consistency probe.
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyState {
    /// Frame of the outstanding probe; `Frame::NULL` while none is in
    /// flight.
    pub asked_frame: Frame,
    /// The local checksum recorded when the probe was sent.
    pub asked_checksum: u32,
    /// When the outstanding probe was sent; cleared once a reply arrives.
    pub last_check: Option<Instant>,
}

impl Default for ConsistencyState {
    fn default() -> Self {
        Self {
            asked_frame: Frame::NULL,
            asked_checksum: 0,
            last_check: None,
        }
    }
}

impl ConsistencyState {
    /// Whether a probe is outstanding.
    #[must_use]
    pub const fn is_outstanding(&self) -> bool {
        self.asked_frame.is_valid()
    }

    /// Clears the outstanding probe.
    pub fn clear(&mut self) {
        self.asked_frame = Frame::NULL;
        self.asked_checksum = 0;
        self.last_check = None;
    }
}

/// Traffic counters and liveness timestamps for one connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionStats {
    /// Outbound counters.
    pub send: DirectionStats,
    /// Inbound counters.
    pub recv: DirectionStats,
    /// Round-trip estimate from quality-report echoes.
    pub round_trip_time: Duration,
    /// When the connection was created; the denominator for bandwidth math.
    pub start_time: Instant,
    /// When the last packet was queued for sending.
    pub last_send_time: Instant,
    /// When the last valid packet arrived.
    pub last_recv_time: Instant,
    /// When the last input message arrived; drives the resend timer.
    pub last_input_recv_time: Instant,
}

impl ConnectionStats {
    fn new(now: Instant) -> Self {
        Self {
            send: DirectionStats::default(),
            recv: DirectionStats::default(),
            round_trip_time: Duration::ZERO,
            start_time: now,
            last_send_time: now,
            last_recv_time: now,
            last_input_recv_time: now,
        }
    }
}

/// The single source of truth for one remote peer.
///
/// Owned exclusively by that peer's `PeerConnection`; the time-sync layer and
/// the consistency checker read it, the orchestrator and inbox write it. The
/// only lock is around the disconnect notification flags.
#[derive(Debug)]
pub struct ConnectionState {
    /// Current lifecycle stage.
    status: ProtocolStatus,
    /// Last-known frame and disconnected flag for every player in the
    /// session, as reported by the remote peer.
    pub peer_status: Vec<PeerStatus>,
    /// Signed frame count: how far ahead this side believes it is.
    pub local_frame_advantage: i32,
    /// The advantage the remote last reported for itself.
    pub remote_frame_advantage: i32,
    /// Newest input frame accepted from the peer. Never regresses.
    pub last_recv_frame: Frame,
    /// Traffic counters and liveness timestamps.
    pub stats: ConnectionStats,
    /// In-flight consistency probe bookkeeping.
    pub consistency: ConsistencyState,
    /// Disconnect notification guards; see [`DisconnectFlags`].
    pub disconnect_flags: Mutex<DisconnectFlags>,
    /// Deadline for the `Disconnecting` to `Disconnected` cutover.
    pub stop_deadline: Option<Instant>,
}

impl ConnectionState {
    /// Creates the state record for a session with `num_players`
    /// participants.
    #[must_use]
    pub fn new(num_players: usize) -> Self {
        let now = Instant::now();
        Self {
            status: ProtocolStatus::Syncing,
            peer_status: vec![PeerStatus::default(); num_players],
            local_frame_advantage: 0,
            remote_frame_advantage: 0,
            last_recv_frame: Frame::NULL,
            stats: ConnectionStats::new(now),
            consistency: ConsistencyState::default(),
            disconnect_flags: Mutex::new(DisconnectFlags::default()),
            stop_deadline: None,
        }
    }

    /// Current lifecycle stage.
    #[must_use]
    pub const fn status(&self) -> ProtocolStatus {
        self.status
    }

    /// Moves the status forward. Backward transitions are a programming
    /// error; they are logged and ignored rather than corrupting the
    /// lifecycle.
    pub fn advance_status(&mut self, next: ProtocolStatus) {
        if next.rank() < self.status.rank() {
            warn!(
                "refusing backward status transition {:?} -> {:?}",
                self.status, next
            );
            return;
        }
        self.status = next;
    }
}

// #########
// # TESTS #
// #########
