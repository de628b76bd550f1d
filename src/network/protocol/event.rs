//! Host-facing notifications raised by a peer connection.

use web_time::Duration;

use crate::frame_info::GameInput;
use crate::{Config, Frame};

/// Notifications a [`PeerConnection`](super::PeerConnection) queues for the
/// host. Drain them every tick via
/// [`poll_events`](super::PeerConnection::poll_events); handling them is up
/// to the host.
///
/// All failures of a connection are reported this way — never through a
/// blocked or suspended call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event<T>
where
    T: Config,
{
    /// The handshake made progress. After `total` round-trips the connection
    /// is synchronized.
    Synchronizing {
        /// Total number of required round-trips.
        total: u32,
        /// Round-trips completed so far.
        count: u32,
    },
    /// The handshake completed; the connection is now running.
    Connected,
    /// The handshake was abandoned after exhausting its retries. The
    /// connection never reaches the running state.
    SynchronizationFailure,
    /// An input arrived from the remote peer.
    Input(GameInput<T::Input>),
    /// No packets have arrived for a while; the peer will be disconnected in
    /// `disconnect_timeout` unless traffic resumes. Raised at most once.
    NetworkInterrupted {
        /// Time remaining until the disconnect, measured from the moment
        /// this event fired.
        disconnect_timeout: Duration,
    },
    /// The peer is gone. Terminal; raised at most once.
    Disconnected,
    /// A consistency probe came back with a different checksum: the two
    /// simulations have diverged. Whether this is fatal is the host's call.
    DesyncDetected {
        /// The frame both checksums describe.
        frame: Frame,
        /// Checksum this side recorded.
        local_checksum: u32,
        /// Checksum the peer reported.
        remote_checksum: u32,
    },
}
