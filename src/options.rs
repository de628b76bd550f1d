//! Configuration for peer connections.
//!
//! All knobs are plain data with sensible production defaults; construct with
//! struct-update syntax:
//!
//! ```
//! use rampart_netplay::ProtocolOptions;
//! use web_time::Duration;
//!
//! let options = ProtocolOptions {
//!     disconnect_timeout: Duration::from_millis(3000),
//!     ..ProtocolOptions::default()
//! };
//! ```

use web_time::Duration;

use crate::wire::Endianness;

/// Distribution used to draw the artificial send delay when
/// [`ProtocolOptions::network_latency`] is non-zero.
///
/// This is a fault-injection affordance for testing under simulated network
/// conditions, not a reliability mechanism.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DelayStrategy {
    /// Every message is delayed by exactly `network_latency`.
    Fixed,
    /// Delays are drawn from a normal distribution centered on
    /// `network_latency`, clamped to be non-negative.
    #[default]
    Gaussian,
}

/// Tuning knobs for one peer connection.
///
/// The defaults are production values for a 60 Hz game on the open internet;
/// they only need touching for unusual transports or for tests that want
/// deterministic, fast-firing timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolOptions {
    /// Byte order for every multi-byte value on the wire. Both peers must
    /// agree; there is no negotiation.
    pub serialization_endianness: Endianness,

    /// Maximum number of local inputs awaiting acknowledgement. Offering
    /// input beyond this bound returns
    /// [`SendInputResult::InputDropped`](crate::SendInputResult).
    pub max_pending_inputs: usize,

    /// Maximum number of encoded messages awaiting dispatch. When full, the
    /// oldest pending message is dropped.
    pub max_package_queue: usize,

    /// Number of successful sync round-trips required before the connection
    /// is considered running.
    pub number_of_sync_roundtrips: u32,

    /// Total sync request attempts before the handshake is abandoned with a
    /// synchronization-failure event.
    pub max_sync_retries: u32,

    /// Delay before the first sync request retry.
    pub sync_first_retry_interval: Duration,

    /// Delay between subsequent sync request retries.
    pub sync_retry_interval: Duration,

    /// Maximum distance between the header sequence number of an inbound
    /// packet and the expected one; packets outside the window are dropped
    /// as corrupt or replayed.
    pub max_sequence_distance: u16,

    /// Artificial latency added to every outbound message. Zero disables the
    /// fault injection entirely.
    pub network_latency: Duration,

    /// Distribution for the artificial latency.
    pub delay_strategy: DelayStrategy,

    /// If no packet has been sent for this long, a keep-alive is emitted.
    pub keep_alive_interval: Duration,

    /// If no input has been received for this long, the full pending input
    /// window is re-sent.
    pub resend_input_interval: Duration,

    /// Interval between quality reports (timestamp + local frame advantage).
    pub quality_report_interval: Duration,

    /// Interval between network statistics refreshes.
    pub network_stats_interval: Duration,

    /// Whether periodic network statistics refreshes run at all.
    pub network_stats_enabled: bool,

    /// Silence beyond this duration raises a network-interrupted event.
    /// Ignored unless [`disconnect_timeout_enabled`](Self::disconnect_timeout_enabled) is set.
    pub disconnect_notify_start: Duration,

    /// Silence beyond this duration disconnects the peer for good.
    pub disconnect_timeout: Duration,

    /// Whether passive disconnect detection runs at all.
    pub disconnect_timeout_enabled: bool,

    /// Grace period between a disconnect request and the hard cutover to the
    /// terminal state.
    pub shutdown_time: Duration,

    /// How many frames behind the newest received frame the consistency
    /// checker probes. Checks are skipped while the session is younger than
    /// this distance.
    pub consistency_check_distance: i32,

    /// Interval between consistency checksum probes.
    pub consistency_check_interval: Duration,

    /// Whether the consistency checker runs at all.
    pub consistency_check_enabled: bool,

    /// An outstanding consistency probe older than this forces a disconnect;
    /// zero disables the timeout.
    pub consistency_check_timeout: Duration,

    /// Optional fixed seed for the connection's internal RNG (handshake
    /// nonces, delay jitter). `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        Self {
            serialization_endianness: Endianness::Big,
            max_pending_inputs: 64,
            max_package_queue: 64,
            number_of_sync_roundtrips: 10,
            max_sync_retries: 64,
            sync_first_retry_interval: Duration::from_millis(500),
            sync_retry_interval: Duration::from_millis(1000),
            max_sequence_distance: 1 << 15,
            network_latency: Duration::ZERO,
            delay_strategy: DelayStrategy::Gaussian,
            keep_alive_interval: Duration::from_millis(200),
            resend_input_interval: Duration::from_millis(200),
            quality_report_interval: Duration::from_millis(1000),
            network_stats_interval: Duration::from_millis(1000),
            network_stats_enabled: false,
            disconnect_notify_start: Duration::from_millis(750),
            disconnect_timeout: Duration::from_millis(5000),
            disconnect_timeout_enabled: true,
            shutdown_time: Duration::from_millis(100),
            consistency_check_distance: 8,
            consistency_check_interval: Duration::from_millis(3000),
            consistency_check_enabled: true,
            consistency_check_timeout: Duration::from_millis(10_000),
            rng_seed: None,
        }
    }
}

impl ProtocolOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for LAN play: tighter timeouts, faster handshake retries.
    #[must_use]
    pub fn lan() -> Self {
        Self {
            sync_first_retry_interval: Duration::from_millis(100),
            sync_retry_interval: Duration::from_millis(200),
            disconnect_notify_start: Duration::from_millis(300),
            disconnect_timeout: Duration::from_millis(2000),
            ..Self::default()
        }
    }

    /// Preset for lossy connections: more patient handshake and disconnect
    /// windows, more aggressive input resends.
    #[must_use]
    pub fn lossy() -> Self {
        Self {
            max_sync_retries: 128,
            resend_input_interval: Duration::from_millis(100),
            disconnect_notify_start: Duration::from_millis(1500),
            disconnect_timeout: Duration::from_millis(8000),
            ..Self::default()
        }
    }

    /// Whether the consistency checker should run, honoring both the flag
    /// and a zero interval.
    #[must_use]
    pub fn consistency_check_active(&self) -> bool {
        self.consistency_check_enabled && !self.consistency_check_interval.is_zero()
    }
}

/// Tuning knobs for the time-sync fairness controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSyncOptions {
    /// Number of frame-advantage samples averaged per side. A larger window
    /// is smoother but slower to react to network changes.
    pub frame_window_size: usize,

    /// Number of recent local inputs inspected by the idle-input check.
    pub min_unique_frames: usize,

    /// Recommendations below this many frames are not worth interrupting the
    /// game for and are reported as zero.
    pub min_frame_advantage: i32,

    /// Upper clamp on the recommended wait.
    pub max_frame_advantage: i32,

    /// When set, a recommendation is withheld while the most recent local
    /// inputs are still changing, so an active input gesture is never
    /// interrupted.
    pub require_idle_input: bool,
}

impl Default for TimeSyncOptions {
    fn default() -> Self {
        Self {
            frame_window_size: 40,
            min_unique_frames: 10,
            min_frame_advantage: 3,
            max_frame_advantage: 9,
            require_idle_input: false,
        }
    }
}

impl TimeSyncOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// #########
// # TESTS #
// #########
