use web_time::Duration;

use crate::Frame;

/// Cumulative packet/byte counters for one traffic direction, with values
/// derived on each network-stats tick.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct DirectionStats {
    /// Total packets moved in this direction since the connection started.
    pub total_packets: usize,
    /// Total payload bytes moved in this direction.
    pub total_bytes: usize,
    /// Payload bytes plus the estimated UDP/IP header overhead per packet.
    pub total_bytes_with_headers: usize,
    /// Packets per second, averaged since the connection started.
    pub packets_per_second: f32,
    /// Estimated bandwidth in kilobits per second.
    pub bandwidth_kbps: f32,
    /// Share of the traffic spent on UDP/IP headers, in percent.
    pub udp_overhead_percent: f32,
}

/// A snapshot of connection statistics, queried via
/// [`PeerConnection::network_stats`](crate::PeerConnection::network_stats).
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[must_use = "NetworkStats should be inspected or used after being queried"]
pub struct NetworkStats {
    /// The round-trip packet transmission time, measured from quality-report
    /// echoes.
    pub ping: Duration,
    /// Number of local inputs awaiting acknowledgement. A growing count is a
    /// rough indication of connection quality.
    pub pending_input_count: usize,
    /// The newest local input frame the remote peer has acknowledged.
    pub last_acked_frame: Frame,
    /// How many frames this client is behind the remote client at this
    /// instant. If we run frame 1002 while the remote runs 1009, this is
    /// roughly 7.
    pub local_frames_behind: i32,
    /// The same, calculated from the perspective of the remote player.
    pub remote_frames_behind: i32,
    /// Counters for outbound traffic.
    pub send: DirectionStats,
    /// Counters for inbound traffic.
    pub recv: DirectionStats,
}

impl NetworkStats {
    /// Creates a new `NetworkStats` instance with default values.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            ping,
            pending_input_count,
            last_acked_frame,
            local_frames_behind,
            remote_frames_behind,
            send,
            recv,
        } = self;

        write!(
            f,
            "NetworkStats {{ ping: {}ms, pending: {}, last_acked: {}, local_behind: {}, remote_behind: {}, sent: {} pkts / {:.1} kbps, received: {} pkts / {:.1} kbps }}",
            ping.as_millis(),
            pending_input_count,
            last_acked_frame,
            local_frames_behind,
            remote_frames_behind,
            send.total_packets,
            send.bandwidth_kbps,
            recv.total_packets,
            recv.bandwidth_kbps,
        )
    }
}

// #########
// # TESTS #
// #########
