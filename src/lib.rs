#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Rampart Netplay is the peer-to-peer protocol engine of a rollback netcode
//! stack: it establishes a synchronized session between two game peers over an
//! unreliable datagram transport, reliably exchanges per-frame input, measures
//! and corrects simulation fairness between the peers, and detects both
//! network disconnection and game-state divergence (desync).
//!
//! The crate deliberately does **not** contain the rollback engine itself.
//! Saving, loading and re-simulating game state is the host's job; this layer
//! only reads a checksum per frame (through [`StateStore`]) and reports what
//! it observes through [`Event`]s.
//!
//! # Architecture
//!
//! One [`PeerConnection`] instance runs per remote peer. It is driven by the
//! host's main loop:
//!
//! 1. deliver inbound datagrams via [`PeerConnection::handle_message`],
//! 2. call [`PeerConnection::update`] once per tick (periodic work is
//!    deadline-polled, there are no timer threads),
//! 3. flush outbound packets with [`PeerConnection::send_all_messages`],
//! 4. drain [`PeerConnection::poll_events`].
//!
//! All packets are encoded with the endianness-configurable codec in [`wire`];
//! both peers must agree on byte order and message layout — the schema is
//! closed and carries no version negotiation.

pub mod error;
#[doc(hidden)]
pub mod frame_info;
pub mod options;
#[doc(hidden)]
pub mod rng;
#[doc(hidden)]
pub mod time_sync;
pub mod wire;

#[doc(hidden)]
pub mod network {
    #[doc(hidden)]
    pub mod messages;
    #[doc(hidden)]
    pub mod network_stats;
    #[doc(hidden)]
    pub mod protocol;
    #[doc(hidden)]
    pub mod udp_socket;
}

pub use error::NetplayError;
pub use frame_info::GameInput;
pub use network::messages::{Message, PeerStatus};
pub use network::network_stats::{DirectionStats, NetworkStats};
pub use network::protocol::event::Event;
pub use network::protocol::state::ProtocolStatus;
pub use network::protocol::PeerConnection;
pub use network::udp_socket::UdpNonBlockingSocket;
pub use options::{DelayStrategy, ProtocolOptions, TimeSyncOptions};
pub use wire::{BufferReader, BufferWriter, Endianness, WireDecode, WireEncode, WireError};

use std::fmt::Debug;
use std::hash::Hash;

// #############
// # CONSTANTS #
// #############

/// Internally, -1 represents no frame / invalid frame.
pub const NULL_FRAME: i32 = -1;

/// A frame is a single step of game execution.
///
/// Frames are the fundamental unit of time in rollback networking. Frame
/// numbers start at 0 and increment sequentially; the special value
/// [`NULL_FRAME`] (-1) represents "no frame". On the wire a frame travels as
/// a signed 32-bit integer, so the sentinel survives encoding unchanged.
///
/// # Examples
///
/// ```
/// use rampart_netplay::Frame;
///
/// let frame = Frame::new(0);
/// assert!(frame.is_valid());
/// assert!(Frame::NULL.is_null());
///
/// let next = frame + 1;
/// assert_eq!(next.as_i32(), 1);
/// assert!(next > frame);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Frame(i32);

impl Frame {
    /// The null frame constant, representing "no frame" or "uninitialized".
    pub const NULL: Frame = Frame(NULL_FRAME);

    /// Creates a new `Frame` from an `i32` value.
    ///
    /// Note: this does not validate the frame number. Use
    /// [`Frame::is_valid()`] to check for a valid (non-negative) frame.
    #[inline]
    #[must_use]
    pub const fn new(frame: i32) -> Self {
        Frame(frame)
    }

    /// Returns the underlying `i32` value.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Returns `true` if this frame is the null frame.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == NULL_FRAME
    }

    /// Returns `true` if this frame is valid (non-negative).
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Returns `Some(self)` if the frame is valid, or `None` otherwise.
    #[inline]
    #[must_use]
    pub const fn to_option(self) -> Option<Frame> {
        if self.is_valid() {
            Some(self)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "NULL_FRAME")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl std::ops::Add<i32> for Frame {
    type Output = Frame;

    #[inline]
    fn add(self, rhs: i32) -> Self::Output {
        Frame(self.0 + rhs)
    }
}

impl std::ops::AddAssign<i32> for Frame {
    #[inline]
    fn add_assign(&mut self, rhs: i32) {
        self.0 += rhs;
    }
}

impl std::ops::Sub<i32> for Frame {
    type Output = Frame;

    #[inline]
    fn sub(self, rhs: i32) -> Self::Output {
        Frame(self.0 - rhs)
    }
}

impl std::ops::Sub<Frame> for Frame {
    type Output = i32;

    #[inline]
    fn sub(self, rhs: Frame) -> Self::Output {
        self.0 - rhs.0
    }
}

impl std::ops::Rem<i32> for Frame {
    type Output = i32;

    #[inline]
    fn rem(self, rhs: i32) -> Self::Output {
        self.0 % rhs
    }
}

impl From<i32> for Frame {
    #[inline]
    fn from(value: i32) -> Self {
        Frame(value)
    }
}

impl From<Frame> for i32 {
    #[inline]
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

impl PartialEq<i32> for Frame {
    #[inline]
    fn eq(&self, other: &i32) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<i32> for Frame {
    #[inline]
    fn partial_cmp(&self, other: &i32) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

/// A unique identifier for a participant in a session.
///
/// `PlayerHandle` is a newtype wrapper around `usize` that keeps player
/// identifiers from being confused with arbitrary indices.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PlayerHandle(usize);

impl PlayerHandle {
    /// Creates a new `PlayerHandle` from a `usize` value.
    #[inline]
    #[must_use]
    pub const fn new(handle: usize) -> Self {
        PlayerHandle(handle)
    }

    /// Returns the underlying `usize` value.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for PlayerHandle {
    #[inline]
    fn from(value: usize) -> Self {
        PlayerHandle(value)
    }
}

// #############
// #   ENUMS   #
// #############

/// Outcome of offering a local input to a connection.
///
/// Sending input is lossy and non-blocking: when the unacknowledged window is
/// full the new input is rejected rather than overwriting pending data. Retry
/// policy, if any, belongs to the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub enum SendInputResult {
    /// The input was queued for transmission.
    Ok,
    /// The pending window is full; the input was dropped.
    InputDropped,
}

// #############
// #  TRAITS   #
// #############

/// Compile time parameterization for peer connections.
///
/// This trait bundles the generic types needed for a connection. Implement it
/// on a marker struct to configure your types.
///
/// # Example
///
/// ```
/// use rampart_netplay::{Config, BufferReader, BufferWriter, WireDecode, WireEncode, WireError};
/// use std::net::SocketAddr;
///
/// #[derive(Copy, Clone, PartialEq, Default)]
/// struct PadInput {
///     buttons: u16,
/// }
///
/// impl WireEncode for PadInput {
///     fn encode(&self, w: &mut BufferWriter<'_>) {
///         w.put_u16(self.buttons);
///     }
/// }
///
/// impl WireDecode for PadInput {
///     fn decode(r: &mut BufferReader<'_>) -> Result<Self, WireError> {
///         Ok(Self { buttons: r.get_u16()? })
///     }
/// }
///
/// struct GameConfig;
///
/// impl Config for GameConfig {
///     type Input = PadInput;
///     type Address = SocketAddr;
/// }
/// ```
pub trait Config: 'static + Send {
    /// The input type for a session. This is the only game-related data
    /// transmitted over the network; it must have a stable wire layout.
    ///
    /// The [`Default`] implementation represents "no input" for a player.
    type Input: Copy + Clone + PartialEq + Default + WireEncode + WireDecode + Send;

    /// The address type which identifies remote clients.
    type Address: Clone + PartialEq + Eq + PartialOrd + Ord + Hash + Send + Debug;
}

/// Byte-level datagram transport used by a [`PeerConnection`].
///
/// Messages should be sent in a UDP-like fashion, unordered and unreliable;
/// the protocol layered on top tolerates loss, duplication and reordering.
/// Neither method may block.
pub trait NonBlockingSocket<A>: Send
where
    A: Clone + PartialEq + Eq + Hash + Send,
{
    /// Sends one encoded packet to the given address.
    fn send_to(&mut self, buf: &[u8], addr: &A);

    /// Returns all packets received since the last call, paired with the
    /// address each was received from.
    fn receive_all(&mut self) -> Vec<(A, Vec<u8>)>;
}

/// Read-only view of the host's saved game states, consumed by the
/// consistency checker.
///
/// Checksum production and storage are the rollback engine's concern; this
/// layer only asks "what checksum did you record for frame N", and `None` is
/// a valid answer (the frame may not have been saved yet, or may have been
/// discarded already).
pub trait StateStore: Send {
    /// Returns the checksum recorded for `frame`, if one is available.
    fn checksum(&self, frame: Frame) -> Option<u32>;
}

// ###################
// # UNIT TESTS      #
// ###################
