//! The fixed catalog of protocol messages.
//!
//! Every packet is one [`Message`]: a four-byte header (peer magic number and
//! wrapping sequence counter) followed by a one-byte type tag and the
//! type-specific body. The schema is closed; there is no version negotiation
//! and an unknown tag is a decode error.

use crate::wire::{BufferReader, BufferWriter, WireDecode, WireEncode, WireError};
use crate::Frame;

/// Connection status for one player, as last reported by the remote peer.
///
/// These ride along inside every [`Input`] message so both sides converge on
/// who has dropped out of the session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PeerStatus {
    /// Whether this player has disconnected.
    pub disconnected: bool,
    /// The last frame received from this player.
    pub last_frame: Frame,
}

impl Default for PeerStatus {
    fn default() -> Self {
        Self {
            disconnected: false,
            last_frame: Frame::NULL,
        }
    }
}

impl WireEncode for PeerStatus {
    fn encode(&self, w: &mut BufferWriter<'_>) {
        w.put_bool(self.disconnected);
        w.put_frame(self.last_frame);
    }
}

impl WireDecode for PeerStatus {
    fn decode(r: &mut BufferReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            disconnected: r.get_bool()?,
            last_frame: r.get_frame()?,
        })
    }
}

/// First half of a handshake round-trip.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct SyncRequest {
    /// Nonce the peer must echo back.
    pub random_request: u32,
}

/// Second half of a handshake round-trip.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct SyncReply {
    /// The nonce from the matching [`SyncRequest`].
    pub random_reply: u32,
}

/// A window of consecutive input frames plus session bookkeeping.
///
/// `bytes` holds `num_inputs` serialized input payloads back to back,
/// starting at `start_frame`; the payload layout is the host's
/// `Config::Input` wire format and opaque at this level.
#[derive(Clone, PartialEq, Eq)]
pub struct Input {
    /// The sender's view of every player's status.
    pub peer_connect_status: Vec<PeerStatus>,
    /// The sender is leaving the session for good.
    pub disconnect_requested: bool,
    /// Frame of the first input in `bytes`.
    pub start_frame: Frame,
    /// Newest remote frame the sender has accepted.
    pub ack_frame: Frame,
    /// How many serialized inputs `bytes` holds.
    pub num_inputs: u32,
    /// The serialized input payloads, back to back.
    pub bytes: Vec<u8>,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            peer_connect_status: Vec::new(),
            disconnect_requested: false,
            start_frame: Frame::NULL,
            ack_frame: Frame::NULL,
            num_inputs: 0,
            bytes: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure so new fields cannot be forgotten here.
        let Self {
            peer_connect_status,
            disconnect_requested,
            start_frame,
            ack_frame,
            num_inputs,
            bytes,
        } = self;

        f.debug_struct("Input")
            .field("peer_connect_status", peer_connect_status)
            .field("disconnect_requested", disconnect_requested)
            .field("start_frame", start_frame)
            .field("ack_frame", ack_frame)
            .field("num_inputs", num_inputs)
            .field("bytes", &BytesDebug(bytes))
            .finish()
    }
}

struct BytesDebug<'a>(&'a [u8]);

impl std::fmt::Debug for BytesDebug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("0x")?;
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl WireEncode for Input {
    fn encode(&self, w: &mut BufferWriter<'_>) {
        w.put_list(&self.peer_connect_status);
        w.put_bool(self.disconnect_requested);
        w.put_frame(self.start_frame);
        w.put_frame(self.ack_frame);
        w.put_u32(self.num_inputs);
        w.put_byte_block(&self.bytes);
    }
}

impl WireDecode for Input {
    fn decode(r: &mut BufferReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            peer_connect_status: r.get_list()?,
            disconnect_requested: r.get_bool()?,
            start_frame: r.get_frame()?,
            ack_frame: r.get_frame()?,
            num_inputs: r.get_u32()?,
            bytes: r.get_byte_block()?,
        })
    }
}

/// Standalone acknowledgement, sent when there is no input to piggyback on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InputAck {
    /// Newest remote frame the sender has accepted.
    pub ack_frame: Frame,
}

impl Default for InputAck {
    fn default() -> Self {
        Self {
            ack_frame: Frame::NULL,
        }
    }
}

/// Periodic connection-quality probe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct QualityReport {
    /// The sender's current local frame advantage.
    pub frame_advantage: i32,
    /// Sender timestamp in milliseconds, echoed back in [`QualityReply`] to
    /// measure the round trip.
    pub ping: u64,
}

/// Echo of a [`QualityReport`] timestamp.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct QualityReply {
    /// The `ping` timestamp from the report being answered.
    pub pong: u64,
}

/// Challenge half of the desync probe: carries only the frame number; the
/// peer looks up its own checksum for that frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConsistencyCheckRequest {
    /// The frame whose checksum is being requested.
    pub frame: Frame,
}

impl Default for ConsistencyCheckRequest {
    fn default() -> Self {
        Self { frame: Frame::NULL }
    }
}

/// Response half of the desync probe.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConsistencyCheckReply {
    /// The frame both checksums describe.
    pub frame: Frame,
    /// The replying peer's checksum for `frame`; 0 when it had none.
    pub checksum: u32,
}

impl Default for ConsistencyCheckReply {
    fn default() -> Self {
        Self {
            frame: Frame::NULL,
            checksum: 0,
        }
    }
}

/// Header prepended to every message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct MessageHeader {
    /// Random identity of the sending endpoint, fixed for the lifetime of
    /// the connection. Packets from unknown senders are filtered on this.
    pub magic: u16,
    /// Wrapping per-sender packet counter, used for replay/corruption
    /// filtering.
    pub sequence: u16,
}

impl WireEncode for MessageHeader {
    fn encode(&self, w: &mut BufferWriter<'_>) {
        w.put_u16(self.magic);
        w.put_u16(self.sequence);
    }
}

impl WireDecode for MessageHeader {
    fn decode(r: &mut BufferReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            magic: r.get_u16()?,
            sequence: r.get_u16()?,
        })
    }
}

/// One-byte tags identifying each message body on the wire.
mod tag {
    pub const SYNC_REQUEST: u8 = 1;
    pub const SYNC_REPLY: u8 = 2;
    pub const INPUT: u8 = 3;
    pub const INPUT_ACK: u8 = 4;
    pub const QUALITY_REPORT: u8 = 5;
    pub const QUALITY_REPLY: u8 = 6;
    pub const KEEP_ALIVE: u8 = 7;
    pub const CONSISTENCY_REQUEST: u8 = 8;
    pub const CONSISTENCY_REPLY: u8 = 9;
}

/// The body of one protocol packet.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MessageBody {
    SyncRequest(SyncRequest),
    SyncReply(SyncReply),
    Input(Input),
    InputAck(InputAck),
    QualityReport(QualityReport),
    QualityReply(QualityReply),
    /// Empty liveness signal, sent when nothing else has gone out recently.
    KeepAlive,
    ConsistencyCheckRequest(ConsistencyCheckRequest),
    ConsistencyCheckReply(ConsistencyCheckReply),
}

impl MessageBody {
    const fn tag(&self) -> u8 {
        match self {
            MessageBody::SyncRequest(_) => tag::SYNC_REQUEST,
            MessageBody::SyncReply(_) => tag::SYNC_REPLY,
            MessageBody::Input(_) => tag::INPUT,
            MessageBody::InputAck(_) => tag::INPUT_ACK,
            MessageBody::QualityReport(_) => tag::QUALITY_REPORT,
            MessageBody::QualityReply(_) => tag::QUALITY_REPLY,
            MessageBody::KeepAlive => tag::KEEP_ALIVE,
            MessageBody::ConsistencyCheckRequest(_) => tag::CONSISTENCY_REQUEST,
            MessageBody::ConsistencyCheckReply(_) => tag::CONSISTENCY_REPLY,
        }
    }
}

/// A complete protocol packet: header, type tag, body.
///
/// Messages are immutable value objects constructed for a single send and
/// discarded after encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Sender identity and sequencing.
    pub header: MessageHeader,
    /// The payload.
    pub body: MessageBody,
}

impl WireEncode for Message {
    fn encode(&self, w: &mut BufferWriter<'_>) {
        self.header.encode(w);
        w.put_u8(self.body.tag());
        match &self.body {
            MessageBody::SyncRequest(body) => {
                w.put_u32(body.random_request);
            }
            MessageBody::SyncReply(body) => {
                w.put_u32(body.random_reply);
            }
            MessageBody::Input(body) => body.encode(w),
            MessageBody::InputAck(body) => {
                w.put_frame(body.ack_frame);
            }
            MessageBody::QualityReport(body) => {
                w.put_i32(body.frame_advantage);
                w.put_u64(body.ping);
            }
            MessageBody::QualityReply(body) => {
                w.put_u64(body.pong);
            }
            MessageBody::KeepAlive => {}
            MessageBody::ConsistencyCheckRequest(body) => {
                w.put_frame(body.frame);
            }
            MessageBody::ConsistencyCheckReply(body) => {
                w.put_frame(body.frame);
                w.put_u32(body.checksum);
            }
        }
    }
}

impl WireDecode for Message {
    fn decode(r: &mut BufferReader<'_>) -> Result<Self, WireError> {
        let header = MessageHeader::decode(r)?;
        let tag = r.get_u8()?;
        let body = match tag {
            tag::SYNC_REQUEST => MessageBody::SyncRequest(SyncRequest {
                random_request: r.get_u32()?,
            }),
            tag::SYNC_REPLY => MessageBody::SyncReply(SyncReply {
                random_reply: r.get_u32()?,
            }),
            tag::INPUT => MessageBody::Input(Input::decode(r)?),
            tag::INPUT_ACK => MessageBody::InputAck(InputAck {
                ack_frame: r.get_frame()?,
            }),
            tag::QUALITY_REPORT => MessageBody::QualityReport(QualityReport {
                frame_advantage: r.get_i32()?,
                ping: r.get_u64()?,
            }),
            tag::QUALITY_REPLY => MessageBody::QualityReply(QualityReply { pong: r.get_u64()? }),
            tag::KEEP_ALIVE => MessageBody::KeepAlive,
            tag::CONSISTENCY_REQUEST => {
                MessageBody::ConsistencyCheckRequest(ConsistencyCheckRequest {
                    frame: r.get_frame()?,
                })
            }
            tag::CONSISTENCY_REPLY => MessageBody::ConsistencyCheckReply(ConsistencyCheckReply {
                frame: r.get_frame()?,
                checksum: r.get_u32()?,
            }),
            unknown => return Err(WireError::InvalidMessageType(unknown)),
        };
        Ok(Self { header, body })
    }
}

// #########
// # TESTS #
// #########
