//! Endianness-aware binary codec for protocol messages.
//!
//! Both peers must produce bit-identical bytes for the same message, so this
//! module never relies on the host's native byte order: every multi-byte
//! value is written and read with an explicitly configured [`Endianness`]
//! (big-endian is the network default). Byte-sized values and booleans need
//! no order handling.
//!
//! Aggregates are serialized field by field through the same primitive
//! operations, which keeps the layout length- and order-stable across
//! platforms. Strings are length-prefixed (UTF-8 bytes or UTF-16 code
//! units); lists are a 4-byte element count followed by each element.
//!
//! The reader is the exact inverse of the writer: a buffer produced by
//! [`BufferWriter`] and consumed by [`BufferReader`] at the same endianness
//! reproduces the original values and byte length. Truncated or malformed
//! buffers surface as [`WireError`]s, never as panics.

pub mod reader;
pub mod writer;

pub use reader::BufferReader;
pub use writer::BufferWriter;

use bytes::BytesMut;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Byte order used for all multi-byte values on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Network byte order; the default.
    #[default]
    Big,
    /// Little-endian byte order.
    Little,
}

impl Endianness {
    /// The byte order of the host platform.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// Errors produced while encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ended before a fixed-size value could be read.
    UnexpectedEof {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },
    /// A fixed-size destination buffer cannot hold the encoded message.
    BufferTooSmall {
        /// Bytes the encoded message occupies.
        needed: usize,
        /// Capacity of the destination.
        capacity: usize,
    },
    /// The one-byte message tag did not name a known message type.
    InvalidMessageType(u8),
    /// A length prefix exceeded what the remaining buffer could possibly
    /// hold.
    LengthOutOfRange {
        /// The declared length.
        len: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },
    /// A length-prefixed string was not valid UTF-8.
    InvalidUtf8,
    /// A length-prefixed string was not valid UTF-16.
    InvalidUtf16,
}

impl Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::UnexpectedEof { needed, remaining } => {
                write!(
                    f,
                    "unexpected end of buffer: needed {} bytes, {} remaining",
                    needed, remaining
                )
            }
            WireError::BufferTooSmall { needed, capacity } => {
                write!(
                    f,
                    "destination buffer too small: message is {} bytes, capacity is {}",
                    needed, capacity
                )
            }
            WireError::InvalidMessageType(tag) => {
                write!(f, "unknown message type tag {:#04x}", tag)
            }
            WireError::LengthOutOfRange { len, remaining } => {
                write!(
                    f,
                    "length prefix {} exceeds remaining buffer of {} bytes",
                    len, remaining
                )
            }
            WireError::InvalidUtf8 => write!(f, "string data is not valid UTF-8"),
            WireError::InvalidUtf16 => write!(f, "string data is not valid UTF-16"),
        }
    }
}

impl Error for WireError {}

/// Types with a stable, field-by-field wire layout.
pub trait WireEncode {
    /// Appends this value to the writer.
    fn encode(&self, w: &mut BufferWriter<'_>);
}

/// The inverse of [`WireEncode`].
pub trait WireDecode: Sized {
    /// Reads one value from the reader.
    fn decode(r: &mut BufferReader<'_>) -> Result<Self, WireError>;
}

/// Encodes `value` into a freshly allocated buffer.
#[must_use]
pub fn encode<T: WireEncode>(value: &T, endianness: Endianness) -> BytesMut {
    let mut buf = BytesMut::new();
    let mut writer = BufferWriter::new(&mut buf, endianness);
    value.encode(&mut writer);
    buf
}

/// Encodes `value` into a fixed destination slice, returning the number of
/// bytes written.
///
/// A destination too small for the message is a hard error; the message is
/// never silently truncated.
pub fn encode_into<T: WireEncode>(
    value: &T,
    endianness: Endianness,
    out: &mut [u8],
) -> Result<usize, WireError> {
    let encoded = encode(value, endianness);
    if encoded.len() > out.len() {
        return Err(WireError::BufferTooSmall {
            needed: encoded.len(),
            capacity: out.len(),
        });
    }
    out[..encoded.len()].copy_from_slice(&encoded);
    Ok(encoded.len())
}

/// Decodes one `T` from the front of the buffer. Trailing bytes are
/// tolerated; datagram padding is not an error.
pub fn decode<T: WireDecode>(buf: &[u8], endianness: Endianness) -> Result<T, WireError> {
    let mut reader = BufferReader::new(buf, endianness);
    let value = T::decode(&mut reader)?;
    Ok(value)
}

// #########
// # TESTS #
// #########
