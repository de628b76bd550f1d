//! Append-only writer half of the wire codec.

use bytes::{BufMut, BytesMut};

use crate::wire::{Endianness, WireEncode};
use crate::Frame;

/// Writes primitives into a growable byte buffer at a configured byte order.
///
/// Multi-byte values dispatch on the configured [`Endianness`]; when it
/// disagrees with the host order the underlying `bytes` primitives perform
/// the reversal. Single-byte values and booleans are order-free.
#[derive(Debug)]
pub struct BufferWriter<'a> {
    buf: &'a mut BytesMut,
    endianness: Endianness,
}

impl<'a> BufferWriter<'a> {
    /// Creates a writer appending to `buf`.
    pub fn new(buf: &'a mut BytesMut, endianness: Endianness) -> Self {
        Self { buf, endianness }
    }

    /// The byte order this writer encodes with.
    #[must_use]
    pub const fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Number of bytes written to the underlying buffer so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a single byte.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Writes a single signed byte.
    pub fn put_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    /// Writes a boolean as one byte (0 or 1).
    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Writes an unsigned 16-bit integer.
    pub fn put_u16(&mut self, value: u16) {
        match self.endianness {
            Endianness::Big => self.buf.put_u16(value),
            Endianness::Little => self.buf.put_u16_le(value),
        }
    }

    /// Writes a signed 16-bit integer.
    pub fn put_i16(&mut self, value: i16) {
        match self.endianness {
            Endianness::Big => self.buf.put_i16(value),
            Endianness::Little => self.buf.put_i16_le(value),
        }
    }

    /// Writes an unsigned 32-bit integer.
    pub fn put_u32(&mut self, value: u32) {
        match self.endianness {
            Endianness::Big => self.buf.put_u32(value),
            Endianness::Little => self.buf.put_u32_le(value),
        }
    }

    /// Writes a signed 32-bit integer.
    pub fn put_i32(&mut self, value: i32) {
        match self.endianness {
            Endianness::Big => self.buf.put_i32(value),
            Endianness::Little => self.buf.put_i32_le(value),
        }
    }

    /// Writes an unsigned 64-bit integer.
    pub fn put_u64(&mut self, value: u64) {
        match self.endianness {
            Endianness::Big => self.buf.put_u64(value),
            Endianness::Little => self.buf.put_u64_le(value),
        }
    }

    /// Writes a signed 64-bit integer.
    pub fn put_i64(&mut self, value: i64) {
        match self.endianness {
            Endianness::Big => self.buf.put_i64(value),
            Endianness::Little => self.buf.put_i64_le(value),
        }
    }

    /// Writes a 32-bit float.
    pub fn put_f32(&mut self, value: f32) {
        match self.endianness {
            Endianness::Big => self.buf.put_f32(value),
            Endianness::Little => self.buf.put_f32_le(value),
        }
    }

    /// Writes a 64-bit float.
    pub fn put_f64(&mut self, value: f64) {
        match self.endianness {
            Endianness::Big => self.buf.put_f64(value),
            Endianness::Little => self.buf.put_f64_le(value),
        }
    }

    /// Writes a frame number as a signed 32-bit integer; the null sentinel
    /// travels unchanged.
    pub fn put_frame(&mut self, frame: Frame) {
        self.put_i32(frame.as_i32());
    }

    /// Writes raw bytes with no length prefix.
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Writes a 4-byte length prefix followed by the raw bytes.
    pub fn put_byte_block(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.put_slice(bytes);
    }

    /// Writes a string as a 4-byte byte count followed by its UTF-8 bytes.
    pub fn put_utf8_string(&mut self, s: &str) {
        self.put_byte_block(s.as_bytes());
    }

    /// Writes a string as a 4-byte code-unit count followed by its UTF-16
    /// code units.
    pub fn put_utf16_string(&mut self, s: &str) {
        let units: Vec<u16> = s.encode_utf16().collect();
        self.put_u32(units.len() as u32);
        for unit in units {
            self.put_u16(unit);
        }
    }

    /// Writes a list as a 4-byte element count followed by each element.
    pub fn put_list<T: WireEncode>(&mut self, items: &[T]) {
        self.put_u32(items.len() as u32);
        for item in items {
            item.encode(self);
        }
    }
}

// #########
// # TESTS #
// #########
