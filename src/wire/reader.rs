//! Bounds-checked reader half of the wire codec.

use bytes::Buf;

use crate::wire::{Endianness, WireDecode, WireError};
use crate::Frame;

/// Reads primitives from a byte slice at a configured byte order.
///
/// Every read is bounds-checked: a truncated buffer yields
/// [`WireError::UnexpectedEof`] instead of a panic, which matters because
/// inbound packets come straight off the network.
#[derive(Debug)]
pub struct BufferReader<'a> {
    buf: &'a [u8],
    endianness: Endianness,
}

impl<'a> BufferReader<'a> {
    /// Creates a reader over `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8], endianness: Endianness) -> Self {
        Self { buf, endianness }
    }

    /// The byte order this reader decodes with.
    #[must_use]
    pub const fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        if self.buf.remaining() < needed {
            return Err(WireError::UnexpectedEof {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Reads a single byte.
    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Reads a single signed byte.
    pub fn get_i8(&mut self) -> Result<i8, WireError> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    /// Reads a boolean; any non-zero byte is `true`.
    pub fn get_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.get_u8()? != 0)
    }

    /// Reads an unsigned 16-bit integer.
    pub fn get_u16(&mut self) -> Result<u16, WireError> {
        self.ensure(2)?;
        Ok(match self.endianness {
            Endianness::Big => self.buf.get_u16(),
            Endianness::Little => self.buf.get_u16_le(),
        })
    }

    /// Reads a signed 16-bit integer.
    pub fn get_i16(&mut self) -> Result<i16, WireError> {
        self.ensure(2)?;
        Ok(match self.endianness {
            Endianness::Big => self.buf.get_i16(),
            Endianness::Little => self.buf.get_i16_le(),
        })
    }

    /// Reads an unsigned 32-bit integer.
    pub fn get_u32(&mut self) -> Result<u32, WireError> {
        self.ensure(4)?;
        Ok(match self.endianness {
            Endianness::Big => self.buf.get_u32(),
            Endianness::Little => self.buf.get_u32_le(),
        })
    }

    /// Reads a signed 32-bit integer.
    pub fn get_i32(&mut self) -> Result<i32, WireError> {
        self.ensure(4)?;
        Ok(match self.endianness {
            Endianness::Big => self.buf.get_i32(),
            Endianness::Little => self.buf.get_i32_le(),
        })
    }

    /// Reads an unsigned 64-bit integer.
    pub fn get_u64(&mut self) -> Result<u64, WireError> {
        self.ensure(8)?;
        Ok(match self.endianness {
            Endianness::Big => self.buf.get_u64(),
            Endianness::Little => self.buf.get_u64_le(),
        })
    }

    /// Reads a signed 64-bit integer.
    pub fn get_i64(&mut self) -> Result<i64, WireError> {
        self.ensure(8)?;
        Ok(match self.endianness {
            Endianness::Big => self.buf.get_i64(),
            Endianness::Little => self.buf.get_i64_le(),
        })
    }

    /// Reads a 32-bit float.
    pub fn get_f32(&mut self) -> Result<f32, WireError> {
        self.ensure(4)?;
        Ok(match self.endianness {
            Endianness::Big => self.buf.get_f32(),
            Endianness::Little => self.buf.get_f32_le(),
        })
    }

    /// Reads a 64-bit float.
    pub fn get_f64(&mut self) -> Result<f64, WireError> {
        self.ensure(8)?;
        Ok(match self.endianness {
            Endianness::Big => self.buf.get_f64(),
            Endianness::Little => self.buf.get_f64_le(),
        })
    }

    /// Reads a frame number from its signed 32-bit representation.
    pub fn get_frame(&mut self) -> Result<Frame, WireError> {
        Ok(Frame::new(self.get_i32()?))
    }

    /// Reads exactly `len` raw bytes.
    pub fn get_raw(&mut self, len: usize) -> Result<Vec<u8>, WireError> {
        self.ensure(len)?;
        let mut out = vec![0u8; len];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Reads a 4-byte length prefix followed by that many raw bytes.
    pub fn get_byte_block(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.get_u32()? as usize;
        if len > self.remaining() {
            return Err(WireError::LengthOutOfRange {
                len,
                remaining: self.remaining(),
            });
        }
        self.get_raw(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn get_utf8_string(&mut self) -> Result<String, WireError> {
        let bytes = self.get_byte_block()?;
        String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
    }

    /// Reads a length-prefixed UTF-16 string.
    pub fn get_utf16_string(&mut self) -> Result<String, WireError> {
        let count = self.get_u32()? as usize;
        // Each code unit occupies two bytes; reject before allocating.
        if count.saturating_mul(2) > self.remaining() {
            return Err(WireError::LengthOutOfRange {
                len: count,
                remaining: self.remaining(),
            });
        }
        let mut units = Vec::with_capacity(count);
        for _ in 0..count {
            units.push(self.get_u16()?);
        }
        String::from_utf16(&units).map_err(|_| WireError::InvalidUtf16)
    }

    /// Reads a 4-byte element count followed by that many elements.
    pub fn get_list<T: WireDecode>(&mut self) -> Result<Vec<T>, WireError> {
        let count = self.get_u32()? as usize;
        // Every element is at least one byte; a count beyond the remaining
        // buffer is corrupt and must not drive the allocation below.
        if count > self.remaining() {
            return Err(WireError::LengthOutOfRange {
                len: count,
                remaining: self.remaining(),
            });
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::decode(self)?);
        }
        Ok(items)
    }
}

// #########
// # TESTS #
// #########
