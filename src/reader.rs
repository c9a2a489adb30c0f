//! Primitive readers over an explicit bit cursor.
//!
//! The cursor is a `(byte index, bits consumed in current byte)` pair over a borrowed
//! slice, so reads never mutate the input and a saved cursor is a complete rollback
//! point. Bits are consumed most-significant first; a byte is only left behind once
//! all 8 of its bits are accounted for.
//!
//! Offsets reported in errors are absolute: a cursor created for a nested window
//! carries the window's position in the overall packet as `base`.

use crate::error::ParseError;
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder};

#[derive(Debug, Clone, Copy)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    base: usize,
    pos: usize,
    bit: u8,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Cursor over `data`, which starts at absolute offset `base` of the packet.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        BitCursor { data, base, pos: 0, bit: 0 }
    }

    /// Bytes fully or partially consumed, relative to this cursor's window.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute offset of the current byte in the packet.
    pub fn absolute(&self) -> usize {
        self.base + self.pos
    }

    /// Bits already consumed from the current byte (0..=7).
    pub fn bit_offset(&self) -> u8 {
        self.bit
    }

    pub fn is_aligned(&self) -> bool {
        self.bit == 0
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn remaining_bytes(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn remaining_bits(&self) -> u64 {
        (self.remaining_bytes() as u64 * 8).saturating_sub(self.bit as u64)
    }

    /// Unread bytes starting at the current byte.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// Bits consumed so far, relative to this cursor's window.
    pub fn bit_position(&self) -> u64 {
        self.pos as u64 * 8 + self.bit as u64
    }

    /// Cursor over the next `len` bytes only (for `byte_length` windows).
    pub fn window(&self, field: &str, len: usize) -> Result<BitCursor<'a>, ParseError> {
        self.require_aligned(field)?;
        self.require_bytes(field, len)?;
        Ok(BitCursor::with_base(&self.data[self.pos..self.pos + len], self.absolute()))
    }

    /// Cursor over everything left.
    pub fn rest(&self, field: &str) -> Result<BitCursor<'a>, ParseError> {
        self.require_aligned(field)?;
        Ok(BitCursor::with_base(self.remaining(), self.absolute()))
    }

    /// Skip `n` whole bytes already consumed by a nested cursor.
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
    }

    fn require_aligned(&self, field: &str) -> Result<(), ParseError> {
        if self.is_aligned() {
            Ok(())
        } else {
            Err(ParseError::UnalignedField {
                field: field.to_string(),
                offset: self.absolute(),
                bit: self.bit,
            })
        }
    }

    fn require_bytes(&self, field: &str, n: usize) -> Result<(), ParseError> {
        if n > self.remaining_bytes() {
            return Err(ParseError::InsufficientBytes {
                field: field.to_string(),
                offset: self.absolute(),
                needed: n,
                available: self.remaining_bytes(),
            });
        }
        Ok(())
    }

    /// Read `length` whole bytes: big-endian integer for 1, 2, 4, 8 bytes, a 128-bit
    /// block for 16, raw bytes otherwise.
    pub fn read_fixed(&mut self, field: &str, length: usize) -> Result<Value, ParseError> {
        self.require_aligned(field)?;
        self.require_bytes(field, length)?;
        let buf = &self.data[self.pos..self.pos + length];
        let v = match length {
            1 => Value::Uint(buf[0] as u64),
            2 => Value::Uint(BigEndian::read_u16(buf) as u64),
            4 => Value::Uint(BigEndian::read_u32(buf) as u64),
            8 => Value::Uint(BigEndian::read_u64(buf)),
            16 => Value::Wide(BigEndian::read_u128(buf)),
            _ => Value::Bytes(buf.to_vec()),
        };
        self.pos += length;
        Ok(v)
    }

    /// Self-describing integer: width `2^(top 2 bits)` bytes, top 2 bits masked out.
    /// Returns the value and its encoded width in bits.
    pub fn read_varint(&mut self, field: &str) -> Result<(u64, u64), ParseError> {
        self.require_aligned(field)?;
        self.require_bytes(field, 1)?;
        let width = 1usize << (self.data[self.pos] >> 6);
        let v = self.read_masked(field, width)?;
        Ok((v, width as u64 * 8))
    }

    /// Packet-number encoding: `00` 1 byte, `10` 2 bytes, `11` 4 bytes; `01` is invalid.
    pub fn read_packet_number(&mut self, field: &str) -> Result<(u64, u64), ParseError> {
        self.require_aligned(field)?;
        self.require_bytes(field, 1)?;
        let pattern = self.data[self.pos] >> 6;
        let width = match pattern {
            0b00 => 1,
            0b10 => 2,
            0b11 => 4,
            _ => {
                return Err(ParseError::UnknownEncodingPattern {
                    field: field.to_string(),
                    offset: self.absolute(),
                    pattern,
                })
            }
        };
        let v = self.read_masked(field, width)?;
        Ok((v, width as u64 * 8))
    }

    fn read_masked(&mut self, field: &str, width: usize) -> Result<u64, ParseError> {
        self.require_bytes(field, width)?;
        let mut buf = [0u8; 8];
        buf[8 - width..].copy_from_slice(&self.data[self.pos..self.pos + width]);
        buf[8 - width] &= 0x3f;
        self.pos += width;
        Ok(BigEndian::read_u64(&buf))
    }

    /// Read `n` (at most 64) bits MSB-first, crossing byte boundaries as needed.
    /// Wider fields must be whole bytes at an aligned cursor.
    pub fn read_bits(&mut self, field: &str, n: u64) -> Result<u64, ParseError> {
        if n > 64 {
            return Err(ParseError::UnsupportedWidth {
                field: field.to_string(),
                offset: self.absolute(),
                bits: n,
            });
        }
        if n > self.remaining_bits() {
            return Err(ParseError::InsufficientBytes {
                field: field.to_string(),
                offset: self.absolute(),
                needed: ((self.bit as u64 + n + 7) / 8) as usize,
                available: self.remaining_bytes(),
            });
        }
        let mut out = 0u64;
        let mut left = n as u32;
        while left > 0 {
            let avail = 8 - self.bit as u32;
            let take = avail.min(left);
            let byte = self.data[self.pos] as u32;
            let chunk = (byte >> (avail - take)) & ((1u32 << take) - 1);
            out = (out << take) | chunk as u64;
            left -= take;
            self.bit += take as u8;
            if self.bit == 8 {
                self.bit = 0;
                self.pos += 1;
            }
        }
        Ok(out)
    }

    /// Everything left in the window as raw bytes (`length: '*'`).
    pub fn read_rest(&mut self, field: &str) -> Result<Value, ParseError> {
        self.require_aligned(field)?;
        let v = Value::Bytes(self.remaining().to_vec());
        self.pos = self.data.len();
        Ok(v)
    }
}
