//! Binary reader/writer for object state frames and remote-call payloads
//!
//! All multi-byte values are little-endian. Counts use a packed varint:
//! seven payload bits per byte, high bit set when another byte follows.
//!
//! ```text
//! full state:   [sequenceId: u16][x: f32][y: f32]
//! delta state:  [sequenceId: u16][count: varint][(x: f32, y: f32) * count]
//! SnapTo call:  [x: f32][y: f32][minSequenceId: u16]
//! ```

use crate::vector::Vector2;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum encoded length of a packed `u32`
const MAX_VARINT_BYTES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("unexpected end of message: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("packed integer longer than 5 bytes")]
    VarintOverflow,
}

/// Cursor over an inbound message body
#[derive(Debug, Clone)]
pub struct MessageReader {
    buf: Bytes,
}

impl MessageReader {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self { buf: buf.into() }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(WireError::UnexpectedEof { needed, remaining });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_vector2(&mut self) -> Result<Vector2, WireError> {
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        Ok(Vector2::new(x, y))
    }

    pub fn read_packed_u32(&mut self) -> Result<u32, WireError> {
        let mut value: u32 = 0;

        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8()?;
            // The fifth byte only carries the top four bits of a u32
            if i == MAX_VARINT_BYTES - 1 && byte & 0x70 != 0 {
                return Err(WireError::VarintOverflow);
            }
            value |= u32::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }

        Err(WireError::VarintOverflow)
    }
}

/// Growable outbound message body
#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: BytesMut,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn write_vector2(&mut self, value: Vector2) {
        self.write_f32(value.x);
        self.write_f32(value.y);
    }

    pub fn write_packed_u32(&mut self, mut value: u32) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.buf.put_u8(byte);
            if value == 0 {
                break;
            }
        }
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn into_reader(self) -> MessageReader {
        MessageReader::new(self.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let mut writer = MessageWriter::new();
        writer.write_u16(0x0102);
        writer.write_f32(1.0);

        let bytes = writer.freeze();
        assert_eq!(&bytes[..], &[0x02, 0x01, 0x00, 0x00, 0x80, 0x3f]);
    }

    #[test]
    fn test_packed_encoding_lengths() {
        let cases = [(0u32, 1usize), (127, 1), (128, 2), (16_383, 2), (16_384, 3), (u32::MAX, 5)];

        for (value, expected_len) in cases {
            let mut writer = MessageWriter::new();
            writer.write_packed_u32(value);
            assert_eq!(writer.len(), expected_len, "length of packed {value}");

            let mut reader = writer.into_reader();
            assert_eq!(reader.read_packed_u32().unwrap(), value);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn test_packed_known_bytes() {
        let mut reader = MessageReader::new(vec![0xac, 0x02]);
        assert_eq!(reader.read_packed_u32().unwrap(), 300);
    }

    #[test]
    fn test_truncated_input() {
        let mut reader = MessageReader::new(vec![0x01]);
        assert_eq!(
            reader.read_u16(),
            Err(WireError::UnexpectedEof {
                needed: 2,
                remaining: 1
            })
        );

        let mut reader = MessageReader::new(vec![0x00, 0x00, 0x80]);
        assert!(matches!(
            reader.read_f32(),
            Err(WireError::UnexpectedEof { needed: 4, .. })
        ));
    }

    #[test]
    fn test_varint_overflow() {
        let mut reader = MessageReader::new(vec![0xff; 6]);
        assert_eq!(reader.read_packed_u32(), Err(WireError::VarintOverflow));

        let mut reader = MessageReader::new(vec![0xff, 0xff, 0xff, 0xff, 0x7f]);
        assert_eq!(reader.read_packed_u32(), Err(WireError::VarintOverflow));

        let mut reader = MessageReader::new(vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert_eq!(reader.read_packed_u32(), Ok(u32::MAX));

        let mut reader = MessageReader::new(vec![0x80]);
        assert!(matches!(
            reader.read_packed_u32(),
            Err(WireError::UnexpectedEof { .. })
        ));
    }
}
