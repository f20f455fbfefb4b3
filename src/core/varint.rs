//! U30 Variable-Length Integer
//!
//! 7 bit data per byte, bit tertinggi = continuation.
//! Dipakai untuk semua count, panjang string, dan index reference.

use super::byte_stream::{ByteStream, StreamError};

/// Batas byte yang dibaca decoder (shift berhenti setelah > 30)
pub const MAX_U30_BYTES: usize = 5;

/// Jumlah byte hasil encode `value`
#[inline]
pub fn encoded_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

impl ByteStream<'_> {
    /// Encode `value` sebagai varint di cursor. Minimal satu byte.
    pub fn write_u30(&mut self, mut value: u32) -> Result<(), StreamError> {
        let mut scratch = [0u8; MAX_U30_BYTES];
        let mut len = 0;
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                scratch[len] = byte;
                len += 1;
                break;
            }
            scratch[len] = byte | 0x80;
            len += 1;
        }
        self.write_bytes(&scratch[..len])
    }

    /// Decode varint dari cursor.
    ///
    /// Berhenti saat continuation bit kosong atau setelah byte kelima. Kalau
    /// stream habis di tengah sequence, cursor dikembalikan ke awal varint.
    pub fn read_u30(&mut self) -> Result<u32, StreamError> {
        let start = self.position();
        let mut value: u32 = 0;
        let mut shift: u32 = 0;

        loop {
            let byte = match self.read_u8() {
                Ok(byte) => byte,
                Err(err) => {
                    self.rewind_to(start);
                    return Err(err);
                }
            };
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 30 {
                break;
            }
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u32) -> Vec<u8> {
        let mut stream = ByteStream::allocate(0).unwrap();
        stream.write_u30(value).unwrap();
        stream.into_vec()
    }

    #[test]
    fn test_boundaries_roundtrip() {
        let values = [
            0u32, 127, 128, 16383, 16384, 2_097_151, 2_097_152, 268_435_455, 268_435_456,
        ];
        for &value in &values {
            let bytes = encode(value);
            assert_eq!(bytes.len(), encoded_len(value), "length of {}", value);
            let mut stream = ByteStream::wrap(&bytes);
            assert_eq!(stream.read_u30().unwrap(), value);
            assert_eq!(stream.available_to_read(), 0);
        }
    }

    #[test]
    fn test_known_bytes() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(127), vec![0x7F]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xAC, 0x02]);
    }

    #[test]
    fn test_full_u32_range() {
        for value in [u32::MAX, 1 << 31, (1 << 31) - 1] {
            let bytes = encode(value);
            assert_eq!(bytes.len(), MAX_U30_BYTES);
            let mut stream = ByteStream::wrap(&bytes);
            assert_eq!(stream.read_u30().unwrap(), value);
        }
    }

    #[test]
    fn test_truncated_rewinds() {
        let bytes = [0xFFu8, 0xFF];
        let mut stream = ByteStream::wrap(&bytes);
        let err = stream.read_u30().unwrap_err();
        assert_eq!(err, StreamError::InsufficientData { needed: 1 });
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_stops_after_five_bytes() {
        // Continuation masih set di byte kelima: decoder tetap berhenti
        let bytes = [0x80u8, 0x80, 0x80, 0x80, 0x81, 0x7F];
        let mut stream = ByteStream::wrap(&bytes);
        assert_eq!(stream.read_u30().unwrap(), 1 << 28);
        assert_eq!(stream.available_to_read(), 1);
    }
}
