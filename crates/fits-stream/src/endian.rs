//! Big-endian byte conversion for FITS data.
//!
//! FITS stores all binary data in big-endian (most-significant byte first)
//! format. This module provides the scalar readers used by the table and
//! tile decoders; whole-frame image payloads go through the bulk path in
//! `image.rs` instead.

/// Read a `u8` from the first byte of the slice.
#[inline]
pub fn read_u8(buf: &[u8]) -> u8 {
    buf[0]
}

/// Read a big-endian `i16` from the first 2 bytes of the slice.
#[inline]
pub fn read_i16_be(buf: &[u8]) -> i16 {
    i16::from_be_bytes([buf[0], buf[1]])
}

/// Read a big-endian `u16` from the first 2 bytes of the slice.
#[inline]
pub fn read_u16_be(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}

/// Read a big-endian `i32` from the first 4 bytes of the slice.
#[inline]
pub fn read_i32_be(buf: &[u8]) -> i32 {
    i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Read a big-endian `u32` from the first 4 bytes of the slice.
#[inline]
pub fn read_u32_be(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Read a big-endian `i64` from the first 8 bytes of the slice.
#[inline]
pub fn read_i64_be(buf: &[u8]) -> i64 {
    i64::from_be_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ])
}

/// Read a big-endian `f32` (IEEE 754) from the first 4 bytes of the slice.
#[inline]
pub fn read_f32_be(buf: &[u8]) -> f32 {
    f32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Read a big-endian `f64` (IEEE 754) from the first 8 bytes of the slice.
#[inline]
pub fn read_f64_be(buf: &[u8]) -> f64 {
    f64::from_be_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_scalars() {
        assert_eq!(read_u8(&[0xAB]), 0xAB);
        assert_eq!(read_i16_be(&[0xFF, 0xFE]), -2);
        assert_eq!(read_u16_be(&[0x01, 0x00]), 256);
        assert_eq!(read_i32_be(&[0xFF, 0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(read_u32_be(&[0x00, 0x00, 0x01, 0x00]), 256);
        assert_eq!(
            read_i64_be(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A]),
            42
        );
    }

    #[test]
    fn read_floats() {
        assert_eq!(read_f32_be(&1.5f32.to_be_bytes()), 1.5);
        assert_eq!(read_f64_be(&(-0.25f64).to_be_bytes()), -0.25);
    }

    #[test]
    fn reads_ignore_trailing_bytes() {
        let buf = [0x00, 0x10, 0xDE, 0xAD];
        assert_eq!(read_i16_be(&buf), 16);
    }
}
