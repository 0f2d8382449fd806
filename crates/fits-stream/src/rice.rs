//! RICE_1 bitstream decoding, per the FITS tiled image compression
//! convention.
//!
//! Each tile stream starts with one uncompressed big-endian pixel (the
//! predictor seed) followed by blocks of `blocksize` pixels. Every block is
//! prefixed by an `fsbits`-wide code selecting one of three encodings:
//! a zero-difference run, Golomb-Rice coded differences with `fs` remainder
//! bits, or raw `bbits`-wide literal differences.  Differences are
//! zigzag-mapped and accumulate with 32-bit wraparound.

use crate::endian::read_i32_be;
use crate::error::{Error, Result};

/// Position of the most significant 1-bit for each byte value 0..255.
const NONZERO_COUNT: [i32; 256] = [
    0, 1, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
];

/// Inverse of the zigzag mapping: even codes are non-negative differences,
/// odd codes negative.
#[inline]
fn unzigzag(v: u32) -> u32 {
    if v & 1 == 0 {
        v >> 1
    } else {
        !(v >> 1)
    }
}

/// A RICE_1 decoder configured for one element width.
///
/// The default stream parameters come from the compression header's
/// ZNAMEn/ZVALn pairs: `BYTEPIX` selects the decoder, `BLOCKSIZE` the run
/// length per code word (32 in practice).
#[derive(Debug, Clone, Copy)]
pub struct RiceDecoder {
    fsbits: i32,
    fsmax: i32,
    bbits: i32,
    bytepix: usize,
}

impl RiceDecoder {
    pub fn new(bytepix: usize) -> Result<Self> {
        match bytepix {
            1 => Ok(RiceDecoder {
                fsbits: 3,
                fsmax: 6,
                bbits: 8,
                bytepix,
            }),
            2 => Ok(RiceDecoder {
                fsbits: 4,
                fsmax: 14,
                bbits: 16,
                bytepix,
            }),
            4 => Ok(RiceDecoder {
                fsbits: 5,
                fsmax: 25,
                bbits: 32,
                bytepix,
            }),
            other => Err(Error::UnsupportedFormat(format!("rice BYTEPIX {other}"))),
        }
    }

    pub fn bytepix(&self) -> usize {
        self.bytepix
    }

    /// Decode `num_pixels` values from a compressed tile stream.
    ///
    /// Differences accumulate with wrapping 32-bit adds, bit-exact with the
    /// reference decoder. A stream that runs out of bits mid-block degrades
    /// to repeating the last pixel, which is how trailing padding bits are
    /// absorbed.
    pub fn decode(
        &self,
        compressed: &[u8],
        num_pixels: usize,
        blocksize: usize,
    ) -> Result<Vec<i32>> {
        if compressed.len() < self.bytepix {
            return Err(Error::Decode("rice stream shorter than its seed pixel"));
        }

        let mut output = Vec::with_capacity(num_pixels);
        let mut pos = 0usize;

        // The seed pixel is stored uncompressed, big-endian, sign-extended.
        let mut lastpix: i32 = match self.bytepix {
            1 => compressed[0] as i8 as i32,
            2 => {
                let v = ((compressed[0] as u16) << 8) | (compressed[1] as u16);
                v as i16 as i32
            }
            4 => read_i32_be(compressed),
            _ => return Err(Error::Decode("rice stream element width")),
        };
        pos += self.bytepix;

        if num_pixels == 0 {
            return Ok(output);
        }
        if pos >= compressed.len() {
            output.resize(num_pixels, lastpix);
            return Ok(output);
        }

        // Bit accumulator: MSB-first, refilled a byte at a time.
        let mut b: u32 = compressed[pos] as u32;
        pos += 1;
        let mut nbits: i32 = 8;

        let nx = num_pixels as i32;
        let nblock = blocksize as i32;
        let mut pixel_idx: i32 = 0;

        while pixel_idx < nx {
            let imax = (pixel_idx + nblock).min(nx);

            // Block code word: fs + 1, fsbits wide.
            nbits -= self.fsbits;
            while nbits < 0 {
                if pos >= compressed.len() {
                    b <<= 8;
                } else {
                    b = (b << 8) | (compressed[pos] as u32);
                    pos += 1;
                }
                nbits += 8;
            }
            let fs = ((b >> nbits) as i32) - 1;
            b &= (1u32 << nbits) - 1;

            if fs < 0 {
                // Zero-difference run: every pixel repeats the predictor.
                while pixel_idx < imax {
                    output.push(lastpix);
                    pixel_idx += 1;
                }
            } else if fs == self.fsmax {
                // Literal differences, bbits per pixel.
                while pixel_idx < imax {
                    let mut k = self.bbits - nbits;
                    let mut diff = (b as u64) << k;

                    k -= 8;
                    while k >= 0 {
                        if pos < compressed.len() {
                            b = compressed[pos] as u32;
                            pos += 1;
                        } else {
                            b = 0;
                        }
                        diff |= (b as u64) << k;
                        k -= 8;
                    }

                    if nbits > 0 {
                        if pos < compressed.len() {
                            b = compressed[pos] as u32;
                            pos += 1;
                        } else {
                            b = 0;
                        }
                        diff |= (b >> (-k)) as u64;
                        b &= (1u32 << nbits) - 1;
                    } else {
                        b = 0;
                    }

                    let diff = unzigzag(diff as u32);
                    lastpix = (diff as i32).wrapping_add(lastpix);
                    output.push(lastpix);
                    pixel_idx += 1;
                }
            } else {
                // Golomb-Rice coded differences.
                while pixel_idx < imax {
                    // Unary part: count zeros up to the marker 1-bit.
                    while b == 0 {
                        nbits += 8;
                        if pos < compressed.len() {
                            b = compressed[pos] as u32;
                            pos += 1;
                        } else {
                            b = 0;
                            break;
                        }
                    }
                    let nzero = nbits - NONZERO_COUNT[b as usize & 0xFF];
                    nbits -= nzero + 1;
                    if !(0..=31).contains(&nbits) {
                        // Bits exhausted mid-block; repeat the predictor.
                        while pixel_idx < imax {
                            output.push(lastpix);
                            pixel_idx += 1;
                        }
                        break;
                    }
                    b ^= 1u32 << nbits;

                    // Remainder: fs low bits.
                    nbits -= fs;
                    while nbits < 0 {
                        if pos < compressed.len() {
                            b = (b << 8) | (compressed[pos] as u32);
                            pos += 1;
                        } else {
                            b <<= 8;
                        }
                        nbits += 8;
                    }

                    let diff = unzigzag(((nzero as u32) << fs) | (b >> nbits));
                    b &= (1u32 << nbits) - 1;

                    lastpix = (diff as i32).wrapping_add(lastpix);
                    output.push(lastpix);
                    pixel_idx += 1;
                }
            }
        }

        Ok(output)
    }
}
