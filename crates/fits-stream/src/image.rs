//! Image data-unit access.
//!
//! Frames are decoded lazily, one source read per request: nothing is
//! materialized until asked for. Big-endian payloads are bulk-reinterpreted
//! into typed vectors and byte-swapped in place, then run through the
//! BSCALE/BZERO scaling rules.

use std::io::{Read, Seek};

use bytemuck::pod_collect_to_vec;

use crate::block::{read_exact_at, SharedSource};
use crate::error::{Error, Result};
use crate::header::Header;

/// A decoded image frame, typed by BITPIX and the scaling outcome.
///
/// BITPIX 8 is promoted to `u16` on decode. Integral BSCALE/BZERO widen the
/// element type one step (u16/i16 → i32, i32 → i64) so the usual
/// BZERO = 32768 unsigned-range convention cannot wrap; non-integral scaling
/// produces `f32`.
#[derive(Debug, Clone, PartialEq)]
pub enum Pixels {
    U16(Vec<u16>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Pixels {
    pub fn len(&self) -> usize {
        match self {
            Pixels::U16(v) => v.len(),
            Pixels::I16(v) => v.len(),
            Pixels::I32(v) => v.len(),
            Pixels::I64(v) => v.len(),
            Pixels::F32(v) => v.len(),
            Pixels::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric view of one element, for callers that do not need the
    /// native width.
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            Pixels::U16(v) => v.get(index).map(|&p| p as f64),
            Pixels::I16(v) => v.get(index).map(|&p| p as f64),
            Pixels::I32(v) => v.get(index).map(|&p| p as f64),
            Pixels::I64(v) => v.get(index).map(|&p| p as f64),
            Pixels::F32(v) => v.get(index).map(|&p| p as f64),
            Pixels::F64(v) => v.get(index).copied(),
        }
    }

    fn append(&mut self, other: Pixels) -> Result<()> {
        match (self, other) {
            (Pixels::U16(a), Pixels::U16(b)) => a.extend(b),
            (Pixels::I16(a), Pixels::I16(b)) => a.extend(b),
            (Pixels::I32(a), Pixels::I32(b)) => a.extend(b),
            (Pixels::I64(a), Pixels::I64(b)) => a.extend(b),
            (Pixels::F32(a), Pixels::F32(b)) => a.extend(b),
            (Pixels::F64(a), Pixels::F64(b)) => a.extend(b),
            _ => return Err(Error::Decode("mismatched pixel chunk types")),
        }
        Ok(())
    }
}

pub(crate) fn bytes_per_pixel(bitpix: i64) -> Result<usize> {
    match bitpix {
        8 => Ok(1),
        16 => Ok(2),
        32 | -32 => Ok(4),
        64 | -64 => Ok(8),
        other => Err(Error::validation(
            "BITPIX",
            other,
            "one of 8, 16, 32, -32, -64",
        )),
    }
}

/// Decode a big-endian frame payload into native-endian typed pixels.
fn decode_raw(raw: &[u8], bitpix: i64) -> Result<Pixels> {
    match bitpix {
        8 => Ok(Pixels::U16(raw.iter().map(|&b| b as u16).collect())),
        16 => {
            // Interpret big-endian bytes as i16, collect into a
            // properly-aligned Vec<i16>, then swap each element in place.
            let mut pixels: Vec<i16> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i16::from_be(*v);
            }
            Ok(Pixels::I16(pixels))
        }
        32 => {
            let mut pixels: Vec<i32> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i32::from_be(*v);
            }
            Ok(Pixels::I32(pixels))
        }
        -32 => {
            let mut pixels: Vec<f32> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = f32::from_bits(u32::from_be(v.to_bits()));
            }
            Ok(Pixels::F32(pixels))
        }
        -64 => {
            let mut pixels: Vec<f64> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = f64::from_bits(u64::from_be(v.to_bits()));
            }
            Ok(Pixels::F64(pixels))
        }
        other => Err(Error::validation(
            "BITPIX",
            other,
            "one of 8, 16, 32, -32, -64",
        )),
    }
}

fn is_integral(x: f64) -> bool {
    x.fract() == 0.0 && x.is_finite()
}

/// Apply BSCALE/BZERO. Identity scaling returns the raw pixels untouched;
/// integral factors stay in the integer domain (widened); anything else
/// produces `f32`, matching the physical-value definition
/// `bzero + bscale * raw` exactly in both branches.
fn apply_scaling(raw: Pixels, bscale: f64, bzero: f64) -> Pixels {
    if bscale == 1.0 && bzero == 0.0 {
        return raw;
    }
    if is_integral(bscale) && is_integral(bzero) {
        let s = bscale as i64;
        let z = bzero as i64;
        return match raw {
            Pixels::U16(v) => {
                Pixels::I32(v.iter().map(|&p| (z + s * p as i64) as i32).collect())
            }
            Pixels::I16(v) => {
                Pixels::I32(v.iter().map(|&p| (z + s * p as i64) as i32).collect())
            }
            Pixels::I32(v) => Pixels::I64(v.iter().map(|&p| z + s * p as i64).collect()),
            Pixels::I64(v) => Pixels::I64(v.iter().map(|&p| z + s * p).collect()),
            Pixels::F32(v) => {
                Pixels::F32(v.iter().map(|&p| (bzero + bscale * p as f64) as f32).collect())
            }
            Pixels::F64(v) => Pixels::F64(v.iter().map(|&p| bzero + bscale * p).collect()),
        };
    }
    match raw {
        Pixels::U16(v) => {
            Pixels::F32(v.iter().map(|&p| (bzero + bscale * p as f64) as f32).collect())
        }
        Pixels::I16(v) => {
            Pixels::F32(v.iter().map(|&p| (bzero + bscale * p as f64) as f32).collect())
        }
        Pixels::I32(v) => {
            Pixels::F32(v.iter().map(|&p| (bzero + bscale * p as f64) as f32).collect())
        }
        Pixels::I64(v) => {
            Pixels::F32(v.iter().map(|&p| (bzero + bscale * p as f64) as f32).collect())
        }
        Pixels::F32(v) => {
            Pixels::F32(v.iter().map(|&p| (bzero + bscale * p as f64) as f32).collect())
        }
        Pixels::F64(v) => Pixels::F64(v.iter().map(|&p| bzero + bscale * p).collect()),
    }
}

/// Lazily-decoded image data unit.
#[derive(Debug)]
pub struct Image<R> {
    src: SharedSource<R>,
    data_start: u64,
    bitpix: i64,
    naxes: Vec<u64>,
    bscale: f64,
    bzero: f64,
    blank: Option<i64>,
}

impl<R: Read + Seek> Image<R> {
    pub(crate) fn new(src: SharedSource<R>, data_start: u64, header: &Header) -> Result<Self> {
        let bitpix = header.require_int("BITPIX")?;
        bytes_per_pixel(bitpix)?;
        let naxes = header.naxes()?;
        let bscale = header.get_f64("BSCALE").unwrap_or(1.0);
        let bzero = header.get_f64("BZERO").unwrap_or(0.0);
        let blank = header.get_int("BLANK");
        Ok(Image {
            src,
            data_start,
            bitpix,
            naxes,
            bscale,
            bzero,
            blank,
        })
    }

    pub fn bitpix(&self) -> i64 {
        self.bitpix
    }

    pub fn dimensions(&self) -> &[u64] {
        &self.naxes
    }

    pub fn width(&self) -> u64 {
        self.naxes.first().copied().unwrap_or(0)
    }

    pub fn height(&self) -> u64 {
        self.naxes.get(1).copied().unwrap_or(1)
    }

    /// Number of NAXIS1 × NAXIS2 planes (product of the remaining axes).
    pub fn frame_count(&self) -> usize {
        if self.naxes.is_empty() {
            return 0;
        }
        self.naxes[2..].iter().product::<u64>().max(1) as usize
    }

    fn frame_pixel_count(&self) -> usize {
        (self.width() * self.height()) as usize
    }

    fn frame_bytes(&self, index: usize) -> Result<Vec<u8>> {
        if index >= self.frame_count() {
            return Err(Error::Decode("frame index out of range"));
        }
        // bytes_per_pixel was checked at construction
        let bpp = bytes_per_pixel(self.bitpix)?;
        let frame_len = self.frame_pixel_count() * bpp;
        let offset = self.data_start + (index * frame_len) as u64;
        let mut buf = vec![0u8; frame_len];
        read_exact_at(&self.src, offset, &mut buf)?;
        Ok(buf)
    }

    /// Decode one frame: a single source read, then bulk conversion and
    /// scaling.
    pub fn frame(&self, index: usize) -> Result<Pixels> {
        let bytes = self.frame_bytes(index)?;
        let raw = decode_raw(&bytes, self.bitpix)?;
        Ok(apply_scaling(raw, self.bscale, self.bzero))
    }

    /// Decode one frame by splitting its payload into `chunks` contiguous
    /// sub-ranges decoded on scoped threads and merged in index order.
    /// The result is identical to [`Image::frame`].
    pub fn frame_chunked(&self, index: usize, chunks: usize) -> Result<Pixels> {
        let bytes = self.frame_bytes(index)?;
        let bpp = bytes_per_pixel(self.bitpix)?;
        let total = self.frame_pixel_count();
        let chunks = chunks.max(1).min(total.max(1));
        let per_chunk = total.div_ceil(chunks) * bpp;
        if per_chunk == 0 {
            return Ok(apply_scaling(decode_raw(&bytes, self.bitpix)?, self.bscale, self.bzero));
        }

        let bitpix = self.bitpix;
        let parts: Vec<Result<Pixels>> = std::thread::scope(|scope| {
            let handles: Vec<_> = bytes
                .chunks(per_chunk)
                .map(|chunk| scope.spawn(move || decode_raw(chunk, bitpix)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or(Err(Error::Decode("frame decode worker panicked")))
                })
                .collect()
        });

        let mut merged: Option<Pixels> = None;
        for part in parts {
            let part = part?;
            match merged.as_mut() {
                Some(m) => m.append(part)?,
                None => merged = Some(part),
            }
        }
        let raw = merged.ok_or(Error::Decode("empty frame"))?;
        Ok(apply_scaling(raw, self.bscale, self.bzero))
    }

    /// Mask of undefined pixels: BLANK matches for integer frames, NaN for
    /// floating-point frames. `None` when the concept does not apply.
    pub fn blank_mask(&self, pixels: &Pixels) -> Option<Vec<bool>> {
        match pixels {
            Pixels::U16(v) => self.blank.map(|b| v.iter().map(|&p| p as i64 == b).collect()),
            Pixels::I16(v) => self.blank.map(|b| v.iter().map(|&p| p as i64 == b).collect()),
            Pixels::I32(v) => self.blank.map(|b| v.iter().map(|&p| p as i64 == b).collect()),
            Pixels::I64(v) => self.blank.map(|b| v.iter().map(|&p| p == b).collect()),
            Pixels::F32(v) => Some(v.iter().map(|p| p.is_nan()).collect()),
            Pixels::F64(v) => Some(v.iter().map(|p| p.is_nan()).collect()),
        }
    }
}
