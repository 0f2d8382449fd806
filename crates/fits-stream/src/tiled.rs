//! Tile-compressed images stored in BINTABLE extensions (ZIMAGE = T).
//!
//! Each table row holds one Rice-compressed tile of the image. Quantized
//! floating-point images carry a `ZQUANTIZ = 'SUBTRACTIVE_DITHER_1'`
//! keyword and are reconstructed by subtracting the same pseudo-random
//! dither sequence the compressor added.

use std::io::{Read, Seek};
use std::sync::{Mutex, OnceLock};

use crate::bintable::{parse_columns, BinaryColumnDescriptor, HeapDescriptor};
use crate::block::{read_exact_at, SharedSource};
use crate::endian;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::rice::RiceDecoder;
use crate::tabular::RowPager;

/// Integer sentinel for a null (NaN) pixel in a quantized tile.
const NULL_SENTINEL: i32 = -2147483647;
/// Integer sentinel for an exact zero in a quantized tile.
const ZERO_SENTINEL: i32 = -2147483646;

const N_RANDOM: usize = 10000;

/// The shared dither sequence: a Park-Miller generator seeded with 1,
/// scaled into `[0, 1)`.
pub(crate) fn random_values() -> &'static [f64; N_RANDOM] {
    static VALUES: OnceLock<[f64; N_RANDOM]> = OnceLock::new();
    VALUES.get_or_init(|| {
        const A: u64 = 16807;
        const M: u64 = 2147483647;
        let mut seed = 1u64;
        let mut values = [0.0f64; N_RANDOM];
        for v in values.iter_mut() {
            seed = (A * seed) % M;
            *v = seed as f64 / M as f64;
        }
        values
    })
}

/// Tile column names whose contents this decoder does not interpret.
/// Tiles stored this way reconstruct as NaN-filled rather than failing
/// the whole HDU.
const OPAQUE_TILE_COLUMNS: [&str; 2] = ["UNCOMPRESSED_DATA", "GZIP_COMPRESSED_DATA"];

/// A Rice-compressed image data unit.
#[derive(Debug)]
pub struct CompressedImage<R> {
    src: SharedSource<R>,
    pager: Mutex<RowPager>,
    heap_start: u64,
    /// `None` when the tiles live in an opaque column; every pixel then
    /// reconstructs as NaN.
    data_column: Option<BinaryColumnDescriptor>,
    zscale_column: Option<BinaryColumnDescriptor>,
    zzero_column: Option<BinaryColumnDescriptor>,
    zbitpix: i64,
    znaxes: Vec<u64>,
    tile_len: usize,
    blocksize: usize,
    decoder: RiceDecoder,
    bscale: f64,
    bzero: f64,
    dither: bool,
    zdither0: i64,
}

impl<R: Read + Seek> CompressedImage<R> {
    pub(crate) fn new(src: SharedSource<R>, data_start: u64, header: &Header) -> Result<Self> {
        match header.get_str("ZCMPTYPE") {
            Some("RICE_1") => {}
            Some(other) => return Err(Error::UnsupportedFormat(format!("{other} compression"))),
            None => return Err(Error::MissingKeyword("ZCMPTYPE")),
        }

        let naxis1 = header.require_int("NAXIS1")? as usize;
        let naxis2 = header.require_int("NAXIS2")? as usize;
        let tfields = header.require_int("TFIELDS")? as usize;
        let columns = parse_columns(header, tfields)?;

        let find = |name: &str| {
            columns
                .iter()
                .find(|c| c.name.as_deref() == Some(name))
                .cloned()
        };
        let data_column = match find("COMPRESSED_DATA") {
            Some(column) => {
                if column.format.heap != Some(HeapDescriptor::P) {
                    return Err(Error::validation(
                        "TFORM",
                        "COMPRESSED_DATA",
                        "a P variable-length array column",
                    ));
                }
                Some(column)
            }
            None if OPAQUE_TILE_COLUMNS.iter().any(|n| find(n).is_some()) => None,
            None => return Err(Error::MissingKeyword("TTYPEn = 'COMPRESSED_DATA'")),
        };

        let zbitpix = header.require_int("ZBITPIX")?;
        let znaxis = header.require_int("ZNAXIS")? as usize;
        let mut znaxes = Vec::with_capacity(znaxis);
        for i in 1..=znaxis {
            let n = header
                .get_int(&format!("ZNAXIS{i}"))
                .ok_or(Error::MissingKeyword("ZNAXISn"))?;
            znaxes.push(n as u64);
        }
        if znaxes.is_empty() {
            return Err(Error::validation("ZNAXIS", 0, "at least one image axis"));
        }

        // Default tiling is one image row per tile.
        let mut tile_len = 1u64;
        for (i, &axis) in znaxes.iter().enumerate() {
            let default = if i == 0 { axis } else { 1 };
            tile_len *= header
                .get_int(&format!("ZTILE{}", i + 1))
                .map(|t| t as u64)
                .unwrap_or(default);
        }

        // BLOCKSIZE and BYTEPIX live in the ZNAMEn / ZVALn pairs.
        let mut blocksize = 32usize;
        let mut bytepix = 4usize;
        for i in 1.. {
            let Some(name) = header.get_str(&format!("ZNAME{i}")) else {
                break;
            };
            if let Some(v) = header.get_int(&format!("ZVAL{i}")) {
                match name {
                    "BLOCKSIZE" => blocksize = v as usize,
                    "BYTEPIX" => bytepix = v as usize,
                    _ => {}
                }
            }
        }

        let dither = header.get_str("ZQUANTIZ") == Some("SUBTRACTIVE_DITHER_1");

        Ok(CompressedImage {
            src,
            pager: Mutex::new(RowPager::new(data_start, naxis1, naxis2)),
            heap_start: data_start + (naxis1 as u64) * (naxis2 as u64),
            data_column,
            zscale_column: find("ZSCALE"),
            zzero_column: find("ZZERO"),
            zbitpix,
            znaxes,
            tile_len: tile_len as usize,
            blocksize,
            decoder: RiceDecoder::new(bytepix)?,
            bscale: header.get_f64("BSCALE").unwrap_or(1.0),
            bzero: header.get_f64("BZERO").unwrap_or(0.0),
            dither,
            zdither0: header.get_int("ZDITHER0").unwrap_or(0),
        })
    }

    pub fn zbitpix(&self) -> i64 {
        self.zbitpix
    }

    pub fn dimensions(&self) -> &[u64] {
        &self.znaxes
    }

    pub fn width(&self) -> u64 {
        self.znaxes[0]
    }

    pub fn height(&self) -> u64 {
        self.znaxes.get(1).copied().unwrap_or(1)
    }

    pub fn num_tiles(&self) -> usize {
        crate::block::lock_source(&self.pager).num_rows()
    }

    /// Read and Rice-decode the raw quantized integers of one tile.
    fn tile_raw(
        &self,
        column: &BinaryColumnDescriptor,
        tile: usize,
        num_pixels: usize,
    ) -> Result<(Vec<i32>, f64, f64)> {
        let row = {
            let mut pager = crate::block::lock_source(&self.pager);
            pager.row(&self.src, tile)?.to_vec()
        };

        let descriptor = &row[column.offset..column.offset + 8];
        let count = endian::read_i32_be(descriptor) as u32 as usize;
        let offset = endian::read_i32_be(&descriptor[4..]) as u32 as u64;
        let mut compressed = vec![0u8; count];
        read_exact_at(&self.src, self.heap_start + offset, &mut compressed)?;
        let raw = self.decoder.decode(&compressed, num_pixels, self.blocksize)?;

        let read_col = |col: &Option<BinaryColumnDescriptor>, fallback: f64| match col {
            Some(c) => endian::read_f64_be(&row[c.offset..c.offset + 8]),
            None => fallback,
        };
        let scale = read_col(&self.zscale_column, self.bscale);
        let zero = read_col(&self.zzero_column, self.bzero);
        Ok((raw, scale, zero))
    }

    /// Decompress the whole image into physical pixel values, tile by
    /// tile in row-major order.
    pub fn frame(&self) -> Result<Vec<f32>> {
        let total: u64 = self.znaxes.iter().product();
        let total = total as usize;
        let Some(column) = &self.data_column else {
            return Ok(vec![f32::NAN; total]);
        };
        let mut out = Vec::with_capacity(total);
        let randoms = random_values();

        let mut tile = 0usize;
        while out.len() < total {
            if tile >= self.num_tiles() {
                return Err(Error::Decode("too few tiles for the declared image size"));
            }
            let num_pixels = self.tile_len.min(total - out.len());
            let (raw, scale, zero) = self.tile_raw(column, tile, num_pixels)?;

            if self.dither {
                let mut i = (tile as i64 + self.zdither0 - 1).rem_euclid(N_RANDOM as i64) as usize;
                for &v in &raw {
                    match v {
                        NULL_SENTINEL => out.push(f32::NAN),
                        ZERO_SENTINEL => out.push(0.0),
                        _ => {
                            let r = randoms[i];
                            out.push(((f64::from(v) - r + 0.5) * scale + zero) as f32);
                        }
                    }
                    i += 1;
                    if i == N_RANDOM {
                        i = 0;
                    }
                }
            } else {
                for &v in &raw {
                    match v {
                        NULL_SENTINEL => out.push(f32::NAN),
                        ZERO_SENTINEL => out.push(0.0),
                        _ => out.push((f64::from(v) * scale + zero) as f32),
                    }
                }
            }
            tile += 1;
        }
        Ok(out)
    }
}
