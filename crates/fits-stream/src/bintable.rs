//! Binary table (XTENSION = 'BINTABLE') accessors.

use std::io::{Read, Seek};
use std::sync::Mutex;

use crate::block::{read_exact_at, SharedSource};
use crate::endian;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::tabular::{Cell, RowPager};

// ── Column Format ──

/// The element type of a binary table column, from the TFORMn type letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryElementType {
    /// `L` -- logical, one byte of 'T' or 'F'.
    Logical,
    /// `X` -- bit array, packed most-significant bit first.
    Bit,
    /// `B` -- unsigned 8-bit integer.
    Byte,
    /// `I` -- big-endian 16-bit signed integer.
    Short,
    /// `J` -- big-endian 32-bit signed integer.
    Long,
    /// `K` -- big-endian 64-bit signed integer.
    LongLong,
    /// `A` -- ASCII character.
    Char,
    /// `E` -- big-endian IEEE 754 single-precision float.
    Float,
    /// `D` -- big-endian IEEE 754 double-precision float.
    Double,
    /// `C` -- single-precision complex pair.
    ComplexFloat,
    /// `M` -- double-precision complex pair.
    ComplexDouble,
}

impl BinaryElementType {
    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            b'L' => BinaryElementType::Logical,
            b'X' => BinaryElementType::Bit,
            b'B' => BinaryElementType::Byte,
            b'I' => BinaryElementType::Short,
            b'J' => BinaryElementType::Long,
            b'K' => BinaryElementType::LongLong,
            b'A' => BinaryElementType::Char,
            b'E' => BinaryElementType::Float,
            b'D' => BinaryElementType::Double,
            b'C' => BinaryElementType::ComplexFloat,
            b'M' => BinaryElementType::ComplexDouble,
            _ => return None,
        })
    }

    /// Bytes per single element. `Bit` columns are sized by the whole
    /// field, not per element, and never reach this.
    fn byte_len(&self) -> usize {
        match self {
            BinaryElementType::Logical
            | BinaryElementType::Bit
            | BinaryElementType::Byte
            | BinaryElementType::Char => 1,
            BinaryElementType::Short => 2,
            BinaryElementType::Long | BinaryElementType::Float => 4,
            BinaryElementType::LongLong
            | BinaryElementType::Double
            | BinaryElementType::ComplexFloat => 8,
            BinaryElementType::ComplexDouble => 16,
        }
    }
}

/// Variable-length array descriptor flavor: `P` holds 32-bit
/// (count, heap offset) pairs, `Q` holds 64-bit pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapDescriptor {
    P,
    Q,
}

/// A parsed binary-table TFORM such as `"1J"`, `"16X"`, `"8A"`, or `"1PB(1000)"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryColumnFormat {
    pub repeat: usize,
    pub element: BinaryElementType,
    pub heap: Option<HeapDescriptor>,
}

impl BinaryColumnFormat {
    /// Total bytes this field occupies within a row.
    pub fn field_byte_len(&self) -> usize {
        match self.heap {
            Some(HeapDescriptor::P) => self.repeat * 8,
            Some(HeapDescriptor::Q) => self.repeat * 16,
            None => match self.element {
                BinaryElementType::Bit => self.repeat.div_ceil(8),
                other => self.repeat * other.byte_len(),
            },
        }
    }
}

/// Parse a binary-table TFORM string: optional repeat count, a type
/// letter, or `P`/`Q` followed by an element letter and an ignored
/// `(max)` suffix.
pub fn parse_tform_binary(s: &str) -> Result<BinaryColumnFormat> {
    let s = s.trim();
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    let repeat = if digits == 0 {
        1
    } else {
        s[..digits]
            .parse::<usize>()
            .map_err(|_| Error::validation("TFORM", s, "a repeat count"))?
    };
    let rest = s[digits..].as_bytes();
    let &code = rest
        .first()
        .ok_or_else(|| Error::validation("TFORM", s, "a type letter"))?;

    if code == b'P' || code == b'Q' {
        let &elem = rest
            .get(1)
            .ok_or_else(|| Error::validation("TFORM", s, "an array element type letter"))?;
        let element = BinaryElementType::from_code(elem)
            .ok_or_else(|| Error::validation("TFORM", s, "a known element type letter"))?;
        let heap = if code == b'P' {
            HeapDescriptor::P
        } else {
            HeapDescriptor::Q
        };
        return Ok(BinaryColumnFormat {
            repeat,
            element,
            heap: Some(heap),
        });
    }

    let element = BinaryElementType::from_code(code)
        .ok_or_else(|| Error::validation("TFORM", s, "a known type letter"))?;
    Ok(BinaryColumnFormat {
        repeat,
        element,
        heap: None,
    })
}

/// Describes one binary table column and its byte offset within a row.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryColumnDescriptor {
    pub name: Option<String>,
    pub format: BinaryColumnFormat,
    pub offset: usize,
}

pub(crate) fn parse_columns(header: &Header, tfields: usize) -> Result<Vec<BinaryColumnDescriptor>> {
    let mut columns = Vec::with_capacity(tfields);
    let mut offset = 0usize;
    for i in 1..=tfields {
        let tform = header
            .get_str(&format!("TFORM{i}"))
            .ok_or(Error::MissingKeyword("TFORMn"))?;
        let format = parse_tform_binary(tform)?;
        columns.push(BinaryColumnDescriptor {
            name: header.get_str(&format!("TTYPE{i}")).map(String::from),
            format,
            offset,
        });
        offset += format.field_byte_len();
    }
    Ok(columns)
}

// ── Element decoding ──

fn decode_scalar(bytes: &[u8], element: BinaryElementType) -> Cell {
    match element {
        BinaryElementType::Logical => Cell::Logical(bytes[0] == b'T'),
        BinaryElementType::Byte => Cell::Int(i64::from(endian::read_u8(bytes))),
        BinaryElementType::Short => Cell::Int(i64::from(endian::read_i16_be(bytes))),
        BinaryElementType::Long => Cell::Int(i64::from(endian::read_i32_be(bytes))),
        BinaryElementType::LongLong => Cell::Int(endian::read_i64_be(bytes)),
        BinaryElementType::Float => Cell::Float(f64::from(endian::read_f32_be(bytes))),
        BinaryElementType::Double => Cell::Float(endian::read_f64_be(bytes)),
        BinaryElementType::ComplexFloat => Cell::Complex(
            f64::from(endian::read_f32_be(bytes)),
            f64::from(endian::read_f32_be(&bytes[4..])),
        ),
        BinaryElementType::ComplexDouble => Cell::Complex(
            endian::read_f64_be(bytes),
            endian::read_f64_be(&bytes[8..]),
        ),
        // Bit and Char fields are decoded whole, not element-wise.
        BinaryElementType::Bit | BinaryElementType::Char => Cell::Int(i64::from(bytes[0])),
    }
}

/// Decode a fixed-width field of `repeat` elements into a `Cell`.
fn decode_field(bytes: &[u8], format: BinaryColumnFormat) -> Result<Cell> {
    let element = format.element;
    match element {
        BinaryElementType::Char => {
            let text = core::str::from_utf8(bytes)
                .map_err(|_| Error::Decode("non-ASCII bytes in character field"))?;
            Ok(Cell::Text(String::from(text.trim_end())))
        }
        BinaryElementType::Bit => {
            let mut bits = Vec::with_capacity(format.repeat);
            for i in 0..format.repeat {
                let byte = bytes[i / 8];
                bits.push(byte & (0x80 >> (i % 8)) != 0);
            }
            Ok(Cell::Bits(bits))
        }
        _ if format.repeat == 1 => Ok(decode_scalar(bytes, element)),
        _ => {
            let step = element.byte_len();
            let cells = (0..format.repeat)
                .map(|i| decode_scalar(&bytes[i * step..], element))
                .collect();
            Ok(Cell::Array(cells))
        }
    }
}

// ── Data unit ──

/// Lazily-paged binary table data unit.
#[derive(Debug)]
pub struct BinaryTable<R> {
    src: SharedSource<R>,
    pager: Mutex<RowPager>,
    columns: Vec<BinaryColumnDescriptor>,
    heap_start: u64,
}

impl<R: Read + Seek> BinaryTable<R> {
    pub(crate) fn new(src: SharedSource<R>, data_start: u64, header: &Header) -> Result<Self> {
        let naxis1 = header.require_int("NAXIS1")? as usize;
        let naxis2 = header.require_int("NAXIS2")? as usize;
        let tfields = header.require_int("TFIELDS")? as usize;
        let columns = parse_columns(header, tfields)?;

        let row_bytes: usize = columns.iter().map(|c| c.format.field_byte_len()).sum();
        if row_bytes > naxis1 {
            return Err(Error::validation(
                "NAXIS1",
                naxis1,
                "a row wide enough for every TFORMn field",
            ));
        }

        Ok(BinaryTable {
            src,
            pager: Mutex::new(RowPager::new(data_start, naxis1, naxis2)),
            columns,
            heap_start: data_start + (naxis1 as u64) * (naxis2 as u64),
        })
    }

    pub fn columns(&self) -> &[BinaryColumnDescriptor] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        crate::block::lock_source(&self.pager).num_rows()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.as_deref() == Some(name))
    }

    /// Number of row-window refills performed so far.
    pub fn refill_count(&self) -> usize {
        crate::block::lock_source(&self.pager).refill_count()
    }

    /// Read a variable-length array out of the heap area following the
    /// main data table.
    fn read_heap_array(
        &self,
        kind: HeapDescriptor,
        element: BinaryElementType,
        descriptor: &[u8],
    ) -> Result<Cell> {
        let (count, offset) = match kind {
            HeapDescriptor::P => (
                endian::read_i32_be(descriptor) as u32 as u64,
                endian::read_i32_be(&descriptor[4..]) as u32 as u64,
            ),
            HeapDescriptor::Q => (
                endian::read_i64_be(descriptor) as u64,
                endian::read_i64_be(&descriptor[8..]) as u64,
            ),
        };
        let byte_len = if element == BinaryElementType::Bit {
            (count as usize).div_ceil(8)
        } else {
            count as usize * element.byte_len()
        };
        let mut bytes = vec![0u8; byte_len];
        read_exact_at(&self.src, self.heap_start + offset, &mut bytes)?;
        decode_field(
            &bytes,
            BinaryColumnFormat {
                repeat: count as usize,
                element,
                heap: None,
            },
        )
    }

    fn decode_cell(&self, row_bytes: &[u8], descriptor: &BinaryColumnDescriptor) -> Result<Cell> {
        let format = descriptor.format;
        let end = descriptor.offset + format.field_byte_len();
        let field = row_bytes
            .get(descriptor.offset..end)
            .ok_or(Error::Decode("table field extends past the row"))?;
        match format.heap {
            Some(kind) => self.read_heap_array(kind, format.element, field),
            None => decode_field(field, format),
        }
    }

    /// Decode `count` consecutive rows starting at `start`.
    pub fn rows(&self, start: usize, count: usize) -> Result<Vec<Vec<Cell>>> {
        let mut rows = Vec::with_capacity(count);
        for r in start..start + count {
            // Heap reads also need the source lock, so copy the row out
            // before decoding.
            let bytes = {
                let mut pager = crate::block::lock_source(&self.pager);
                pager.row(&self.src, r)?.to_vec()
            };
            let mut cells = Vec::with_capacity(self.columns.len());
            for col in &self.columns {
                cells.push(self.decode_cell(&bytes, col)?);
            }
            rows.push(cells);
        }
        Ok(rows)
    }

    /// Decode a single cell.
    pub fn cell(&self, row: usize, col: usize) -> Result<Cell> {
        let descriptor = self
            .columns
            .get(col)
            .ok_or(Error::Decode("column index out of range"))?;
        let bytes = {
            let mut pager = crate::block::lock_source(&self.pager);
            pager.row(&self.src, row)?.to_vec()
        };
        self.decode_cell(&bytes, descriptor)
    }

    /// Decode one named column across every row.
    pub fn column(&self, name: &str) -> Result<Vec<Cell>> {
        let col = self
            .column_index(name)
            .ok_or(Error::Decode("unknown column name"))?;
        let n = self.num_rows();
        let mut out = Vec::with_capacity(n);
        for row in 0..n {
            out.push(self.cell(row, col)?);
        }
        Ok(out)
    }
}
