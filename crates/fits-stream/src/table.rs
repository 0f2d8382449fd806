//! ASCII table (XTENSION = 'TABLE') accessors.

use std::io::{Read, Seek};
use std::sync::Mutex;

use crate::block::SharedSource;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::tabular::{Cell, RowPager};

// ── Column Format ──

/// The format code for an ASCII table column, parsed from a TFORMn keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsciiColumnFormat {
    /// `Aw` -- character string, `w` characters wide.
    Character(usize),
    /// `Iw` -- integer, `w` characters wide.
    Integer(usize),
    /// `Fw.d` -- fixed-point decimal, `w` wide with `d` decimal places.
    FloatF(usize, usize),
    /// `Ew.d` -- single-precision exponential, `w` wide with `d` decimal places.
    FloatE(usize, usize),
    /// `Dw.d` -- double-precision exponential, `w` wide with `d` decimal places.
    DoubleE(usize, usize),
}

impl AsciiColumnFormat {
    /// Return the total width in bytes of a field with this format.
    pub fn width(&self) -> usize {
        match self {
            AsciiColumnFormat::Character(w)
            | AsciiColumnFormat::Integer(w)
            | AsciiColumnFormat::FloatF(w, _)
            | AsciiColumnFormat::FloatE(w, _)
            | AsciiColumnFormat::DoubleE(w, _) => *w,
        }
    }
}

/// Describes one column in an ASCII table extension: name, format, and the
/// 0-indexed byte position within the row (converted from 1-indexed TBCOLn).
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiColumnDescriptor {
    pub name: Option<String>,
    pub format: AsciiColumnFormat,
    pub tbcol: usize,
}

// ── TFORM Parsing ──

/// Parse a FITS ASCII-table TFORM string such as `"A20"`, `"I10"`, `"F12.4"`,
/// `"E15.7"`, or `"D25.17"`.
pub fn parse_tform_ascii(s: &str) -> Result<AsciiColumnFormat> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::validation("TFORM", s, "a non-empty format code"));
    }

    let code = s.as_bytes()[0];
    let rest = &s[1..];

    match code {
        b'A' => Ok(AsciiColumnFormat::Character(parse_usize(s, rest)?)),
        b'I' => Ok(AsciiColumnFormat::Integer(parse_usize(s, rest)?)),
        b'F' => {
            let (w, d) = parse_width_decimal(s, rest)?;
            Ok(AsciiColumnFormat::FloatF(w, d))
        }
        b'E' => {
            let (w, d) = parse_width_decimal(s, rest)?;
            Ok(AsciiColumnFormat::FloatE(w, d))
        }
        b'D' => {
            let (w, d) = parse_width_decimal(s, rest)?;
            Ok(AsciiColumnFormat::DoubleE(w, d))
        }
        _ => Err(Error::validation(
            "TFORM",
            s,
            "one of the A, I, F, E, D format codes",
        )),
    }
}

fn parse_usize(tform: &str, s: &str) -> Result<usize> {
    s.parse::<usize>()
        .map_err(|_| Error::validation("TFORM", tform, "an integer field width"))
}

fn parse_width_decimal(tform: &str, s: &str) -> Result<(usize, usize)> {
    let dot = s
        .find('.')
        .ok_or_else(|| Error::validation("TFORM", tform, "a w.d width specification"))?;
    let w = parse_usize(tform, &s[..dot])?;
    let d = parse_usize(tform, &s[dot + 1..])?;
    Ok((w, d))
}

/// Extract column descriptors from the header of an ASCII table extension.
///
/// Reads `TFORMn`, `TBCOLn`, and optionally `TTYPEn` for each column in
/// `1..=TFIELDS`.
fn parse_columns(header: &Header, tfields: usize) -> Result<Vec<AsciiColumnDescriptor>> {
    let mut columns = Vec::with_capacity(tfields);

    for i in 1..=tfields {
        let tform = header
            .get_str(&format!("TFORM{i}"))
            .ok_or(Error::MissingKeyword("TFORMn"))?;
        let format = parse_tform_ascii(tform)?;

        let tbcol = header
            .get_int(&format!("TBCOL{i}"))
            .ok_or(Error::MissingKeyword("TBCOLn"))?;
        if tbcol < 1 {
            return Err(Error::validation("TBCOL", tbcol, "a 1-indexed byte position"));
        }

        columns.push(AsciiColumnDescriptor {
            name: header.get_str(&format!("TTYPE{i}")).map(String::from),
            format,
            tbcol: (tbcol - 1) as usize,
        });
    }

    Ok(columns)
}

/// Decode one fixed-width ASCII field.
///
/// Blank numeric fields decode to 0 (integer) or NaN (float); malformed
/// text is an error.
fn parse_field(bytes: &[u8], format: &AsciiColumnFormat) -> Result<Cell> {
    let text = core::str::from_utf8(bytes)
        .map_err(|_| Error::Decode("non-ASCII bytes in table field"))?;
    let trimmed = text.trim();
    match format {
        AsciiColumnFormat::Character(_) => Ok(Cell::Text(String::from(trimmed))),
        AsciiColumnFormat::Integer(_) => {
            if trimmed.is_empty() {
                return Ok(Cell::Int(0));
            }
            trimmed
                .parse::<i64>()
                .map(Cell::Int)
                .map_err(|_| Error::Decode("malformed integer table field"))
        }
        AsciiColumnFormat::FloatF(..) | AsciiColumnFormat::FloatE(..) => {
            parse_float_field(trimmed)
        }
        AsciiColumnFormat::DoubleE(..) => parse_float_field(trimmed),
    }
}

fn parse_float_field(trimmed: &str) -> Result<Cell> {
    if trimmed.is_empty() {
        return Ok(Cell::Float(f64::NAN));
    }
    // FORTRAN D exponents appear in Dw.d fields.
    let normalized = trimmed.replace(['D', 'd'], "E");
    normalized
        .parse::<f64>()
        .map(Cell::Float)
        .map_err(|_| Error::Decode("malformed float table field"))
}

// ── Data unit ──

/// Lazily-paged ASCII table data unit.
#[derive(Debug)]
pub struct AsciiTable<R> {
    src: SharedSource<R>,
    pager: Mutex<RowPager>,
    columns: Vec<AsciiColumnDescriptor>,
}

impl<R: Read + Seek> AsciiTable<R> {
    pub(crate) fn new(src: SharedSource<R>, data_start: u64, header: &Header) -> Result<Self> {
        let naxis1 = header.require_int("NAXIS1")? as usize;
        let naxis2 = header.require_int("NAXIS2")? as usize;
        let tfields = header.require_int("TFIELDS")? as usize;
        let columns = parse_columns(header, tfields)?;
        Ok(AsciiTable {
            src,
            pager: Mutex::new(RowPager::new(data_start, naxis1, naxis2)),
            columns,
        })
    }

    #[cfg(test)]
    fn with_budget(
        src: SharedSource<R>,
        data_start: u64,
        header: &Header,
        budget: usize,
    ) -> Result<Self> {
        let mut table = Self::new(src, data_start, header)?;
        let (row_len, num_rows) = {
            let pager = table.pager.get_mut().unwrap();
            (pager.row_len(), pager.num_rows())
        };
        table.pager = Mutex::new(RowPager::with_budget(data_start, row_len, num_rows, budget));
        Ok(table)
    }

    pub fn columns(&self) -> &[AsciiColumnDescriptor] {
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

    fn decode_row(&self, row_bytes: &[u8]) -> Result<Vec<Cell>> {
        let mut cells = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            let end = col.tbcol + col.format.width();
            let field = row_bytes
                .get(col.tbcol..end)
                .ok_or(Error::Decode("table field extends past the row"))?;
            cells.push(parse_field(field, &col.format)?);
        }
        Ok(cells)
    }

    /// Decode `count` consecutive rows starting at `start`.
    pub fn rows(&self, start: usize, count: usize) -> Result<Vec<Vec<Cell>>> {
        let mut pager = crate::block::lock_source(&self.pager);
        let mut rows = Vec::with_capacity(count);
        for r in start..start + count {
            let bytes = pager.row(&self.src, r)?.to_vec();
            rows.push(self.decode_row(&bytes)?);
        }
        Ok(rows)
    }

    /// Decode a single cell.
    pub fn cell(&self, row: usize, col: usize) -> Result<Cell> {
        let descriptor = self
            .columns
            .get(col)
            .ok_or(Error::Decode("column index out of range"))?;
        let mut pager = crate::block::lock_source(&self.pager);
        let bytes = pager.row(&self.src, row)?;
        let end = descriptor.tbcol + descriptor.format.width();
        let field = bytes
            .get(descriptor.tbcol..end)
            .ok_or(Error::Decode("table field extends past the row"))?;
        parse_field(field, &descriptor.format)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BLOCK_SIZE, CARD_SIZE};
    use crate::header::HeaderParser;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    // ---- TFORM parsing ----

    #[test]
    fn parse_tform_codes() {
        assert_eq!(
            parse_tform_ascii("A20").unwrap(),
            AsciiColumnFormat::Character(20)
        );
        assert_eq!(
            parse_tform_ascii("I10").unwrap(),
            AsciiColumnFormat::Integer(10)
        );
        assert_eq!(
            parse_tform_ascii("F12.4").unwrap(),
            AsciiColumnFormat::FloatF(12, 4)
        );
        assert_eq!(
            parse_tform_ascii("E15.7").unwrap(),
            AsciiColumnFormat::FloatE(15, 7)
        );
        assert_eq!(
            parse_tform_ascii("D25.17").unwrap(),
            AsciiColumnFormat::DoubleE(25, 17)
        );
    }

    #[test]
    fn parse_tform_rejects_garbage() {
        assert!(parse_tform_ascii("").is_err());
        assert!(parse_tform_ascii("Q5").is_err());
        assert!(parse_tform_ascii("F12").is_err());
        assert!(parse_tform_ascii("Ixx").is_err());
    }

    // ---- field decoding ----

    #[test]
    fn field_decoding() {
        assert_eq!(
            parse_field(b"  NGC 1275  ", &AsciiColumnFormat::Character(12)).unwrap(),
            Cell::Text(String::from("NGC 1275"))
        );
        assert_eq!(
            parse_field(b"   -42", &AsciiColumnFormat::Integer(6)).unwrap(),
            Cell::Int(-42)
        );
        assert_eq!(
            parse_field(b"   3.25", &AsciiColumnFormat::FloatF(7, 2)).unwrap(),
            Cell::Float(3.25)
        );
        assert_eq!(
            parse_field(b" 1.5D+02", &AsciiColumnFormat::DoubleE(8, 1)).unwrap(),
            Cell::Float(150.0)
        );
    }

    #[test]
    fn blank_fields_are_lenient() {
        assert_eq!(
            parse_field(b"      ", &AsciiColumnFormat::Integer(6)).unwrap(),
            Cell::Int(0)
        );
        match parse_field(b"      ", &AsciiColumnFormat::FloatE(6, 2)).unwrap() {
            Cell::Float(f) => assert!(f.is_nan()),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn malformed_field_is_an_error() {
        assert!(parse_field(b"twelve", &AsciiColumnFormat::Integer(6)).is_err());
    }

    // ---- table fixture ----

    fn table_header(rows: usize) -> Header {
        let lines = [
            "XTENSION= 'TABLE   '".to_string(),
            "BITPIX  =                    8".to_string(),
            "NAXIS   =                    2".to_string(),
            "NAXIS1  =                   20".to_string(),
            format!("NAXIS2  =                 {rows:4}"),
            "PCOUNT  =                    0".to_string(),
            "GCOUNT  =                    1".to_string(),
            "TFIELDS =                    3".to_string(),
            "TTYPE1  = 'NAME    '".to_string(),
            "TFORM1  = 'A8      '".to_string(),
            "TBCOL1  =                    1".to_string(),
            "TTYPE2  = 'COUNT   '".to_string(),
            "TFORM2  = 'I5      '".to_string(),
            "TBCOL2  =                    9".to_string(),
            "TTYPE3  = 'MAG     '".to_string(),
            "TFORM3  = 'F7.2    '".to_string(),
            "TBCOL3  =                   14".to_string(),
        ];
        let mut block = [b' '; BLOCK_SIZE];
        let mut all: Vec<&str> = lines.iter().map(String::as_str).collect();
        all.push("END");
        for (i, line) in all.iter().enumerate() {
            block[i * CARD_SIZE..i * CARD_SIZE + line.len()].copy_from_slice(line.as_bytes());
        }
        let mut parser = HeaderParser::new(false);
        assert!(parser.feed_block(&block).unwrap());
        parser.finish().unwrap().0
    }

    fn table_bytes(rows: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for r in 0..rows {
            let line = format!("OBJ{r:<5}{:5}{:7.2}", r * 10, r as f64 * 0.5);
            assert_eq!(line.len(), 20, "row fixture width");
            data.extend_from_slice(line.as_bytes());
        }
        data
    }

    fn make_table(rows: usize) -> AsciiTable<Cursor<Vec<u8>>> {
        let src = Arc::new(Mutex::new(Cursor::new(table_bytes(rows))));
        AsciiTable::new(src, 0, &table_header(rows)).unwrap()
    }

    #[test]
    fn rows_decode_each_column() {
        let table = make_table(4);
        let rows = table.rows(1, 2).unwrap();
        assert_eq!(
            rows[0],
            vec![
                Cell::Text(String::from("OBJ1")),
                Cell::Int(10),
                Cell::Float(0.5)
            ]
        );
        assert_eq!(rows[1][1], Cell::Int(20));
    }

    #[test]
    fn column_lookup_by_name() {
        let table = make_table(3);
        assert_eq!(
            table.column("COUNT").unwrap(),
            vec![Cell::Int(0), Cell::Int(10), Cell::Int(20)]
        );
        assert!(table.column("NOPE").is_err());
    }

    #[test]
    fn cell_access() {
        let table = make_table(3);
        assert_eq!(table.cell(2, 0).unwrap(), Cell::Text(String::from("OBJ2")));
        assert!(table.cell(3, 0).is_err());
        assert!(table.cell(0, 9).is_err());
    }

    #[test]
    fn paged_reads_match_unpaged() {
        let rows = 40;
        let src = Arc::new(Mutex::new(Cursor::new(table_bytes(rows))));
        // Budget of 200 bytes = 10 rows per page.
        let paged =
            AsciiTable::with_budget(Arc::clone(&src), 0, &table_header(rows), 200).unwrap();
        let unpaged = make_table(rows);

        let a = paged.rows(0, 10).unwrap();
        let refills_after_first = paged.refill_count();
        let b = paged.rows(5, 10).unwrap();
        assert_eq!(paged.refill_count(), refills_after_first + 1);

        assert_eq!(a, unpaged.rows(0, 10).unwrap());
        assert_eq!(b, unpaged.rows(5, 10).unwrap());
    }
}
