//! HDU assembly: header parsing, data-unit dispatch, and the top-level
//! `parse` entry points.

use std::io::{Cursor, Read, Seek};
use std::sync::{Arc, Mutex};

use crate::bintable::BinaryTable;
use crate::block::{padded_byte_len, BlockReader, SharedSource, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::header::{Header, HeaderParser, Warning};
use crate::image::Image;
use crate::table::AsciiTable;
use crate::tiled::CompressedImage;

/// The decoded data segment of an HDU.
#[derive(Debug)]
pub enum DataUnit<R> {
    Image(Image<R>),
    AsciiTable(AsciiTable<R>),
    BinaryTable(BinaryTable<R>),
    CompressedImage(CompressedImage<R>),
}

/// One header-data unit: the parsed header plus a lazy view of its data
/// segment.
#[derive(Debug)]
pub struct Hdu<R> {
    pub header: Header,
    pub data: Option<DataUnit<R>>,
    pub header_start: u64,
    pub data_start: u64,
    pub data_len: u64,
}

impl<R> Hdu<R> {
    /// Trimmed EXTNAME value, if the header carries one.
    pub fn name(&self) -> Option<&str> {
        self.header.get_str("EXTNAME").map(str::trim)
    }
}

/// A parsed FITS stream.
///
/// Parsing keeps going after the primary HDU even when a later extension
/// is malformed: the good HDUs are retained and the failure is stored in
/// `terminal`.
#[derive(Debug)]
pub struct Document<R> {
    pub hdus: Vec<Hdu<R>>,
    pub warnings: Vec<Warning>,
    pub terminal: Option<Error>,
}

impl<R> Document<R> {
    /// The primary HDU. A `Document` produced by [`parse`] always holds
    /// at least one HDU, since an empty stream is a parse error.
    pub fn primary(&self) -> &Hdu<R> {
        &self.hdus[0]
    }

    pub fn get(&self, index: usize) -> Option<&Hdu<R>> {
        self.hdus.get(index)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Hdu<R>> {
        self.hdus.iter().find(|h| h.name() == Some(name.trim()))
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Hdu<R>> {
        self.hdus.iter()
    }

    pub fn len(&self) -> usize {
        self.hdus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hdus.is_empty()
    }
}

impl<'a, R> IntoIterator for &'a Document<R> {
    type Item = &'a Hdu<R>;
    type IntoIter = core::slice::Iter<'a, Hdu<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.hdus.iter()
    }
}

/// Byte length of the data segment that follows a header, before block
/// padding.
pub(crate) fn data_byte_len(header: &Header) -> Result<u64> {
    let naxes = header.naxes()?;
    if naxes.is_empty() {
        return Ok(0);
    }
    let bitpix = header.require_int("BITPIX")?;
    let mut pixels = 1u64;
    for &n in &naxes {
        pixels = pixels
            .checked_mul(n)
            .ok_or_else(|| Error::validation("NAXISn", n, "axis sizes with a 64-bit product"))?;
    }
    let bytes = pixels
        .checked_mul(bitpix.unsigned_abs() / 8)
        .ok_or_else(|| Error::validation("BITPIX", bitpix, "a data segment within 64 bits"))?;
    let pcount = header.get_int("PCOUNT").unwrap_or(0).max(0) as u64;
    bytes
        .checked_add(pcount)
        .ok_or_else(|| Error::validation("PCOUNT", pcount, "a data segment within 64 bits"))
}

fn dispatch<R: Read + Seek>(
    src: &SharedSource<R>,
    header: &Header,
    data_start: u64,
) -> Result<Option<DataUnit<R>>> {
    match header.extension_type().map(str::trim) {
        None | Some("IMAGE") => {
            let naxes = header.naxes()?;
            if naxes.is_empty() || naxes.iter().product::<u64>() == 0 {
                Ok(None)
            } else {
                Ok(Some(DataUnit::Image(Image::new(
                    Arc::clone(src),
                    data_start,
                    header,
                )?)))
            }
        }
        Some("TABLE") => Ok(Some(DataUnit::AsciiTable(AsciiTable::new(
            Arc::clone(src),
            data_start,
            header,
        )?))),
        Some("BINTABLE") => {
            if header.get_logical("ZIMAGE") == Some(true) {
                Ok(Some(DataUnit::CompressedImage(CompressedImage::new(
                    Arc::clone(src),
                    data_start,
                    header,
                )?)))
            } else {
                Ok(Some(DataUnit::BinaryTable(BinaryTable::new(
                    Arc::clone(src),
                    data_start,
                    header,
                )?)))
            }
        }
        Some(other) => Err(Error::UnsupportedFormat(format!("{other} extension"))),
    }
}

/// Parse one HDU starting at the reader's current block. `Ok(None)` means
/// the stream ended cleanly before any header byte.
fn parse_one_hdu<R: Read + Seek>(
    src: &SharedSource<R>,
    reader: &mut BlockReader<R>,
    primary: bool,
    warnings: &mut Vec<Warning>,
) -> Result<Option<Hdu<R>>> {
    let header_start = reader.offset();
    let mut parser = HeaderParser::new(primary);
    let mut saw_block = false;
    while !parser.is_done() {
        match reader.next_block()? {
            Some(block) => {
                saw_block = true;
                parser.feed_block(&block)?;
            }
            None if !saw_block => return Ok(None),
            None => {
                return Err(Error::TruncatedStream {
                    offset: reader.offset(),
                    needed: BLOCK_SIZE,
                })
            }
        }
    }

    let (header, header_warnings) = parser.finish()?;
    warnings.extend(header_warnings);

    let data_start = reader.offset();
    let data_len = data_byte_len(&header)?;
    let data = dispatch(src, &header, data_start)?;
    reader.seek_to(data_start + padded_byte_len(data_len));

    Ok(Some(Hdu {
        header,
        data,
        header_start,
        data_start,
        data_len,
    }))
}

/// Parse a FITS stream from any seekable source.
///
/// A malformed primary HDU fails outright. A malformed later extension
/// ends parsing early: the HDUs read so far come back in the `Document`
/// with the failure in its `terminal` field.
pub fn parse<R: Read + Seek>(source: R) -> Result<Document<R>> {
    let src: SharedSource<R> = Arc::new(Mutex::new(source));
    let mut reader = BlockReader::new(Arc::clone(&src));
    let mut hdus = Vec::new();
    let mut warnings = Vec::new();
    let mut terminal = None;

    loop {
        match parse_one_hdu(&src, &mut reader, hdus.is_empty(), &mut warnings) {
            Ok(Some(hdu)) => hdus.push(hdu),
            // A stream that ends before a single header block is not FITS.
            Ok(None) if hdus.is_empty() => {
                return Err(Error::TruncatedStream {
                    offset: 0,
                    needed: BLOCK_SIZE,
                })
            }
            Ok(None) => break,
            Err(e) if hdus.is_empty() => return Err(e),
            Err(e) => {
                terminal = Some(e);
                break;
            }
        }
    }

    Ok(Document {
        hdus,
        warnings,
        terminal,
    })
}

/// Parse an in-memory FITS buffer.
pub fn parse_bytes(bytes: &[u8]) -> Result<Document<Cursor<&[u8]>>> {
    parse(Cursor::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::CARD_SIZE;
    use crate::header::HeaderParser;

    fn header_block(cards: &[&str]) -> Vec<u8> {
        let mut block = vec![b' '; BLOCK_SIZE];
        let mut all = cards.to_vec();
        all.push("END");
        assert!(all.len() <= 36);
        for (i, line) in all.iter().enumerate() {
            block[i * CARD_SIZE..i * CARD_SIZE + line.len()].copy_from_slice(line.as_bytes());
        }
        block
    }

    fn pad_to_block(data: &mut Vec<u8>) {
        while data.len() % BLOCK_SIZE != 0 {
            data.push(0);
        }
    }

    fn primary_cards(bitpix: i64, naxes: &[u64]) -> Vec<String> {
        let mut cards = vec![
            "SIMPLE  =                    T".to_string(),
            format!("BITPIX  =                 {bitpix:4}"),
            format!("NAXIS   =                 {:4}", naxes.len()),
        ];
        for (i, n) in naxes.iter().enumerate() {
            cards.push(format!("NAXIS{:<3}=                 {n:4}", i + 1));
        }
        cards
    }

    fn primary_image(bitpix: i64, naxes: &[u64], pixels: &[u8]) -> Vec<u8> {
        let cards = primary_cards(bitpix, naxes);
        let refs: Vec<&str> = cards.iter().map(String::as_str).collect();
        let mut buf = header_block(&refs);
        buf.extend_from_slice(pixels);
        pad_to_block(&mut buf);
        buf
    }

    #[test]
    fn headerless_primary_has_no_data_unit() {
        let buf = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
        ]);
        let doc = parse_bytes(&buf).unwrap();
        assert_eq!(doc.len(), 1);
        assert!(doc.primary().data.is_none());
        assert_eq!(doc.primary().data_len, 0);
        assert!(doc.terminal.is_none());
    }

    #[test]
    fn primary_image_dispatches() {
        let pixels: Vec<u8> = [1i16, 2, 3, 4]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let buf = primary_image(16, &[2, 2], &pixels);
        let doc = parse_bytes(&buf).unwrap();
        let hdu = doc.primary();
        assert_eq!(hdu.data_len, 8);
        assert_eq!(hdu.data_start, BLOCK_SIZE as u64);
        match &hdu.data {
            Some(DataUnit::Image(image)) => {
                let frame = image.frame(0).unwrap();
                assert_eq!(
                    (0..4).map(|i| frame.get_f64(i)).collect::<Vec<_>>(),
                    vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
                );
            }
            other => panic!("expected image data, got {other:?}"),
        }
    }

    #[test]
    fn data_byte_len_includes_pcount() {
        let buf = header_block(&[
            "XTENSION= 'BINTABLE'",
            "BITPIX  =                    8",
            "NAXIS   =                    2",
            "NAXIS1  =                   10",
            "NAXIS2  =                    3",
            "PCOUNT  =                    7",
            "GCOUNT  =                    1",
            "TFIELDS =                    1",
            "TFORM1  = '10A     '",
        ]);
        let mut parser = HeaderParser::new(false);
        let block: &[u8; BLOCK_SIZE] = buf.as_slice().try_into().unwrap();
        parser.feed_block(block).unwrap();
        let header = parser.finish().unwrap().0;
        assert_eq!(data_byte_len(&header).unwrap(), 37);
    }

    #[test]
    fn unknown_extension_type_is_unsupported() {
        let mut buf = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
        ]);
        buf.extend(header_block(&[
            "XTENSION= 'FOREIGN '",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
        ]));
        let doc = parse_bytes(&buf).unwrap();
        assert_eq!(doc.len(), 1);
        assert!(matches!(doc.terminal, Some(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn empty_source_is_truncated() {
        let err = parse_bytes(&[]).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedStream {
                offset: 0,
                needed: BLOCK_SIZE
            }
        ));
    }

    #[test]
    fn malformed_primary_fails_outright() {
        let buf = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                   24",
            "NAXIS   =                    0",
        ]);
        assert!(matches!(
            parse_bytes(&buf),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn truncated_extension_keeps_earlier_hdus() {
        let mut buf = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
        ]);
        // A second header block cut off mid-block.
        let second = header_block(&[
            "XTENSION= 'IMAGE   '",
            "BITPIX  =                    8",
        ]);
        buf.extend_from_slice(&second[..100]);
        let doc = parse_bytes(&buf).unwrap();
        assert_eq!(doc.len(), 1);
        assert!(matches!(
            doc.terminal,
            Some(Error::TruncatedStream { .. })
        ));
    }

    #[test]
    fn find_by_name_matches_trimmed_extname() {
        let mut buf = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
        ]);
        buf.extend(header_block(&[
            "XTENSION= 'IMAGE   '",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
            "EXTNAME = 'EVENTS  '",
        ]));
        let doc = parse_bytes(&buf).unwrap();
        assert_eq!(doc.len(), 2);
        assert!(doc.find_by_name("EVENTS").is_some());
        assert!(doc.find_by_name("MISSING").is_none());
        assert_eq!(doc.get(1).unwrap().name(), Some("EVENTS"));
    }

    #[test]
    fn multiple_hdus_advance_past_padded_data() {
        let pixels = [0u8; 4];
        let mut buf = primary_image(8, &[2, 2], &pixels);
        buf.extend(header_block(&[
            "XTENSION= 'IMAGE   '",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
        ]));
        let doc = parse_bytes(&buf).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get(1).unwrap().header_start, 2 * BLOCK_SIZE as u64);
        assert!(doc.terminal.is_none());
    }
}
