//! FITS header card parsing and keyword validation.

use core::str;

use crate::block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
use crate::error::{Error, Result};
use crate::value::{parse_value, Value};

// ── Types ──

/// A parsed FITS header card (one 80-byte keyword record).
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// The 8-byte keyword name, ASCII, left-justified, space-padded.
    pub keyword: [u8; 8],
    /// The parsed value, if this card has a value indicator (`= ` in bytes 8..10).
    pub value: Option<Value>,
    /// An optional comment string.
    pub comment: Option<String>,
}

impl Card {
    /// Return the keyword as a trimmed UTF-8 string.
    pub fn keyword_str(&self) -> &str {
        let end = self
            .keyword
            .iter()
            .rposition(|&b| b != b' ')
            .map(|i| i + 1)
            .unwrap_or(0);
        str::from_utf8(&self.keyword[..end]).unwrap_or("")
    }

    /// Returns `true` if this card is the END keyword.
    pub fn is_end(&self) -> bool {
        &self.keyword == b"END     "
    }

    /// Returns `true` if this is a blank card (keyword is all spaces).
    pub fn is_blank(&self) -> bool {
        self.keyword.iter().all(|&b| b == b' ')
    }

    /// Returns `true` if this card carries a commentary keyword
    /// (COMMENT, HISTORY, or blank).
    pub fn is_commentary(&self) -> bool {
        let kw = self.keyword_str();
        kw == "COMMENT" || kw == "HISTORY" || self.is_blank()
    }
}

/// A non-fatal finding raised while validating header cards.
///
/// Warnings accumulate on the document rather than aborting the parse:
/// positional slips and mild standard violations are common in files that
/// are otherwise perfectly readable.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    /// Keyword of the card that triggered the finding.
    pub keyword: String,
    /// Card index within its header.
    pub card_index: usize,
    /// Human-readable description.
    pub message: String,
}

/// A complete parsed header: the ordered card list plus typed lookups.
///
/// Lookups return the first occurrence of a keyword; later duplicates do not
/// displace it.
#[derive(Debug, Clone, Default)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn get(&self, name: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.keyword_str() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(|c| c.value.as_ref())
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.value(name) {
            Some(Value::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(Value::as_f64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.value(name) {
            Some(Value::String(s)) => Some(s.trim()),
            _ => None,
        }
    }

    pub fn get_logical(&self, name: &str) -> Option<bool> {
        match self.value(name) {
            Some(Value::Logical(b)) => Some(*b),
            _ => None,
        }
    }

    /// Required integer lookup, used for the mandatory geometry keywords.
    pub(crate) fn require_int(&self, name: &'static str) -> Result<i64> {
        self.get_int(name).ok_or(Error::MissingKeyword(name))
    }

    /// Trimmed XTENSION value, `None` for a primary header.
    pub fn extension_type(&self) -> Option<&str> {
        self.get_str("XTENSION")
    }

    pub fn is_primary(&self) -> bool {
        self.contains("SIMPLE")
    }

    /// The NAXIS1..NAXISn axis lengths, in keyword order.
    pub fn naxes(&self) -> Result<Vec<u64>> {
        let naxis = self.require_int("NAXIS")?;
        let mut axes = Vec::with_capacity(naxis as usize);
        for i in 1..=naxis {
            let name = format!("NAXIS{i}");
            let len = match self.value(&name) {
                Some(Value::Integer(n)) if *n >= 0 => *n as u64,
                Some(v) => {
                    return Err(Error::validation(
                        name,
                        v.display_text(),
                        "a non-negative integer axis length",
                    ))
                }
                None => return Err(Error::MissingKeyword("NAXISn")),
            };
            axes.push(len);
        }
        Ok(axes)
    }
}

// ── Parsing ──

/// Keywords that never carry a value indicator. Their bytes 8..80 are free-form text.
const COMMENTARY_KEYWORDS: [&[u8; 8]; 3] = [b"COMMENT ", b"HISTORY ", b"        "];

fn is_commentary_keyword(keyword: &[u8; 8]) -> bool {
    COMMENTARY_KEYWORDS.contains(&keyword)
}

/// Parse a single 80-byte FITS header card.
pub fn parse_card(card_bytes: &[u8; CARD_SIZE]) -> Result<Card> {
    let mut keyword = [b' '; 8];
    keyword.copy_from_slice(&card_bytes[..8]);

    for &b in &keyword {
        match b {
            b'A'..=b'Z' | b'0'..=b'9' | b' ' | b'-' | b'_' => {}
            _ => {
                return Err(Error::validation(
                    String::from_utf8_lossy(&keyword).into_owned(),
                    format!("byte 0x{b:02X}"),
                    "keyword characters A-Z, 0-9, '-', '_'",
                ))
            }
        }
    }

    if &keyword == b"END     " {
        return Ok(Card {
            keyword,
            value: None,
            comment: None,
        });
    }

    if is_commentary_keyword(&keyword) {
        return Ok(Card {
            keyword,
            value: None,
            comment: trailing_text(&card_bytes[8..]),
        });
    }

    if card_bytes[8] == b'=' && card_bytes[9] == b' ' {
        let value_field = &card_bytes[10..CARD_SIZE];
        match parse_value(value_field) {
            Some((val, comment)) => Ok(Card {
                keyword,
                value: Some(val),
                comment: comment.map(String::from),
            }),
            None => Ok(Card {
                keyword,
                value: None,
                comment: trailing_text(value_field),
            }),
        }
    } else {
        Ok(Card {
            keyword,
            value: None,
            comment: trailing_text(&card_bytes[8..]),
        })
    }
}

fn trailing_text(bytes: &[u8]) -> Option<String> {
    let text = str::from_utf8(bytes).ok()?.trim_end();
    if text.is_empty() {
        None
    } else {
        Some(String::from(text))
    }
}

/// Base keyword with trailing digits stripped, and whether digits were
/// present (`NAXIS3` → `("NAXIS", true)`). Indexed forms share the base
/// keyword's validator but skip its positional check.
fn base_keyword(kw: &str) -> (&str, bool) {
    let end = kw
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    (&kw[..end], end < kw.len())
}

// ── Incremental header parsing with validation ──

const BITPIX_VALUES: [i64; 5] = [8, 16, 32, -32, -64];
const ZBITPIX_VALUES: [i64; 6] = [8, 16, 32, 64, -32, -64];
const ZCMPTYPE_VALUES: [&str; 4] = ["GZIP_1", "RICE_1", "PLIO_1", "HCOMPRESS_1"];

/// Incremental header parser: fed one 2880-byte block at a time until the
/// END card appears, validating each card as it is appended.
///
/// Fatal validations abort the parse with [`Error::Validation`] or
/// [`Error::UnsupportedFormat`]; everything else is recorded as a
/// [`Warning`].
pub struct HeaderParser {
    cards: Vec<Card>,
    warnings: Vec<Warning>,
    primary: bool,
    done: bool,
    // Context accumulated for later positional and cross-keyword checks.
    naxis: Option<i64>,
    bitpix: Option<i64>,
    xtension: Option<String>,
}

impl HeaderParser {
    pub fn new(primary: bool) -> Self {
        HeaderParser {
            cards: Vec::new(),
            warnings: Vec::new(),
            primary,
            done: false,
            naxis: None,
            bitpix: None,
            xtension: None,
        }
    }

    /// Feed the next header block. Returns `true` once END has been seen;
    /// any cards after END in the final block are padding and are ignored.
    pub fn feed_block(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<bool> {
        for card_idx in 0..CARDS_PER_BLOCK {
            let start = card_idx * CARD_SIZE;
            let card_bytes: &[u8; CARD_SIZE] = block[start..start + CARD_SIZE]
                .try_into()
                .map_err(|_| Error::Decode("header block slice"))?;
            let card = parse_card(card_bytes)?;
            if card.is_end() {
                self.done = true;
                return Ok(true);
            }
            if !card.is_commentary() {
                let index = self.cards.len();
                self.validate_card(&card, index)?;
            }
            self.cards.push(card);
        }
        Ok(false)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Finish the header: check the mandatory keywords are present and hand
    /// back the cards plus accumulated warnings.
    pub fn finish(self) -> Result<(Header, Vec<Warning>)> {
        if self.primary {
            if !self.cards.iter().any(|c| c.keyword_str() == "SIMPLE") {
                return Err(Error::MissingKeyword("SIMPLE"));
            }
        } else if !self.cards.iter().any(|c| c.keyword_str() == "XTENSION") {
            return Err(Error::MissingKeyword("XTENSION"));
        }
        if self.bitpix.is_none() {
            return Err(Error::MissingKeyword("BITPIX"));
        }
        if self.naxis.is_none() {
            return Err(Error::MissingKeyword("NAXIS"));
        }
        Ok((Header { cards: self.cards }, self.warnings))
    }

    fn warn(&mut self, keyword: &str, card_index: usize, message: String) {
        self.warnings.push(Warning {
            keyword: String::from(keyword),
            card_index,
            message,
        });
    }

    fn check_position(&mut self, keyword: &str, card_index: usize, expected: usize) {
        if card_index != expected {
            self.warn(
                keyword,
                card_index,
                format!("found at card index {card_index}, expected {expected}"),
            );
        }
    }

    fn validate_card(&mut self, card: &Card, index: usize) -> Result<()> {
        let kw_owned = String::from(card.keyword_str());
        let kw = kw_owned.as_str();
        let (base, indexed) = base_keyword(kw);

        match base {
            "SIMPLE" if !indexed => {
                self.check_position(kw, index, 0);
                match card.value {
                    Some(Value::Logical(true)) => {}
                    Some(Value::Logical(false)) => {
                        self.warn(kw, index, String::from("file does not conform to the standard"));
                    }
                    _ => {
                        return Err(Error::validation(
                            kw,
                            card_value_text(card),
                            "a logical value",
                        ))
                    }
                }
            }
            "XTENSION" => {
                self.check_position(kw, index, 0);
                match &card.value {
                    Some(Value::String(s)) => self.xtension = Some(String::from(s.trim())),
                    _ => {
                        return Err(Error::validation(
                            kw,
                            card_value_text(card),
                            "a string value",
                        ))
                    }
                }
            }
            "BITPIX" if !indexed => {
                self.check_position(kw, index, 1);
                match card.value {
                    Some(Value::Integer(n)) if BITPIX_VALUES.contains(&n) => {
                        self.bitpix = Some(n);
                    }
                    _ => {
                        return Err(Error::validation(
                            kw,
                            card_value_text(card),
                            "one of 8, 16, 32, -32, -64",
                        ))
                    }
                }
            }
            "NAXIS" => {
                let n = match card.value {
                    Some(Value::Integer(n)) => n,
                    _ => {
                        return Err(Error::validation(
                            kw,
                            card_value_text(card),
                            "an integer value",
                        ))
                    }
                };
                if indexed {
                    if n < 0 {
                        return Err(Error::validation(
                            kw,
                            n,
                            "a non-negative axis length",
                        ));
                    }
                } else {
                    self.check_position(kw, index, 2);
                    if !(0..=999).contains(&n) {
                        return Err(Error::validation(kw, n, "an integer in 0..=999"));
                    }
                    if let Some(ext) = self.xtension.as_deref() {
                        if (ext == "TABLE" || ext == "BINTABLE") && n != 2 {
                            return Err(Error::validation(kw, n, "2 for a table extension"));
                        }
                    }
                    self.naxis = Some(n);
                }
            }
            "PCOUNT" | "GCOUNT" if !indexed => {
                if let Some(naxis) = self.naxis {
                    let expected = if base == "PCOUNT" { 3 } else { 4 } + naxis as usize;
                    self.check_position(kw, index, expected);
                }
                if !matches!(card.value, Some(Value::Integer(_))) {
                    return Err(Error::validation(
                        kw,
                        card_value_text(card),
                        "an integer value",
                    ));
                }
            }
            "EXTEND" if !indexed => {
                if !self.primary {
                    return Err(Error::validation(
                        kw,
                        card_value_text(card),
                        "EXTEND only in the primary header",
                    ));
                }
            }
            "BLANK" if !indexed => match card.value {
                Some(Value::Integer(_)) => {
                    if matches!(self.bitpix, Some(b) if b < 0) {
                        self.warn(
                            kw,
                            index,
                            String::from("BLANK is meaningless with a floating-point BITPIX"),
                        );
                    }
                }
                _ => {
                    self.warn(kw, index, String::from("BLANK value is not an integer"));
                }
            },
            "ZCMPTYPE" if !indexed => {
                let name = match &card.value {
                    Some(Value::String(s)) => s.trim(),
                    _ => {
                        return Err(Error::validation(
                            kw,
                            card_value_text(card),
                            "a string value",
                        ))
                    }
                };
                if !ZCMPTYPE_VALUES.contains(&name) {
                    return Err(Error::validation(
                        kw,
                        name,
                        "one of GZIP_1, RICE_1, PLIO_1, HCOMPRESS_1",
                    ));
                }
                if name != "RICE_1" {
                    return Err(Error::UnsupportedFormat(format!("ZCMPTYPE {name}")));
                }
            }
            "ZBITPIX" if !indexed => match card.value {
                Some(Value::Integer(n)) if ZBITPIX_VALUES.contains(&n) => {}
                _ => {
                    return Err(Error::validation(
                        kw,
                        card_value_text(card),
                        "one of 8, 16, 32, 64, -32, -64",
                    ))
                }
            },
            _ => {}
        }
        Ok(())
    }
}

fn card_value_text(card: &Card) -> String {
    card.value
        .as_ref()
        .map(Value::display_text)
        .unwrap_or_else(|| String::from("(none)"))
}
