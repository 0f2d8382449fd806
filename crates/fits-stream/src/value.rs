use std::str;

/// The typed value of a header card.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Logical(bool),
    Integer(i64),
    Float(f64),
    /// Quoted text, with the doubled-quote escape resolved and trailing
    /// padding removed.
    String(String),
}

impl Value {
    /// Numeric reading of the value, covering both integer and float cards.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub(crate) fn display_text(&self) -> String {
        match self {
            Value::Logical(flag) => String::from(if *flag { "T" } else { "F" }),
            Value::Integer(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
        }
    }
}

/// Cut an inline comment off a value field.
///
/// The separator is a space followed by a slash. A single space after the
/// slash belongs to the separator, not the comment; files written without
/// that space (`-32 /No. of bits`) are common enough to tolerate.
fn split_inline_comment(text: &str) -> (&str, Option<&str>) {
    match text.find(" /") {
        Some(pos) => {
            let tail = &text[pos + 2..];
            let comment = tail.strip_prefix(' ').unwrap_or(tail).trim_end();
            (&text[..pos], (!comment.is_empty()).then_some(comment))
        }
        None => (text, None),
    }
}

/// Parse a quoted value, `body` being everything after the opening quote.
///
/// A doubled quote stands for a literal one. A missing closing quote takes
/// the rest of the field as content rather than rejecting the card.
fn parse_quoted(body: &str) -> (Value, Option<&str>) {
    let mut content = String::new();
    let mut rest = body;
    let tail = loop {
        match rest.find('\'') {
            Some(pos) => {
                content.push_str(&rest[..pos]);
                let after = &rest[pos + 1..];
                if let Some(after_escape) = after.strip_prefix('\'') {
                    content.push('\'');
                    rest = after_escape;
                } else {
                    break after;
                }
            }
            None => {
                content.push_str(rest);
                break "";
            }
        }
    };
    // Strings are space-padded on the right inside the quotes.
    content.truncate(content.trim_end().len());
    let (_, comment) = split_inline_comment(tail);
    (Value::String(content), comment)
}

/// Parse the value field of a card (everything after the `= ` indicator).
///
/// Returns the value and the inline comment, or `None` when the field is
/// blank or not parseable as any value type.
pub fn parse_value(field: &[u8]) -> Option<(Value, Option<&str>)> {
    let text = str::from_utf8(field).ok()?;

    // A quote in the first column marks a string; the comment can only
    // start after the closing quote.
    if let Some(body) = text.strip_prefix('\'') {
        return Some(parse_quoted(body));
    }

    let (value_text, comment) = split_inline_comment(text);
    let value_text = value_text.trim();
    if value_text.is_empty() {
        return None;
    }

    match value_text {
        "T" => return Some((Value::Logical(true), comment)),
        "F" => return Some((Value::Logical(false), comment)),
        _ => {}
    }

    if let Ok(n) = value_text.parse::<i64>() {
        return Some((Value::Integer(n), comment));
    }

    // Floats may carry a Fortran-style D exponent.
    let float_text = value_text.replace(['D', 'd'], "E");
    if let Ok(f) = float_text.parse::<f64>() {
        return Some((Value::Float(f), comment));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(text: &str) -> Vec<u8> {
        let mut buf = text.as_bytes().to_vec();
        buf.resize(70, b' ');
        buf
    }

    fn float_of(value: Value) -> f64 {
        match value {
            Value::Float(f) => f,
            other => panic!("not a float: {other:?}"),
        }
    }

    #[test]
    fn logicals_parse_with_and_without_comment() {
        let buf = field("                   T");
        let (value, comment) = parse_value(&buf).unwrap();
        assert_eq!(value, Value::Logical(true));
        assert!(comment.is_none());

        let buf = field("                   F / conforms");
        let (value, comment) = parse_value(&buf).unwrap();
        assert_eq!(value, Value::Logical(false));
        assert_eq!(comment, Some("conforms"));
    }

    #[test]
    fn integers_keep_sign_and_width() {
        let (value, _) = parse_value(&field("                 -80")).unwrap();
        assert_eq!(value, Value::Integer(-80));

        let buf = field("                2880 / record size");
        let (value, comment) = parse_value(&buf).unwrap();
        assert_eq!(value, Value::Integer(2880));
        assert_eq!(comment, Some("record size"));

        let (value, _) = parse_value(&field("    1099511627776")).unwrap();
        assert_eq!(value, Value::Integer(1 << 40));
    }

    #[test]
    fn floats_cover_plain_and_exponent_forms() {
        let (value, _) = parse_value(&field("            273.15")).unwrap();
        assert!((float_of(value) - 273.15).abs() < 1e-12);

        let (value, _) = parse_value(&field("          6.022E+23")).unwrap();
        assert!((float_of(value) - 6.022e23).abs() < 1e10);

        let (value, _) = parse_value(&field("          -1.5D-04")).unwrap();
        assert!((float_of(value) + 1.5e-4).abs() < 1e-18);
    }

    #[test]
    fn a_bare_exponent_is_a_float_not_an_integer() {
        let (value, _) = parse_value(&field("                 2E3")).unwrap();
        assert_eq!(value, Value::Float(2000.0));
    }

    #[test]
    fn strings_drop_quote_padding() {
        let buf = field("'BINTABLE'");
        let (value, comment) = parse_value(&buf).unwrap();
        assert_eq!(value, Value::String("BINTABLE".into()));
        assert!(comment.is_none());

        let (value, _) = parse_value(&field("'NGC 253 '")).unwrap();
        assert_eq!(value, Value::String("NGC 253".into()));

        let (value, _) = parse_value(&field("'        '")).unwrap();
        assert_eq!(value, Value::String(String::new()));
    }

    #[test]
    fn doubled_quotes_become_literal_ones() {
        let (value, _) = parse_value(&field("'O''Brien '")).unwrap();
        assert_eq!(value, Value::String("O'Brien".into()));
    }

    #[test]
    fn unterminated_string_keeps_its_text() {
        let (value, comment) = parse_value(b"'half open").unwrap();
        assert_eq!(value, Value::String("half open".into()));
        assert!(comment.is_none());
    }

    #[test]
    fn string_comment_starts_after_the_closing_quote() {
        let buf = field("'RICE_1  '           / tile codec");
        let (value, comment) = parse_value(&buf).unwrap();
        assert_eq!(value, Value::String("RICE_1".into()));
        assert_eq!(comment, Some("tile codec"));
    }

    #[test]
    fn slash_inside_quotes_is_not_a_comment() {
        let buf = field("'km / s  '");
        let (value, comment) = parse_value(&buf).unwrap();
        assert_eq!(value, Value::String("km / s".into()));
        assert!(comment.is_none());
    }

    #[test]
    fn comment_may_hug_the_slash() {
        let buf = field("                 -32 /No. of bits");
        let (value, comment) = parse_value(&buf).unwrap();
        assert_eq!(value, Value::Integer(-32));
        assert_eq!(comment, Some("No. of bits"));
    }

    #[test]
    fn blank_fields_have_no_value() {
        assert!(parse_value(b"").is_none());
        assert!(parse_value(&field("")).is_none());
        assert!(parse_value(&field("       / only a comment")).is_none());
    }

    #[test]
    fn numeric_accessors() {
        assert_eq!(Value::Integer(12).as_f64(), Some(12.0));
        assert_eq!(Value::Float(0.25).as_f64(), Some(0.25));
        assert_eq!(Value::String("12".into()).as_f64(), None);
        assert_eq!(Value::Integer(12).as_i64(), Some(12));
        assert_eq!(Value::Float(0.25).as_i64(), None);
    }

    #[test]
    fn display_text_round_trips_each_kind() {
        assert_eq!(Value::Logical(true).display_text(), "T");
        assert_eq!(Value::Integer(-512).display_text(), "-512");
        assert_eq!(Value::Float(2.5).display_text(), "2.5");
        assert_eq!(Value::String("GCOUNT".into()).display_text(), "GCOUNT");
    }
}
