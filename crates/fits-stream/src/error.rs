/// All errors that can occur while parsing a FITS stream.
#[derive(Debug)]
pub enum Error {
    /// A header card failed a fatal keyword validation.
    Validation {
        /// Keyword on the offending card.
        keyword: String,
        /// Observed value, rendered as text.
        value: String,
        /// What the validator would have accepted.
        expected: &'static str,
    },
    /// A recognized but unimplemented format feature (e.g. a non-Rice
    /// ZCMPTYPE, or an unknown XTENSION type).
    UnsupportedFormat(String),
    /// The stream ended inside a block, header or data segment.
    TruncatedStream {
        /// Byte offset at which the read started.
        offset: u64,
        /// Bytes still needed to complete it.
        needed: usize,
    },
    /// A compressed tile or table cell could not be decoded.
    Decode(&'static str),
    /// A required keyword was not found in the header.
    MissingKeyword(&'static str),
    /// An I/O error from the underlying source.
    Io(std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Validation {
                keyword,
                value,
                expected,
            } => write!(f, "invalid {keyword} value {value}: expected {expected}"),
            Error::UnsupportedFormat(what) => write!(f, "unsupported format: {what}"),
            Error::TruncatedStream { offset, needed } => {
                write!(f, "stream truncated at byte {offset}: {needed} more bytes needed")
            }
            Error::Decode(msg) => write!(f, "decode error: {msg}"),
            Error::MissingKeyword(kw) => write!(f, "missing required keyword: {kw}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl Error {
    pub(crate) fn validation(
        keyword: impl Into<String>,
        value: impl core::fmt::Display,
        expected: &'static str,
    ) -> Self {
        Error::Validation {
            keyword: keyword.into(),
            value: value.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_validation() {
        let e = Error::validation("BITPIX", 24, "one of 8, 16, 32, -32, -64");
        assert_eq!(
            e.to_string(),
            "invalid BITPIX value 24: expected one of 8, 16, 32, -32, -64"
        );
    }

    #[test]
    fn display_unsupported_format() {
        let e = Error::UnsupportedFormat("ZCMPTYPE PLIO_1".into());
        assert_eq!(e.to_string(), "unsupported format: ZCMPTYPE PLIO_1");
    }

    #[test]
    fn display_truncated_stream() {
        let e = Error::TruncatedStream {
            offset: 2880,
            needed: 1440,
        };
        assert_eq!(
            e.to_string(),
            "stream truncated at byte 2880: 1440 more bytes needed"
        );
    }

    #[test]
    fn display_decode() {
        let e = Error::Decode("rice stream exhausted");
        assert_eq!(e.to_string(), "decode error: rice stream exhausted");
    }

    #[test]
    fn display_missing_keyword() {
        let e = Error::MissingKeyword("NAXIS");
        assert_eq!(e.to_string(), "missing required keyword: NAXIS");
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = Error::Io(io_err);
        assert_eq!(e.to_string(), "I/O error: file not found");
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::other("oops");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn std_error_source() {
        use std::error::Error as StdError;

        let e = Error::Decode("bad tile");
        assert!(e.source().is_none());

        let io_err = std::io::Error::other("inner");
        let e = Error::Io(io_err);
        assert!(e.source().is_some());
    }

    #[test]
    fn debug_formatting() {
        let e = Error::validation("SIMPLE", "X", "a logical value");
        let debug = format!("{e:?}");
        assert!(debug.contains("Validation"));
        assert!(debug.contains("SIMPLE"));
    }
}
