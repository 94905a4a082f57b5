//! Central error type for compression and decompression.
//!
//! Variants fall into four groups: grammar rejection (the document does not
//! fit the automaton), format errors (the compressed input is malformed),
//! configuration errors and I/O errors.

use core::fmt;
use std::borrow::Cow;

/// All errors raised by the compressor, the decompressor and their streams.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // --- Grammar rejection ---
    /// An element, attribute or text token matched no transition.
    Rejected {
        /// What was found, e.g. `<title>`.
        found: Cow<'static, str>,
        /// Expected alternatives; empty when unknown.
        expected: Cow<'static, str>,
    },
    /// Non-whitespace text where the grammar allows no text.
    UnexpectedText(Cow<'static, str>),
    /// An attribute that no transition of the element accounted for.
    UnexpectedAttribute(Cow<'static, str>),
    /// End of element (or document) while required content is missing.
    IncompleteElement(Cow<'static, str>),
    /// Interleave and list alphabets are not handled by this codec.
    UnsupportedAlphabet(&'static str),

    // --- Format errors ---
    /// The multiplexed stream or the settings record carries a wrong magic number.
    BadMagic,
    /// A block header announced more payload bytes than the stream holds.
    TruncatedBlock { expected: usize },
    /// A block header is malformed (length or stream id out of range).
    InvalidBlockHeader,
    /// A decoded choice is outside the choice point's range.
    InvalidChoice { choice: u64, limit: u32 },
    /// The stream ended before a complete value was read.
    PrematureEndOfStream,
    /// The settings record is malformed.
    InvalidSettings,
    /// The settings record names an unknown coder or compressor index.
    UnknownCoding(u8),
    /// The schema checksum stored in the stream differs from the schema in use.
    ChecksumMismatch { stored: u64, actual: u64 },
    /// The data channel holds an invalid string.
    MalformedContent(Cow<'static, str>),

    // --- Configuration errors ---
    /// Unknown choice coder name.
    UnknownBitCoder(String),
    /// Unknown channel compressor name.
    UnknownCompressor(String),
    /// The automaton description is inconsistent or unreadable.
    InvalidAutomaton(Cow<'static, str>),
    /// No schema was supplied.
    MissingSchema,

    // --- I/O ---
    /// An I/O operation failed.
    IoError(String),
    /// The XML input is not well-formed.
    XmlParseError(String),
    /// A channel compressor failed.
    CompressionError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { found, expected } => {
                if expected.is_empty() {
                    write!(f, "not expecting {found}")
                } else {
                    write!(f, "expecting {expected}, saw {found}")
                }
            }
            Self::UnexpectedText(text) => write!(f, "not expecting text \"{text}\""),
            Self::UnexpectedAttribute(name) => write!(f, "not expecting attribute @{name}"),
            Self::IncompleteElement(state) => {
                if state.is_empty() {
                    write!(f, "premature end of element")
                } else {
                    write!(f, "premature end of element, still expecting {state}")
                }
            }
            Self::UnsupportedAlphabet(kind) => write!(f, "unsupported alphabet: {kind}"),
            Self::BadMagic => write!(f, "bad magic"),
            Self::TruncatedBlock { expected } => {
                write!(f, "premature end of stream: expected block of size {expected}")
            }
            Self::InvalidBlockHeader => write!(f, "invalid block header"),
            Self::InvalidChoice { choice, limit } => {
                write!(f, "input stream produced invalid choice {choice} (limit {limit})")
            }
            Self::PrematureEndOfStream => write!(f, "premature end of stream"),
            Self::InvalidSettings => write!(f, "invalid settings record"),
            Self::UnknownCoding(idx) => write!(f, "unknown coding {idx}"),
            Self::ChecksumMismatch { stored, actual } => write!(
                f,
                "schema checksum mismatch: stream has {stored:016x}, schema has {actual:016x}"
            ),
            Self::MalformedContent(msg) => write!(f, "malformed content: {msg}"),
            Self::UnknownBitCoder(name) => write!(f, "unknown bit coder '{name}'"),
            Self::UnknownCompressor(name) => write!(f, "unknown compressor '{name}'"),
            Self::InvalidAutomaton(msg) => write!(f, "invalid automaton: {msg}"),
            Self::MissingSchema => write!(f, "no schema specified"),
            Self::IoError(msg) => write!(f, "I/O error: {msg}"),
            Self::XmlParseError(msg) => write!(f, "XML parse error: {msg}"),
            Self::CompressionError(msg) => write!(f, "compression error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        // Eigene Fehler, die durch Read/Write-Adapter getunnelt wurden, wiederherstellen.
        if let Some(inner) = e.get_ref().and_then(|inner| inner.downcast_ref::<Error>()) {
            return inner.clone();
        }
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::PrematureEndOfStream
        } else {
            Error::IoError(e.to_string())
        }
    }
}

impl Error {
    /// Rejection of `found` where `expected` would fit.
    pub fn rejected(found: impl Into<Cow<'static, str>>, expected: impl Into<Cow<'static, str>>) -> Self {
        Self::Rejected { found: found.into(), expected: expected.into() }
    }

    /// Inconsistent automaton.
    pub fn invalid_automaton(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidAutomaton(msg.into())
    }

    /// True for errors that mean "the document does not fit this grammar
    /// branch". Only these kill a speculative branch; everything else aborts.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. }
                | Self::UnexpectedText(_)
                | Self::UnexpectedAttribute(_)
                | Self::IncompleteElement(_)
        )
    }

    /// True for errors caused by a malformed compressed stream.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::BadMagic
                | Self::TruncatedBlock { .. }
                | Self::InvalidBlockHeader
                | Self::InvalidChoice { .. }
                | Self::PrematureEndOfStream
                | Self::InvalidSettings
                | Self::UnknownCoding(_)
                | Self::ChecksumMismatch { .. }
                | Self::MalformedContent(_)
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display_with_expected() {
        let e = Error::rejected("<b>", "<a>|{{DATA}}");
        let msg = e.to_string();
        assert_eq!(msg, "expecting <a>|{{DATA}}, saw <b>");
    }

    #[test]
    fn rejected_display_without_expected() {
        let e = Error::rejected("<b>", "");
        assert_eq!(e.to_string(), "not expecting <b>");
    }

    #[test]
    fn unexpected_text_display() {
        let e = Error::UnexpectedText("hi".into());
        assert!(e.to_string().contains("\"hi\""));
    }

    #[test]
    fn unexpected_attribute_display() {
        let e = Error::UnexpectedAttribute("id".into());
        assert_eq!(e.to_string(), "not expecting attribute @id");
    }

    #[test]
    fn incomplete_element_display() {
        assert_eq!(Error::IncompleteElement("".into()).to_string(), "premature end of element");
        let msg = Error::IncompleteElement("<a>".into()).to_string();
        assert!(msg.contains("<a>"), "{msg}");
    }

    #[test]
    fn truncated_block_display() {
        let e = Error::TruncatedBlock { expected: 12 };
        assert_eq!(e.to_string(), "premature end of stream: expected block of size 12");
    }

    #[test]
    fn invalid_choice_display() {
        let e = Error::InvalidChoice { choice: 5, limit: 5 };
        let msg = e.to_string();
        assert!(msg.contains("invalid choice 5"), "{msg}");
        assert!(msg.contains("limit 5"), "{msg}");
    }

    #[test]
    fn checksum_mismatch_display() {
        let e = Error::ChecksumMismatch { stored: 1, actual: 2 };
        let msg = e.to_string();
        assert!(msg.contains("0000000000000001"), "{msg}");
        assert!(msg.contains("0000000000000002"), "{msg}");
    }

    #[test]
    fn config_errors_display() {
        assert_eq!(Error::UnknownBitCoder("x".into()).to_string(), "unknown bit coder 'x'");
        assert_eq!(Error::UnknownCompressor("y".into()).to_string(), "unknown compressor 'y'");
        assert_eq!(Error::MissingSchema.to_string(), "no schema specified");
    }

    #[test]
    fn rejection_classification() {
        assert!(Error::rejected("<a>", "").is_rejection());
        assert!(Error::UnexpectedText("x".into()).is_rejection());
        assert!(Error::UnexpectedAttribute("x".into()).is_rejection());
        assert!(Error::IncompleteElement("".into()).is_rejection());
        assert!(!Error::BadMagic.is_rejection());
        assert!(!Error::IoError("x".into()).is_rejection());
    }

    #[test]
    fn format_classification() {
        assert!(Error::BadMagic.is_format_error());
        assert!(Error::TruncatedBlock { expected: 1 }.is_format_error());
        assert!(Error::InvalidChoice { choice: 3, limit: 3 }.is_format_error());
        assert!(!Error::MissingSchema.is_format_error());
    }

    #[test]
    fn io_error_conversion() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(Error::from(eof), Error::PrematureEndOfStream);
        let other = std::io::Error::other("disk full");
        assert!(matches!(Error::from(other), Error::IoError(msg) if msg.contains("disk full")));
    }

    #[test]
    fn tunneled_error_is_recovered() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, Error::TruncatedBlock { expected: 9 });
        assert_eq!(Error::from(io), Error::TruncatedBlock { expected: 9 });
    }

    #[test]
    fn error_implements_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(Error::BadMagic);
        assert_eq!(e.to_string(), "bad magic");
    }

    #[test]
    fn error_is_clone_and_eq() {
        let e = Error::TruncatedBlock { expected: 7 };
        assert_eq!(e.clone(), e);
    }
}
