//! Sequence-number extraction from raw log lines.
//!
//! Producers emit lines of the form `<n> <anything>`, optionally wrapped by
//! the generator framework in a klog-style header. Anything else is noise.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};

/// Header the logs generator prepends when its output is not parsed upstream.
pub const DEFAULT_FRAMEWORK_PREFIX: &str =
    r"I\d+ \d+:\d+:\d+.\d+       \d+ logs_generator.go:67] ";

/// A single line as returned by a log source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Raw text payload.
    pub payload: String,
}

impl LogEntry {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Sequence number carried by this entry, if it is one of ours.
    pub fn sequence_number(&self, codec: &LineCodec) -> Option<u64> {
        codec.decode(&self.payload)
    }
}

/// Decoder for the numbered-line pattern.
///
/// Held as a value and passed to the poller so independent runs can use
/// different prefixes without touching shared state.
#[derive(Debug, Clone)]
pub struct LineCodec {
    pattern: Regex,
}

impl LineCodec {
    /// Build a codec recognising `prefix` (a regex fragment) as the optional
    /// framework header.
    pub fn with_prefix(prefix: &str) -> VerifyResult<Self> {
        let pattern = Regex::new(&format!(r"(?:{prefix})?(\d+) .*"))
            .map_err(|e| VerifyError::Config(format!("invalid line prefix pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// Extract the sequence number, or `None` when the line does not match or
    /// the number does not fit.
    pub fn decode(&self, line: &str) -> Option<u64> {
        let captures = self.pattern.captures(line)?;
        captures.get(1)?.as_str().parse().ok()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self {
            pattern: Regex::new(&format!(r"(?:{DEFAULT_FRAMEWORK_PREFIX})?(\d+) .*"))
                .expect("default line pattern compiles"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_with_framework_prefix() {
        let codec = LineCodec::default();
        let line = "I0101 00:00:00.000000       1 logs_generator.go:67] 42 filler";
        assert_eq!(codec.decode(line), Some(42));
    }

    #[test]
    fn test_decode_bare_line() {
        let codec = LineCodec::default();
        assert_eq!(codec.decode("42 filler"), Some(42));
        assert_eq!(codec.decode("0 GET /api/v1/producers/p 200"), Some(0));
    }

    #[test]
    fn test_decode_garbage_is_none() {
        let codec = LineCodec::default();
        assert_eq!(codec.decode("garbage"), None);
        assert_eq!(codec.decode(""), None);
    }

    #[test]
    fn test_decode_requires_trailing_text() {
        let codec = LineCodec::default();
        assert_eq!(codec.decode("42"), None);
    }

    #[test]
    fn test_decode_overflow_is_none() {
        let codec = LineCodec::default();
        assert_eq!(codec.decode("99999999999999999999999 filler"), None);
    }

    #[test]
    fn test_custom_prefix() {
        let codec = LineCodec::with_prefix(r"\[app\] ").unwrap();
        assert_eq!(codec.decode("[app] 7 hello"), Some(7));
        assert_eq!(codec.decode("7 hello"), Some(7));
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let err = LineCodec::with_prefix("(unclosed").unwrap_err();
        assert!(matches!(err, VerifyError::Config(_)));
    }

    #[test]
    fn test_entry_sequence_number() {
        let codec = LineCodec::default();
        assert_eq!(LogEntry::new("3 x").sequence_number(&codec), Some(3));
        assert_eq!(LogEntry::new("noise").sequence_number(&codec), None);
    }
}
