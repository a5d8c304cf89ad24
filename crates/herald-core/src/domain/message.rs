//! CanonicalMessage - 変換後の配送単位
//!
//! Transformer が生成し、Dispatcher がすぐに消費する。永続化しない。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::TransformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Plain,
    Markdown,
    Html,
}

impl MessageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageFormat::Plain => "plain",
            MessageFormat::Markdown => "markdown",
            MessageFormat::Html => "html",
        }
    }
}

impl fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trimmed and lowercased before matching, so `" Markdown "` is accepted.
impl FromStr for MessageFormat {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "plain" => Ok(MessageFormat::Plain),
            "markdown" => Ok(MessageFormat::Markdown),
            "html" => Ok(MessageFormat::Html),
            "" => Err(TransformError::MissingField("format")),
            _ => Err(TransformError::InvalidFormat(normalized)),
        }
    }
}

/// A message ready to be delivered to one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMessage {
    pub room_id: String,
    pub body: String,
    pub format: MessageFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("plain", MessageFormat::Plain)]
    #[case::upper("MARKDOWN", MessageFormat::Markdown)]
    #[case::padded("  Html \t", MessageFormat::Html)]
    fn accepted_formats(#[case] raw: &str, #[case] expected: MessageFormat) {
        assert_eq!(raw.parse::<MessageFormat>().unwrap(), expected);
    }

    #[test]
    fn unknown_format_is_rejected_with_normalized_name() {
        let err = "LaTeX".parse::<MessageFormat>().unwrap_err();
        assert!(matches!(err, TransformError::InvalidFormat(f) if f == "latex"));
    }

    #[test]
    fn blank_format_is_a_missing_field() {
        let err = "   ".parse::<MessageFormat>().unwrap_err();
        assert!(matches!(err, TransformError::MissingField("format")));
    }
}
