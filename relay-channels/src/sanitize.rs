//! Inbound text normalization.
//!
//! The assistant rejects inputs longer than 2048 characters and inputs that
//! contain tab, line-feed or carriage-return characters, so every message is
//! passed through [`sanitize`] before it is relayed.

use regex::Regex;
use std::sync::LazyLock;

/// Longest input the assistant accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2048;

/// Length an over-long input is cut down to.
///
/// One less than [`MAX_MESSAGE_CHARS`]; deployed behavior, kept as is.
pub const TRUNCATED_MESSAGE_CHARS: usize = MAX_MESSAGE_CHARS - 1;

static BAD_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\t\n\r]").unwrap());

/// Phrases that drop the conversation's assistant session.
const RESET_COMMANDS: &[&str] = &["start over", "start_over"];

/// Text that is safe to forward to the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedText(String);

impl SanitizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Whether the user asked to start a fresh session.
    ///
    /// Case-insensitive, whole-message match; surrounding whitespace is not trimmed.
    pub fn is_reset_command(&self) -> bool {
        let lower = self.0.to_lowercase();
        RESET_COMMANDS.contains(&lower.as_str())
    }
}

impl AsRef<str> for SanitizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SanitizedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cap the length of `text` and replace tab / LF / CR with spaces.
pub fn sanitize(text: &str) -> SanitizedText {
    let char_count = text.chars().count();
    let text = if char_count > MAX_MESSAGE_CHARS {
        tracing::warn!(
            length = char_count,
            truncated_to = TRUNCATED_MESSAGE_CHARS,
            "Message length is too long, truncating"
        );
        match text.char_indices().nth(TRUNCATED_MESSAGE_CHARS) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    } else {
        text
    };

    let bad_chars = BAD_CHARS.find_iter(text).count();
    if bad_chars > 0 {
        tracing::warn!(count = bad_chars, "Input contains bad characters, replacing with spaces");
        return SanitizedText(BAD_CHARS.replace_all(text, " ").into_owned());
    }

    SanitizedText(text.to_string())
}
