//! Query text and script detection.

use serde::{Deserialize, Serialize};

/// Dominant writing system of a query.
///
/// Detection only looks at alphabetic characters; digits and punctuation
/// do not vote. Tokenization in [`super::text`] switches to character
/// bigrams for [`Script::Han`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    /// Latin alphabet (English, most European languages).
    Latin,
    /// CJK unified ideographs.
    Han,
    /// Cyrillic alphabet.
    Cyrillic,
    /// Arabic script.
    Arabic,
    /// Anything else, or no letters at all.
    Other,
}

impl Script {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Latin => "latin",
            Self::Han => "han",
            Self::Cyrillic => "cyrillic",
            Self::Arabic => "arabic",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` for CJK unified ideographs (basic block, extension A,
/// compatibility ideographs).
#[must_use]
pub const fn is_han(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}

/// Detects the dominant script of `text` by majority vote over letters.
#[must_use]
pub fn detect_script(text: &str) -> Script {
    let mut counts = [0usize; 5];
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        let idx = if is_han(c) {
            1
        } else if c.is_ascii_alphabetic() || matches!(c as u32, 0x00C0..=0x024F) {
            0
        } else if matches!(c as u32, 0x0400..=0x04FF) {
            2
        } else if matches!(c as u32, 0x0600..=0x06FF) {
            3
        } else {
            4
        };
        counts[idx] += 1;
    }

    let scripts = [
        Script::Latin,
        Script::Han,
        Script::Cyrillic,
        Script::Arabic,
        Script::Other,
    ];
    counts
        .iter()
        .zip(scripts)
        .filter(|(n, _)| **n > 0)
        // Earlier entries win ties.
        .max_by(|(a, sa), (b, sb)| a.cmp(b).then_with(|| (*sb as u8).cmp(&(*sa as u8))))
        .map_or(Script::Other, |(_, s)| s)
}

/// An immutable user query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    script: Script,
}

impl Query {
    /// Creates a query from raw user input (surrounding whitespace is trimmed).
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let script = detect_script(&text);
        Self { text, script }
    }

    /// Returns the query text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the detected script.
    #[must_use]
    pub const fn script(&self) -> Script {
        self.script
    }

    /// Returns `true` if the query contains no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
