//! Product key tokens.

use std::fmt;

/// A trimmed, non-empty product key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RedemptionKey(String);

impl RedemptionKey {
    /// Parses a raw key entry. Blank entries yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key text with everything after the first five characters hidden, for logs.
    #[must_use]
    pub fn masked(&self) -> String {
        let visible: String = self.0.chars().take(5).collect();
        if visible.len() == self.0.len() {
            visible
        } else {
            format!("{visible}***")
        }
    }
}

impl fmt::Display for RedemptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
