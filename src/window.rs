use std::slice::Windows;

use crate::error::ConfigError;

/// Public sliding-window structure, derived from the agreed lengths only.
///
/// Both parties compute the same layout without communicating: the lengths
/// are metadata, not secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLayout {
    pattern_len: usize,
    text_len: usize,
}

impl WindowLayout {
    pub fn new(pattern_len: usize, text_len: usize) -> Result<Self, ConfigError> {
        if pattern_len == 0 {
            return Err(ConfigError::EmptyPattern);
        }
        if text_len == 0 {
            return Err(ConfigError::EmptyText);
        }
        if pattern_len >= text_len {
            return Err(ConfigError::PatternNotShorter {
                pattern: pattern_len,
                text: text_len,
            });
        }
        Ok(WindowLayout {
            pattern_len,
            text_len,
        })
    }

    pub fn pattern_len(&self) -> usize {
        self.pattern_len
    }

    pub fn text_len(&self) -> usize {
        self.text_len
    }

    /// `text_len - pattern_len + 1`, always at least 2.
    pub fn num_windows(&self) -> usize {
        self.text_len - self.pattern_len + 1
    }

    /// Total number of characters shared by the text holder.
    pub fn num_text_shares(&self) -> usize {
        self.num_windows() * self.pattern_len
    }

    /// Sliding windows over `text`, e.g. `"HELLO"` with a pattern length of 3
    /// gives `"HEL"`, `"ELL"`, `"LLO"`.
    ///
    /// # Panics
    ///
    /// Panics if `text` is not exactly `text_len` bytes long.
    pub fn windows<'t>(&self, text: &'t [u8]) -> Windows<'t, u8> {
        assert_eq!(text.len(), self.text_len, "text length differs from layout");
        text.windows(self.pattern_len)
    }
}
