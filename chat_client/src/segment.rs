//! Incremental sentence segmentation of a streamed answer.
//!
//! A sentence ends at the first `.`, `!` or `?` that is followed by
//! whitespace or sits at the end of the text received so far. This is a
//! plain punctuation heuristic: abbreviations like "e.g. this" split early,
//! and a decimal split across two increments ("3." then "14") is cut at the
//! dot because the dot was at the end of the text when it was seen.

use std::fmt;

/// One trimmed, complete sentence ready to be spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceUnit {
    text: String,
}

impl SentenceUnit {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for SentenceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Accumulated answer text plus how much of it has been segmented.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    accumulated: String,
    cursor: usize,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `increment` and return every sentence it completed, in order.
    pub fn observe(&mut self, increment: &str) -> Vec<SentenceUnit> {
        self.accumulated.push_str(increment);

        let mut units = Vec::new();
        while let Some(unit) = self.next_unit() {
            units.push(unit);
        }
        units
    }

    /// Forget everything; the next call starts a new answer.
    pub fn reset(&mut self) {
        self.accumulated.clear();
        self.cursor = 0;
    }

    /// Everything received this turn, segmented or not.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Byte offset up to which the text has been segmented.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Text after the cursor: the sentence still being written.
    pub fn remainder(&self) -> &str {
        &self.accumulated[self.cursor..]
    }

    fn next_unit(&mut self) -> Option<SentenceUnit> {
        let rest = &self.accumulated[self.cursor..];
        let body = rest.trim_start();
        let offset = self.cursor + (rest.len() - body.len());

        let mut chars = body.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if !is_terminal(c) {
                continue;
            }
            let end = offset + i + c.len_utf8();
            let consumed = match chars.peek() {
                None => end,
                Some(&(_, next)) if next.is_whitespace() => end + next.len_utf8(),
                Some(_) => continue,
            };

            let text = self.accumulated[offset..end].trim().to_string();
            self.cursor = consumed;
            return Some(SentenceUnit { text });
        }
        None
    }
}
