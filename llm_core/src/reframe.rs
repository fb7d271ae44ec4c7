//! Re-chunking of an unbounded byte stream into complete text lines.
//!
//! The inference service answers with newline-delimited JSON, but the
//! transport hands us chunks whose boundaries have nothing to do with lines
//! (or even with UTF-8 character boundaries). `LineReframer` keeps the
//! trailing partial line until the rest of it arrives, so every line it emits
//! is complete and no byte is lost or emitted twice.

use futures::{Stream, StreamExt};
use tracing::debug;

use crate::error::StreamAborted;

/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across two chunks is held back until the
/// next call. Invalid sequences decode to U+FFFD instead of failing.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, prefixed by whatever incomplete sequence the previous
    /// call left behind.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end of the input.
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of input. A dangling incomplete sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    /// Number of bytes held back waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Splits decoded text on `\n`, holding the trailing partial line back.
#[derive(Debug, Default)]
pub struct LineReframer {
    decoder: Utf8Decoder,
    partial: String,
}

impl LineReframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk. Returns the lines completed by it, in order, with
    /// the newline separators stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(chunk);
        self.partial.push_str(&text);

        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete[..last_newline]
            .split('\n')
            .map(str::to_owned)
            .collect()
    }

    /// The line fragment received so far that has no newline yet.
    pub fn pending(&self) -> &str {
        &self.partial
    }

    /// End of stream: returns the held-back fragment unless it is blank.
    pub fn finish(&mut self) -> Option<String> {
        let tail = self.decoder.finish();
        self.partial.push_str(&tail);
        let last = std::mem::take(&mut self.partial);
        if last.trim().is_empty() {
            None
        } else {
            Some(last)
        }
    }
}

/// Adapt a chunked byte stream into a lazy stream of complete lines.
///
/// If the upstream errors, every line completed before the error is yielded
/// first, then a single `StreamAborted`; nothing is yielded after it.
pub fn reframe_lines<S, B, E>(upstream: S) -> impl Stream<Item = Result<String, StreamAborted>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut reframer = LineReframer::new();
        futures::pin_mut!(upstream);
        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    for line in reframer.push(bytes.as_ref()) {
                        yield Ok(line);
                    }
                }
                Err(e) => {
                    debug!(
                        "dropping {} byte partial line after upstream error",
                        reframer.pending().len()
                    );
                    yield Err(StreamAborted::new(e.to_string()));
                    return;
                }
            }
        }
        if let Some(line) = reframer.finish() {
            yield Ok(line);
        }
    }
}
