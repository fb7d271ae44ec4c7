//! Incremental display of the answer as it streams in.
//!
//! [`MarkdownView`] re-renders the whole accumulated text as HTML on every
//! update. It is meant for library users that embed the client behind a
//! document view. The terminal binary uses [`TerminalView`] instead: printed
//! terminal text cannot be replaced, so it appends the raw new suffix and the
//! Markdown stays unrendered.

use std::io::Write;

use pulldown_cmark::{html, Options, Parser};
use tracing::debug;

/// Receives the whole answer so far after every increment.
///
/// Rendering is best effort: a sink never fails the stream.
pub trait RenderSink {
    /// Called once before the first increment of a turn.
    fn begin(&mut self) {}

    fn render(&mut self, accumulated: &str);

    /// Called once after the last increment of a turn.
    fn finish(&mut self) {}
}

/// Keeps an HTML rendering of the answer, replaced wholesale on each update.
///
/// Read the current rendering with [`MarkdownView::html`].
#[derive(Debug, Default)]
pub struct MarkdownView {
    html: String,
}

impl MarkdownView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}

impl RenderSink for MarkdownView {
    fn begin(&mut self) {
        self.html.clear();
    }

    fn render(&mut self, accumulated: &str) {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let parser = Parser::new_ext(accumulated, options);
        let mut rendered = String::with_capacity(accumulated.len() * 3 / 2);
        html::push_html(&mut rendered, parser);
        self.html = rendered;
    }
}

/// Streams the answer to a terminal, printing only what was not shown yet.
///
/// Output is the raw answer text, Markdown included.
pub struct TerminalView<W: Write> {
    out: W,
    shown: usize,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self { out, shown: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TerminalView<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> RenderSink for TerminalView<W> {
    fn begin(&mut self) {
        self.shown = 0;
    }

    fn render(&mut self, accumulated: &str) {
        // Text that was replaced rather than extended is printed in full.
        let fresh = accumulated.get(self.shown..).unwrap_or(accumulated);
        if fresh.is_empty() {
            return;
        }
        if let Err(e) = self.out.write_all(fresh.as_bytes()).and_then(|_| self.out.flush()) {
            debug!("Terminal write failed: {}", e);
        }
        self.shown = accumulated.len();
    }

    fn finish(&mut self) {
        if self.shown > 0 {
            let _ = writeln!(self.out);
        }
    }
}
