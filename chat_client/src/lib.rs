//! Terminal client for the voice chat relay: streams answers, shows them as
//! they arrive and speaks each finished sentence in order.

pub mod config;
pub mod error;
pub mod output;
pub mod playback;
pub mod render;
pub mod repl;
pub mod segment;
pub mod session;
pub mod sse;
pub mod synth;

pub use config::ClientConfig;
pub use error::ClientError;
pub use playback::{PlaybackEvent, PlaybackHandle, PlaybackReport, PlaybackScheduler, SpeechToggle};
pub use render::{MarkdownView, RenderSink, TerminalView};
pub use segment::{SentenceSegmenter, SentenceUnit};
pub use session::{ChatSession, TurnSummary};
