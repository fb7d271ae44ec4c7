//! Language-model side of the voice chat relay: the streaming inference
//! client, the retrieval client, prompt assembly, the line reframer that turns
//! arbitrary byte chunks into NDJSON lines, and the append-only chat history.

pub mod error;
pub mod history;
pub mod inference;
pub mod prompt;
pub mod reframe;
pub mod retrieval;

pub use error::{LlmError, StreamAborted};
pub use history::{ChatHistory, HistoryRecord, Role};
pub use inference::{response_fragment, GenerateChunk, InferenceClient, LineStream};
pub use prompt::{build_prompt, format_context};
pub use reframe::{reframe_lines, LineReframer, Utf8Decoder};
pub use retrieval::{ContextSnippet, RetrievalClient};
