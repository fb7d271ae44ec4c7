//! Decoding of the relay's `data: <line>` frames back into answer text.

use futures_util::{Stream, StreamExt};
use llm_core::{reframe_lines, response_fragment, StreamAborted};

/// Payload of one frame line, or `None` for blank lines and anything that
/// is not a `data:` line.
pub fn frame_payload(line: &str) -> Option<&str> {
    let payload = line.trim_end_matches('\r').strip_prefix("data:")?;
    let payload = payload.trim();
    (!payload.is_empty()).then_some(payload)
}

/// Turn the relay's response body into the stream of answer fragments.
///
/// Frames whose payload is not JSON, or that carry no `response` text, are
/// skipped. An aborted body ends the stream with `StreamAborted` after the
/// fragments that arrived intact.
pub fn answer_fragments<S, B, E>(body: S) -> impl Stream<Item = Result<String, StreamAborted>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    reframe_lines(body).filter_map(|item| async move {
        match item {
            Ok(line) => frame_payload(&line).and_then(response_fragment).map(Ok),
            Err(aborted) => Some(Err(aborted)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    async fn collect(chunks: Vec<Result<&'static [u8], &'static str>>) -> Vec<Result<String, StreamAborted>> {
        answer_fragments(stream::iter(chunks)).collect().await
    }

    #[test]
    fn test_frame_payload() {
        assert_eq!(frame_payload("data: {\"response\":\"a\"}"), Some("{\"response\":\"a\"}"));
        assert_eq!(frame_payload("data:x\r"), Some("x"));
        assert_eq!(frame_payload(""), None);
        assert_eq!(frame_payload("data:   "), None);
        assert_eq!(frame_payload("event: ping"), None);
    }

    #[tokio::test]
    async fn test_fragments_across_split_frames() {
        let fragments = collect(vec![
            Ok(&b"data: {\"respon"[..]),
            Ok(&b"se\":\"Hel\"}\n\ndata: {\"response\":\"lo.\"}\n"[..]),
            Ok(&b"\ndata: {\"response\":\"\",\"done\":true}\n\n"[..]),
        ])
        .await;
        let texts: Vec<String> = fragments.into_iter().map(Result::unwrap).collect();
        assert_eq!(texts, vec!["Hel", "lo."]);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_ignored() {
        let fragments = collect(vec![Ok(&b"data: {not json\n\ndata: {\"response\":\"ok\"}\n\n"[..])]).await;
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_abort_after_intact_fragments() {
        let fragments = collect(vec![
            Ok(&b"data: {\"response\":\"Hi\"}\n\ndata: {\"resp"[..]),
            Err("connection reset"),
        ])
        .await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].as_ref().unwrap(), "Hi");
        assert!(fragments[1].is_err());
    }
}
