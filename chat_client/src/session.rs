//! One chat conversation: sends prompts and handles each streamed answer.

use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::playback::{PlaybackHandle, PlaybackReport, SpeechToggle};
use crate::render::RenderSink;
use crate::segment::SentenceSegmenter;
use crate::sse::answer_fragments;

#[derive(Serialize)]
struct ChatRequest<'a> {
    prompt: &'a str,
}

/// What one turn produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnSummary {
    pub text: String,
    pub sentences: usize,
    pub queued: usize,
}

pub struct ChatSession<R> {
    client: Client,
    chat_url: String,
    segmenter: SentenceSegmenter,
    render: R,
    playback: PlaybackHandle,
    speech: SpeechToggle,
}

impl<R: RenderSink> ChatSession<R> {
    pub fn new(client: Client, server_url: &str, render: R, playback: PlaybackHandle, speech: SpeechToggle) -> Self {
        Self {
            client,
            chat_url: format!("{}/chat", server_url.trim_end_matches('/')),
            segmenter: SentenceSegmenter::new(),
            render,
            playback,
            speech,
        }
    }

    pub fn speech(&self) -> &SpeechToggle {
        &self.speech
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackHandle {
        &mut self.playback
    }

    pub fn render(&self) -> &R {
        &self.render
    }

    /// Send `prompt` and process the streamed answer until it ends.
    ///
    /// If the stream breaks off, what arrived is kept (rendered and queued
    /// for speech) and the abort is returned as the error.
    pub async fn ask(&mut self, prompt: &str) -> Result<TurnSummary, ClientError> {
        self.begin_turn();

        let response = self
            .client
            .post(&self.chat_url)
            .json(&ChatRequest { prompt })
            .send()
            .await
            .map_err(|e| ClientError::ServerUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let mut fragments = Box::pin(answer_fragments(response.bytes_stream()));
        let mut summary = TurnSummary::default();
        let outcome = loop {
            match fragments.next().await {
                Some(Ok(fragment)) => self.observe(&fragment, &mut summary),
                Some(Err(aborted)) => {
                    warn!("Answer stream aborted: {}", aborted.reason);
                    break Err(ClientError::from(aborted));
                }
                None => break Ok(()),
            }
        };
        self.render.finish();

        summary.text = self.segmenter.accumulated().to_string();
        info!(
            "Turn finished: {} chars, {} sentence(s), {} queued for speech",
            summary.text.len(),
            summary.sentences,
            summary.queued
        );
        outcome.map(|()| summary)
    }

    /// Start a new turn: forget the previous answer and drop its unspoken
    /// sentences.
    pub fn begin_turn(&mut self) {
        self.segmenter.reset();
        self.playback.begin_turn();
        self.render.begin();
    }

    /// Handle one answer fragment.
    pub fn observe(&mut self, fragment: &str, summary: &mut TurnSummary) {
        let units = self.segmenter.observe(fragment);
        self.render.render(self.segmenter.accumulated());

        summary.sentences += units.len();
        if !self.speech.is_enabled() {
            return;
        }
        for unit in units {
            let id = self.playback.enqueue(unit);
            debug!("Queued sentence {} for speech", id);
            summary.queued += 1;
        }
    }

    /// Let queued speech finish and end the session.
    pub async fn close(self) -> PlaybackReport {
        self.playback.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::playback::{AudioOutput, JobState, PlaybackEnd, PlaybackEvent, PlaybackScheduler, Synthesizer};
    use crate::repl::read_commands;
    use crate::render::MarkdownView;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Recorder {
        synthesized: Mutex<Vec<String>>,
    }

    struct FakeSynth(Arc<Recorder>);

    #[async_trait]
    impl Synthesizer for FakeSynth {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ClientError> {
            self.0.synthesized.lock().unwrap().push(text.to_string());
            Ok(vec![0; 4])
        }
    }

    struct Silent;

    #[async_trait]
    impl AudioOutput for Silent {
        async fn start(&self, _wav: Vec<u8>) -> Result<PlaybackEnd, ClientError> {
            Ok(Box::pin(async { Ok(()) }))
        }
    }

    fn session(server_url: &str, speech: bool) -> (ChatSession<MarkdownView>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let playback = PlaybackScheduler::spawn(Arc::new(FakeSynth(recorder.clone())), Arc::new(Silent));
        let session = ChatSession::new(
            Client::new(),
            server_url,
            MarkdownView::new(),
            playback,
            SpeechToggle::new(speech),
        );
        (session, recorder)
    }

    /// Serve one HTTP response, written in `chunks` with a pause between
    /// them, then close the connection.
    async fn serve_once(status_line: &'static str, chunks: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            // The request body is a small JSON object ending in '}'.
            while !request.ends_with(b"}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!("{status_line}\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n");
            socket.write_all(head.as_bytes()).await.unwrap();
            for chunk in chunks {
                socket.write_all(chunk.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    const ANSWER: &[&str] = &[
        "data: {\"response\":\"Hello \"}\n\ndata: {\"resp",
        "onse\":\"world. How \"}\n\n",
        "data: {\"response\":\"are you?\"}\n\ndata: {\"response\":\"\",\"done\":true}\n\n",
    ];

    #[tokio::test]
    async fn test_turn_speaks_sentences_in_order() {
        let url = serve_once("HTTP/1.1 200 OK", ANSWER.to_vec()).await;
        let (mut session, recorder) = session(&url, true);

        let summary = session.ask("Hi").await.unwrap();
        assert_eq!(summary.text, "Hello world. How are you?");
        assert_eq!(summary.sentences, 2);
        assert_eq!(summary.queued, 2);
        assert!(session.render().html().contains("Hello world. How are you?"));

        let report = session.close().await;
        assert_eq!(report.states(), vec![JobState::Completed, JobState::Completed]);
        assert_eq!(*recorder.synthesized.lock().unwrap(), ["Hello world.", "How are you?"]);
    }

    #[tokio::test]
    async fn test_disabled_speech_never_synthesizes() {
        let url = serve_once("HTTP/1.1 200 OK", ANSWER.to_vec()).await;
        let (mut session, recorder) = session(&url, false);

        let summary = session.ask("Hi").await.unwrap();
        assert_eq!(summary.sentences, 2);
        assert_eq!(summary.queued, 0);

        let report = session.close().await;
        assert!(report.jobs.is_empty());
        assert!(recorder.synthesized.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_is_checked_when_a_sentence_completes() {
        let (mut session, recorder) = session("http://127.0.0.1:9", false);
        let mut summary = TurnSummary::default();

        session.begin_turn();
        session.observe("One. Two", &mut summary);
        session.speech().set(true);
        session.observe(". Three", &mut summary);

        assert_eq!(summary.sentences, 2);
        assert_eq!(summary.queued, 1);
        session.close().await;
        assert_eq!(*recorder.synthesized.lock().unwrap(), ["Two."]);
    }

    #[tokio::test]
    async fn test_speech_off_typed_mid_answer_stops_further_sentences() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (resume_tx, resume_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.ends_with(b"}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            socket
                .write_all(b"data: {\"response\":\"First sentence. Sec\"}\n\n")
                .await
                .unwrap();
            let _ = resume_rx.await;
            socket
                .write_all(b"data: {\"response\":\"ond sentence. Third one.\"}\n\n")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let (mut session, recorder) = session(&url, true);
        let mut events = session.playback_mut().subscribe();
        let speech = session.speech().clone();
        let (prompts_tx, _prompts) = tokio::sync::mpsc::channel(1);

        let typing = async {
            // Wait for the first sentence to be queued, then type the command.
            loop {
                if let Some(PlaybackEvent::Queued { .. }) = events.recv().await {
                    break;
                }
            }
            read_commands(&b"/speech off\n"[..], speech, prompts_tx).await.unwrap();
            resume_tx.send(()).unwrap();
        };
        let (summary, ()) = tokio::join!(session.ask("Go"), typing);
        let summary = summary.unwrap();

        assert_eq!(summary.sentences, 3);
        assert_eq!(summary.queued, 1);
        session.close().await;
        assert_eq!(*recorder.synthesized.lock().unwrap(), ["First sentence."]);
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let url = serve_once("HTTP/1.1 502 Bad Gateway", vec!["inference service unreachable"]).await;
        let (mut session, _) = session(&url, true);

        match session.ask("Hi").await {
            Err(ClientError::Rejected { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "inference service unreachable");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let (mut session, _) = session("http://127.0.0.1:9", true);
        assert!(matches!(
            session.ask("Hi").await,
            Err(ClientError::ServerUnavailable(_))
        ));
    }
}
