//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use llm_core::{ChatHistory, InferenceClient, RetrievalClient};
use serde_json::{json, Value};
use server::{build_router, config::ServerConfig, metrics::AppMetrics, AppState};
use tokio::net::TcpListener;
use tts_core::{SpeechEngine, SynthesisError};

/// Speech engine that answers with a fixed WAV, or fails when told to.
pub struct FakeSpeech {
    pub fail: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeSpeech {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SpeechEngine for FakeSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(SynthesisError::Failed("voice model missing".to_string()));
        }
        tts_core::encode_wav(&[0.0, 0.25, -0.25, 0.0], 22050)
            .map_err(|e| SynthesisError::Failed(e.to_string()))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// What the fake upstream saw.
#[derive(Clone, Default)]
pub struct Upstream {
    pub prompts: Arc<Mutex<Vec<String>>>,
    pub questions: Arc<Mutex<Vec<String>>>,
}

/// Serve a fake inference and retrieval service on an ephemeral port and
/// return its base URL. `/api/generate` replies with `ndjson` verbatim.
pub async fn spawn_upstream(ndjson: &'static str) -> (String, Upstream) {
    let seen = Upstream::default();

    async fn generate(
        State((seen, body)): State<(Upstream, &'static str)>,
        Json(req): Json<Value>,
    ) -> &'static str {
        let prompt = req["prompt"].as_str().unwrap_or_default().to_string();
        seen.prompts.lock().unwrap().push(prompt);
        body
    }

    async fn query(
        State((seen, _)): State<(Upstream, &'static str)>,
        Json(req): Json<Value>,
    ) -> Json<Value> {
        let question = req["question"].as_str().unwrap_or_default().to_string();
        seen.questions.lock().unwrap().push(question);
        Json(json!({
            "question": req["question"],
            "context": [{"text": "Alba is a Scottish voice.", "metadata": {"page": 1}}]
        }))
    }

    let app = Router::new()
        .route("/api/generate", post(generate))
        .route("/query", post(query))
        .with_state((seen.clone(), ndjson));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

pub struct TestApp {
    pub router: Router,
    pub history: Arc<ChatHistory>,
    pub speech: Arc<FakeSpeech>,
    pub metrics: AppMetrics,
    _dir: tempfile::TempDir,
}

/// Create a test app instance wired to `upstream_url`.
pub async fn create_test_app(upstream_url: &str, speech: FakeSpeech) -> TestApp {
    create_test_app_with(upstream_url, speech, |_| {}).await
}

/// Same as [`create_test_app`], letting `tweak` adjust the configuration.
pub async fn create_test_app_with(
    upstream_url: &str,
    speech: FakeSpeech,
    tweak: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig {
        inference_url: upstream_url.to_string(),
        retrieval_url: Some(upstream_url.to_string()),
        history_path: dir.path().join("chat_history.json"),
        rate_limit_per_minute: 1000,
        ..ServerConfig::default()
    };
    tweak(&mut config);

    let history = Arc::new(ChatHistory::load(&config.history_path).await);
    let speech = Arc::new(speech);
    let metrics = AppMetrics::new();
    let state = AppState {
        inference: Arc::new(InferenceClient::new(&config.inference_url, &config.llm_model)),
        retrieval: config.retrieval_url.as_deref().map(|url| Arc::new(RetrievalClient::new(url))),
        speech: speech.clone(),
        history: history.clone(),
        metrics: metrics.clone(),
        config,
    };

    TestApp {
        router: build_router(state).unwrap(),
        history,
        speech,
        metrics,
        _dir: dir,
    }
}

/// Accept connections and never answer them.
pub async fn spawn_silent_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}

/// An address nothing listens on.
pub const DEAD_UPSTREAM: &str = "http://127.0.0.1:9";
