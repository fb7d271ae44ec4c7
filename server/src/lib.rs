pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod validation;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use llm_core::{build_prompt, format_context, ChatHistory, HistoryRecord, InferenceClient, RetrievalClient};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use tts_core::{SpeechEngine, WAV_CONTENT_TYPE};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{AppMetrics, MetricsResponse};
use crate::relay::TurnRecorder;
use crate::validation::{validate_prompt, validate_tts_text};

#[derive(Clone)]
pub struct AppState {
    pub inference: Arc<InferenceClient>,
    pub retrieval: Option<Arc<RetrievalClient>>,
    pub speech: Arc<dyn SpeechEngine>,
    pub history: Arc<ChatHistory>,
    pub metrics: AppMetrics,
    pub config: ServerConfig,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    prompt: String,
}

#[derive(Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    text: String,
}

/// Build the full application router, with middleware, for `state`.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let config = &state.config;

    // Rate limiting applies globally (all requests share the same limit)
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(replenish_interval_ms(config.rate_limit_per_minute))
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(cors_layer(config))
        .into_inner();

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/chat", post(chat_endpoint))
        .route("/tts", post(tts_endpoint))
        .route("/metrics", get(metrics_endpoint));

    Ok(Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state))
}

/// Milliseconds between two refilled rate-limit tokens.
///
/// The governor takes the refill interval, not a rate.
pub fn replenish_interval_ms(requests_per_minute: u32) -> u64 {
    (60_000 / u64::from(requests_per_minute.max(1))).max(1)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        if config.cors_allowed_origins.is_some() {
            warn!("CORS_ALLOWED_ORIGINS has no valid origin, falling back to permissive CORS");
        } else {
            warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        }
        base.allow_origin(tower_http::cors::Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(tower_http::cors::AllowOrigin::list(origins))
    }
}

/// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let value = HeaderValue::from_str(&request_id).ok();
    if let Some(ref value) = value {
        request.headers_mut().insert("x-request-id", value.clone());
    }
    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(state.metrics.snapshot())
}

pub async fn chat_endpoint(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let start_time = Instant::now();
    let result = start_relay(&state, &req.prompt).await;

    // Latency here is time to first frame; the stream itself may run longer.
    state.metrics.chat.record_request(start_time.elapsed().as_millis() as u64);
    if result.is_err() {
        state.metrics.chat.record_error();
    }
    result
}

async fn start_relay(state: &AppState, prompt: &str) -> Result<Response, ApiError> {
    validate_prompt(prompt)?;
    info!("Chat request received: prompt length={}", prompt.len());

    state.history.record(HistoryRecord::user(prompt)).await;

    let context = match &state.retrieval {
        Some(retrieval) => format_context(&retrieval.query(prompt).await?),
        None => String::new(),
    };
    let final_prompt = build_prompt(prompt, &context);

    let lines = state.inference.generate_stream(&final_prompt).await?;
    relay::relay(
        lines,
        TurnRecorder::new(state.history.clone()),
        state.metrics.relay.clone(),
    )
    .await
}

pub async fn tts_endpoint(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Response, ApiError> {
    let start_time = Instant::now();
    let result = synthesize(&state, &req.text).await;

    state.metrics.tts.record_request(start_time.elapsed().as_millis() as u64);
    if result.is_err() {
        state.metrics.tts.record_error();
    }
    result
}

async fn synthesize(state: &AppState, text: &str) -> Result<Response, ApiError> {
    validate_tts_text(text)?;
    info!("Synthesizing {} chars with {}", text.len(), state.speech.name());

    let wav = state.speech.synthesize(text).await?;
    if let Ok(duration_ms) = tts_core::wav_duration_ms(&wav) {
        info!("Synthesized {} ms of audio", duration_ms);
    }
    Ok(([(header::CONTENT_TYPE, WAV_CONTENT_TYPE)], wav).into_response())
}
