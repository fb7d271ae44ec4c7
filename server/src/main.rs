use std::{net::SocketAddr, sync::Arc};

use llm_core::{ChatHistory, InferenceClient, RetrievalClient};
use tokio::net::TcpListener;
use tracing::info;
use tts_core::SpeechEngine;

use server::config::ServerConfig;
use server::metrics::AppMetrics;
use server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

fn speech_engine(config: &ServerConfig) -> anyhow::Result<Arc<dyn SpeechEngine>> {
    #[cfg(feature = "piper-model")]
    if std::env::var("SPEECH_ENGINE").as_deref() == Ok("model") {
        let mut cfg = config.piper_model.clone().into_os_string();
        cfg.push(".json");
        info!("Using in-process Piper model");
        return Ok(Arc::new(tts_core::PiperModel::new(cfg)?));
    }

    info!(
        "Using Piper process {} with voice {}",
        config.piper_bin.display(),
        config.piper_model.display()
    );
    Ok(Arc::new(tts_core::PiperProcess::new(
        config.piper_bin.clone(),
        config.piper_model.clone(),
    )))
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting voice chat relay server...");

    // Load configuration from environment
    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, model={}, rate_limit={}/min",
        config.port, config.llm_model, config.rate_limit_per_minute
    );

    let inference = Arc::new(InferenceClient::new(&config.inference_url, &config.llm_model));
    let retrieval = match &config.retrieval_url {
        Some(url) => {
            info!("Retrieval service at {}", url);
            Some(Arc::new(RetrievalClient::new(url)))
        }
        None => {
            info!("RETRIEVAL_URL empty, prompting without retrieved context");
            None
        }
    };
    let history = Arc::new(ChatHistory::load(&config.history_path).await);
    let speech = speech_engine(&config)?;

    let state = AppState {
        inference,
        retrieval,
        speech,
        history,
        metrics: AppMetrics::new(),
        config: config.clone(),
    };
    let app = build_router(state)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
