// Configuration for the relay server, read from the environment

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub inference_url: String,
    pub llm_model: String,
    /// `None` disables retrieval; prompts then go to the model without context.
    pub retrieval_url: Option<String>,
    pub history_path: PathBuf,
    pub piper_bin: PathBuf,
    pub piper_model: PathBuf,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3079,
            inference_url: "http://localhost:11434".to_string(),
            llm_model: "mistral".to_string(),
            retrieval_url: Some("http://localhost:8008".to_string()),
            history_path: PathBuf::from("memory/chat_history.json"),
            piper_bin: PathBuf::from("piper"),
            piper_model: PathBuf::from("voices/en_GB-alba-medium.onnx"),
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset or unparsable values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let port = lookup("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let inference_url = lookup("INFERENCE_URL").unwrap_or(defaults.inference_url);

        let llm_model = lookup("LLM_MODEL").unwrap_or(defaults.llm_model);

        // Set but empty means "no retrieval service".
        let retrieval_url = match lookup("RETRIEVAL_URL") {
            Some(url) if url.trim().is_empty() => None,
            Some(url) => Some(url.trim().to_string()),
            None => defaults.retrieval_url,
        };

        let history_path = lookup("HISTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.history_path);

        let piper_bin = lookup("PIPER_BIN")
            .map(PathBuf::from)
            .unwrap_or(defaults.piper_bin);

        let piper_model = lookup("PIPER_MODEL")
            .map(PathBuf::from)
            .unwrap_or(defaults.piper_model);

        let rate_limit_per_minute = lookup("RATE_LIMIT_PER_MINUTE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = lookup("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Self {
            port,
            inference_url,
            llm_model,
            retrieval_url,
            history_path,
            piper_bin,
            piper_model,
            rate_limit_per_minute,
            request_timeout_secs,
            cors_allowed_origins,
        }
    }

    /// Bounds the time until response headers are sent; a relay that has
    /// started streaming is not cut off by it.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
