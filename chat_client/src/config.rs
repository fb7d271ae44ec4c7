// Configuration for the terminal client, read from the environment

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub speech_enabled: bool,
    /// Program and arguments that play a WAV file read from stdin.
    pub player_command: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3079".to_string(),
            speech_enabled: true,
            player_command: vec!["aplay".to_string(), "-q".to_string(), "-".to_string()],
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let server_url = lookup("SERVER_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.server_url);

        let speech_enabled = lookup("SPEECH_ENABLED")
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.speech_enabled);

        let player_command = lookup("PLAYER_COMMAND")
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|parts| !parts.is_empty())
            .unwrap_or(defaults.player_command);

        Self {
            server_url,
            speech_enabled,
            player_command,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
