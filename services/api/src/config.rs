//! Application configuration loaded from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    /// Chat model used for the answer judgement call.
    pub judgement_model: String,
    /// Chat model used for structured extraction.
    pub extraction_model: String,
    /// Embedding model for the similarity index; empty disables the index.
    pub embedding_model: String,
    pub transcription_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    pub log_level: Level,
    /// Optional JSON file overriding the interview script and guard tunables.
    pub script_path: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .map(|k| k.trim().trim_matches('"').trim_matches('\'').to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let judgement_model =
            std::env::var("JUDGEMENT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let extraction_model =
            std::env::var("EXTRACTION_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let embedding_model = std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let transcription_model =
            std::env::var("TRANSCRIPTION_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        let tts_model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "nova".to_string());
        let realtime_model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview".to_string());
        let realtime_voice =
            std::env::var("REALTIME_VOICE").unwrap_or_else(|_| "alloy".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let script_path = std::env::var("SCRIPT_PATH").map(PathBuf::from).ok();

        Ok(Self {
            bind_address,
            openai_api_key,
            judgement_model,
            extraction_model,
            embedding_model,
            transcription_model,
            tts_model,
            tts_voice,
            realtime_model,
            realtime_voice,
            log_level,
            script_path,
        })
    }
}
