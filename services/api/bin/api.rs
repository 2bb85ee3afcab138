//! Main Entrypoint for the Check-In API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the interview script (built-in or from SCRIPT_PATH).
//! 3. Initializing shared services (judgement, similarity, speech).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use checkin_api::{config::Config, router::create_router, speech::OpenAiSpeechService, state::AppState};
use checkin_core::{
    engine::InterviewEngine,
    judgement::{JudgementClient, OpenAICompatibleClient},
    script::InterviewScript,
    similarity::{EmbeddingIndex, NoopIndex, SimilarityIndex},
};
use std::{fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

fn load_script(config: &Config) -> anyhow::Result<InterviewScript> {
    match &config.script_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read script file {}", path.display()))?;
            let script = InterviewScript::from_json(&raw)
                .with_context(|| format!("Failed to parse script file {}", path.display()))?;
            info!(path = %path.display(), questions = script.len(), "Loaded interview script");
            Ok(script)
        }
        None => Ok(InterviewScript::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load the Interview Script ---
    let script = load_script(&config)?;

    // --- 4. Initialize Shared Services ---
    let openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);

    let judgement: Arc<dyn JudgementClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config.clone(),
        config.judgement_model.clone(),
    ));

    let extraction: Arc<dyn JudgementClient> = Arc::new(OpenAICompatibleClient::extraction(
        openai_config.clone(),
        config.extraction_model.clone(),
    ));

    let similarity: Arc<dyn SimilarityIndex> = if config.embedding_model.is_empty() {
        info!("Embedding model disabled; similarity lookups will return nothing.");
        Arc::new(NoopIndex)
    } else {
        Arc::new(EmbeddingIndex::new(
            openai_config.clone(),
            config.embedding_model.clone(),
        ))
    };

    let speech = Arc::new(OpenAiSpeechService::new(
        openai_config,
        config.transcription_model.clone(),
        config.tts_model.clone(),
        config.tts_voice.clone(),
    ));

    let engine = Arc::new(
        InterviewEngine::new(script, judgement, similarity).with_extraction_client(extraction),
    );

    let app_state = Arc::new(AppState {
        engine,
        speech,
        http: reqwest::Client::new(),
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        judgement_model = %config.judgement_model,
        extraction_model = %config.extraction_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
