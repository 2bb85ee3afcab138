//! Realtime Voice Handlers
//!
//! Mints ephemeral tokens for the browser's realtime voice connection and
//! syncs finished voice turns back into the session transcript. The server
//! never proxies the audio itself; it only prepares instructions and keeps
//! the conversation state authoritative.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use checkin_core::{prompts, session::Role};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    config::Config,
    models::{ErrorResponse, SyncRequest, SyncResponse, TokenRequest, TokenResponse},
    state::AppState,
};

const REALTIME_SESSIONS_URL: &str = "https://api.openai.com/v1/realtime/sessions";

/// The realtime session creation payload. Input transcription is what gives
/// `/api/realtime/sync` user text to record; the tools are the voice
/// channel's only way to mark progress.
fn session_payload(config: &Config, instructions: &str) -> serde_json::Value {
    json!({
        "model": config.realtime_model,
        "voice": config.realtime_voice,
        "instructions": instructions,
        "modalities": ["text", "audio"],
        "turn_detection": {
            "type": "server_vad",
            "threshold": 0.5,
            "prefix_padding_ms": 300,
            "silence_duration_ms": 800
        },
        "input_audio_transcription": {
            "model": config.transcription_model
        },
        "tools": [
            {
                "type": "function",
                "name": "update_progress",
                "description": "Call this EVERY TIME you finish getting a satisfactory answer for a main question. This updates the progress bar.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "question_index": {
                            "type": "integer",
                            "description": "0-based index of the completed question"
                        },
                        "summary": {
                            "type": "string",
                            "description": "2-3 sentence summary of what the participant said"
                        }
                    },
                    "required": ["question_index", "summary"]
                }
            },
            {
                "type": "function",
                "name": "complete_checkin",
                "description": "Call this when ALL main questions have been answered and the check-in is complete.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "summaries": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Summary for each completed question"
                        }
                    },
                    "required": ["summaries"]
                }
            }
        ]
    })
}

/// Mint an ephemeral realtime token with session-aware instructions.
#[utoipa::path(
    post,
    path = "/api/realtime/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Ephemeral token for the realtime connection", body = TokenResponse),
        (status = 502, description = "Upstream token mint failed", body = ErrorResponse)
    )
)]
pub async fn create_realtime_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TokenRequest>,
) -> Response {
    let context = state.engine.render_context(&request.session_id).await;
    let completed = state.engine.completed_questions(&request.session_id).await;
    let pending = state.engine.pending_follow_up(&request.session_id).await;

    let instructions = prompts::render_realtime_instructions(
        &context,
        request.question_index,
        &completed,
        pending.as_ref().map(|p| p.text.as_str()),
    );

    let payload = session_payload(&state.config, &instructions);

    let response = match state
        .http
        .post(REALTIME_SESSIONS_URL)
        .bearer_auth(&state.config.openai_api_key)
        .json(&payload)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!("Realtime token request failed: {e:#}");
            return upstream_error("Could not reach the realtime token service");
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!(%status, %body, "Realtime token mint rejected");
        return upstream_error("Realtime token mint was rejected upstream");
    }

    let body: serde_json::Value = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            error!("Realtime token response was not JSON: {e:#}");
            return upstream_error("Realtime token response was malformed");
        }
    };

    let token = body["client_secret"]["value"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let expires_at = body["client_secret"]["expires_at"].as_i64().unwrap_or(0);
    if token.is_empty() {
        error!("Realtime token response carried no client secret");
        return upstream_error("Realtime token response was malformed");
    }

    info!(
        session_id = %request.session_id,
        question_index = request.question_index,
        "Realtime token minted"
    );
    Json(TokenResponse {
        token,
        expires_at,
        model: state.config.realtime_model.clone(),
    })
    .into_response()
}

fn upstream_error(message: &str) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Sync one finished realtime exchange into the session transcript.
#[utoipa::path(
    post,
    path = "/api/realtime/sync",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Turns recorded", body = SyncResponse)
    )
)]
pub async fn sync_transcript(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> Json<SyncResponse> {
    // AI first so the transcript reads prompt-then-reply.
    state
        .engine
        .record_dialogue(
            &request.session_id,
            request.question_index,
            Role::Ai,
            &request.ai_text,
        )
        .await;
    state
        .engine
        .record_dialogue(
            &request.session_id,
            request.question_index,
            Role::User,
            &request.user_text,
        )
        .await;

    // A spoken reply answers the follow-up that was waiting on this question.
    if !request.user_text.trim().is_empty() {
        state
            .engine
            .clear_pending(&request.session_id, Some(request.question_index))
            .await;
    }

    Json(SyncResponse { ok: true })
}
