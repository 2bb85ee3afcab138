//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for the check-in
//! flow. It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    models::{
        CoverageResponse, CreateSessionResponse, ErrorResponse, ExtractPayload, HealthResponse,
        SubmitResponse, TextSubmitPayload,
    },
    state::AppState,
};

/// Audio uploads shorter than this are rejected before transcription.
const MIN_AUDIO_BYTES: usize = 500;

pub enum ApiError {
    BadRequest(String),
    UnprocessableEntity(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::UnprocessableEntity(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse { message }),
            )
                .into_response(),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Create a new check-in session.
#[utoipa::path(
    post,
    path = "/api/checkin/sessions",
    responses(
        (status = 201, description = "Session created successfully", body = CreateSessionResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state.engine.create_session().await;
    info!(%session_id, "Session created");
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

/// List the interview questions in order.
#[utoipa::path(
    get,
    path = "/api/checkin/questions",
    responses(
        (status = 200, description = "The ordered question list", body = [String])
    )
)]
pub async fn get_questions(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.engine.script().questions.clone())
}

/// Check whether a question is already covered by earlier conversation.
#[utoipa::path(
    get,
    path = "/api/checkin/sessions/{id}/coverage/{question_idx}",
    responses(
        (status = 200, description = "Coverage status for the question", body = CoverageResponse)
    ),
    params(
        ("id" = String, Path, description = "Session ID"),
        ("question_idx" = usize, Path, description = "0-based question index")
    )
)]
pub async fn question_coverage(
    State(state): State<Arc<AppState>>,
    Path((id, question_idx)): Path<(String, usize)>,
) -> Json<CoverageResponse> {
    let status = state.engine.question_coverage(&id, question_idx).await;
    Json(CoverageResponse {
        covered: status.covered,
        evidence: status.evidence,
    })
}

/// Submit a typed answer for judgement.
#[utoipa::path(
    post,
    path = "/api/checkin/text-submit",
    request_body = TextSubmitPayload,
    responses(
        (status = 200, description = "Judgement outcome for the answer", body = SubmitResponse),
        (status = 400, description = "Empty response", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn text_submit(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TextSubmitPayload>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let response = payload.response.trim().to_string();
    if response.is_empty() {
        return Err(ApiError::BadRequest("Response cannot be empty".to_string()));
    }

    let outcome = state
        .engine
        .submit_answer(
            &payload.session_id,
            payload.question_index,
            &response,
            payload.follow_up_count,
        )
        .await;

    Ok(Json(SubmitResponse {
        transcript: None,
        status: outcome.status.to_string(),
        reason: outcome.reason,
        follow_up: outcome.follow_up,
        follow_up_audio: None,
        transition_text: outcome.transition_text,
        summary: outcome.summary,
        covered_future_indices: outcome.covered_future_indices,
        structured: outcome.structured,
        done: outcome.done,
    }))
}

/// Submit a recorded answer: transcribe, judge, and voice the follow-up.
#[utoipa::path(
    post,
    path = "/api/checkin/voice-submit",
    request_body(content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Judgement outcome with transcript and follow-up audio", body = SubmitResponse),
        (status = 400, description = "Missing or too-short audio", body = ErrorResponse),
        (status = 422, description = "Audio produced an empty transcript", body = ErrorResponse),
        (status = 500, description = "Transcription failed", body = ErrorResponse)
    )
)]
pub async fn voice_submit(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut audio: Option<(String, Vec<u8>)> = None;
    let mut session_id = String::new();
    let mut question_index: usize = 0;
    let mut follow_up_count: u32 = 0;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let filename = field
                    .file_name()
                    .unwrap_or("recording.webm")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Could not read audio: {e}")))?;
                audio = Some((filename, bytes.to_vec()));
            }
            "session_id" => {
                session_id = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid session_id: {e}")))?;
            }
            "question_index" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid question_index: {e}")))?;
                question_index = text.trim().parse().map_err(|_| {
                    ApiError::BadRequest(format!("question_index must be an integer, got '{text}'"))
                })?;
            }
            "follow_up_count" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid follow_up_count: {e}")))?;
                follow_up_count = text.trim().parse().unwrap_or(0);
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        audio.ok_or_else(|| ApiError::BadRequest("Missing audio field".to_string()))?;
    if bytes.len() < MIN_AUDIO_BYTES {
        return Err(ApiError::BadRequest(
            "Audio too short - please speak for at least 1 second".to_string(),
        ));
    }

    let transcript = state.speech.transcribe(bytes, &filename).await?;
    if transcript.is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "Could not understand the audio - please try again".to_string(),
        ));
    }

    let outcome = state
        .engine
        .submit_answer(&session_id, question_index, &transcript, follow_up_count)
        .await;

    // Synthesis degrades to text-only: a failed TTS call never fails the turn.
    let follow_up_audio = if outcome.follow_up.is_empty() {
        String::new()
    } else {
        match state.speech.synthesize(&outcome.follow_up).await {
            Ok(bytes) => BASE64.encode(bytes),
            Err(e) => {
                warn!("Follow-up synthesis failed, returning text only: {e:#}");
                String::new()
            }
        }
    };

    Ok(Json(SubmitResponse {
        transcript: Some(transcript),
        status: outcome.status.to_string(),
        reason: outcome.reason,
        follow_up: outcome.follow_up,
        follow_up_audio: Some(follow_up_audio),
        transition_text: outcome.transition_text,
        summary: outcome.summary,
        covered_future_indices: outcome.covered_future_indices,
        structured: outcome.structured,
        done: outcome.done,
    }))
}

/// Extract structured impact data from a finished answer.
#[utoipa::path(
    post,
    path = "/api/checkin/extract",
    request_body = ExtractPayload,
    responses(
        (status = 200, description = "Structured data, or null when extraction degraded", body = Object)
    )
)]
pub async fn extract(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExtractPayload>,
) -> Json<serde_json::Value> {
    let structured = state
        .engine
        .extract_structured(&payload.main_question, &payload.full_response)
        .await;
    Json(structured.unwrap_or(serde_json::Value::Null))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        api_key_configured: !state.config.openai_api_key.is_empty(),
    })
}

pub async fn root() -> &'static str {
    "Impact Check-In API"
}
