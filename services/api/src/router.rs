//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, realtime token endpoints, and OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{
        CoverageResponse, CreateSessionResponse, ErrorResponse, ExtractPayload, HealthResponse,
        SubmitResponse, SyncRequest, SyncResponse, TextSubmitPayload, TokenRequest, TokenResponse,
    },
    realtime,
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_session,
        handlers::get_questions,
        handlers::question_coverage,
        handlers::text_submit,
        handlers::voice_submit,
        handlers::extract,
        handlers::health,
        realtime::create_realtime_token,
        realtime::sync_transcript,
    ),
    components(
        schemas(
            CreateSessionResponse,
            CoverageResponse,
            TextSubmitPayload,
            SubmitResponse,
            ExtractPayload,
            TokenRequest,
            TokenResponse,
            SyncRequest,
            SyncResponse,
            HealthResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "Check-In API", description = "Multi-question impact check-in over text and voice")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route("/api/checkin/sessions", post(handlers::create_session))
        .route("/api/checkin/questions", get(handlers::get_questions))
        .route(
            "/api/checkin/sessions/{id}/coverage/{question_idx}",
            get(handlers::question_coverage),
        )
        .route("/api/checkin/text-submit", post(handlers::text_submit))
        .route("/api/checkin/voice-submit", post(handlers::voice_submit))
        .route("/api/checkin/extract", post(handlers::extract))
        .route("/api/realtime/token", post(realtime::create_realtime_token))
        .route("/api/realtime/sync", post(realtime::sync_transcript))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Merge the stateful routes with the stateless Swagger UI.
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
