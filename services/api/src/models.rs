//! API Models
//!
//! Request and response bodies for the REST surface, doubling as the schema
//! source for the generated OpenAPI documentation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct CreateSessionResponse {
    #[schema(example = "b0f4d3d2a6f54c8e9d5d0c2b1a7f6e5d")]
    pub session_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct CoverageResponse {
    /// Whether the question is already considered answered by earlier turns.
    pub covered: bool,
    /// Best supporting quote for the coverage, empty when not covered.
    pub evidence: String,
}

#[derive(Deserialize, ToSchema)]
pub struct TextSubmitPayload {
    pub session_id: String,
    #[schema(example = 0)]
    pub question_index: usize,
    #[schema(example = "I tried the new weekly template")]
    pub response: String,
    #[serde(default)]
    pub follow_up_count: u32,
}

/// The outcome of one answer submission, shared by the text and voice paths.
#[derive(Serialize, ToSchema)]
pub struct SubmitResponse {
    /// Transcript of the uploaded audio; absent for text submissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    /// Final status after guard correction: done, needs_follow_up,
    /// already_covered, or move_on.
    #[schema(example = "done")]
    pub status: String,
    pub reason: String,
    pub follow_up: String,
    /// Base64 mp3 of the follow-up prompt; empty when synthesis degraded or
    /// no follow-up was issued. Absent for text submissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_audio: Option<String>,
    pub transition_text: String,
    pub summary: String,
    pub covered_future_indices: Vec<usize>,
    #[schema(value_type = Object, nullable = true)]
    pub structured: Option<Value>,
    pub done: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct ExtractPayload {
    pub main_question: String,
    pub full_response: String,
}

#[derive(Deserialize, ToSchema)]
pub struct TokenRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub question_index: usize,
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: i64,
    pub model: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SyncRequest {
    pub session_id: String,
    pub question_index: usize,
    #[serde(default)]
    pub user_text: String,
    #[serde(default)]
    pub ai_text: String,
}

#[derive(Serialize, ToSchema)]
pub struct SyncResponse {
    pub ok: bool,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub api_key_configured: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_submit_payload_defaults_follow_up_count() {
        let json = r#"{"session_id": "abc", "question_index": 1, "response": "hello"}"#;
        let payload: TextSubmitPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.session_id, "abc");
        assert_eq!(payload.question_index, 1);
        assert_eq!(payload.follow_up_count, 0);
    }

    #[test]
    fn text_submit_payload_requires_response() {
        let json = r#"{"session_id": "abc", "question_index": 1}"#;
        let result: Result<TextSubmitPayload, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn submit_response_omits_voice_fields_for_text() {
        let response = SubmitResponse {
            transcript: None,
            status: "done".to_string(),
            reason: "specific".to_string(),
            follow_up: String::new(),
            follow_up_audio: None,
            transition_text: "Next question: What happened?".to_string(),
            summary: "Summary".to_string(),
            covered_future_indices: vec![1],
            structured: None,
            done: true,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("transcript"));
        assert!(!json.contains("follow_up_audio"));
        assert!(json.contains("\"covered_future_indices\":[1]"));
    }

    #[test]
    fn sync_request_texts_default_to_empty() {
        let json = r#"{"session_id": "abc", "question_index": 2}"#;
        let request: SyncRequest = serde_json::from_str(json).unwrap();
        assert!(request.user_text.is_empty());
        assert!(request.ai_text.is_empty());
    }

    #[test]
    fn token_request_defaults() {
        let request: TokenRequest = serde_json::from_str("{}").unwrap();
        assert!(request.session_id.is_empty());
        assert_eq!(request.question_index, 0);
    }

    #[test]
    fn error_response_serialization() {
        let error = ErrorResponse {
            message: "Response cannot be empty".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"message":"Response cannot be empty"}"#
        );
    }
}
