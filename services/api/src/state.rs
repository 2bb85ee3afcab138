//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the interview engine and service clients.

use crate::config::Config;
use crate::speech::SpeechService;
use checkin_core::engine::InterviewEngine;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InterviewEngine>,
    pub speech: Arc<dyn SpeechService>,
    /// Plain HTTP client for the realtime ephemeral-token call.
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}
