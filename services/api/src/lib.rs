//! Check-In API Library Crate
//!
//! This library contains all the web-facing logic for the check-in service:
//! the application state, API handlers, realtime token endpoints, speech
//! adapters, and routing. The `api` binary is a thin wrapper around this
//! library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod realtime;
pub mod router;
pub mod speech;
pub mod state;
