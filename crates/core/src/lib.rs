//! Core engine for the impact check-in interview agent: per-session
//! conversation state, the coverage-decision policy that bounds follow-ups,
//! and the trait seams for the external judgement and similarity
//! collaborators. No HTTP types live here; `services/api` is the transport
//! adapter.

pub mod engine;
pub mod guard;
pub mod judgement;
pub mod prompts;
pub mod script;
pub mod session;
pub mod similarity;
