//! External AI service integration for Grantflow
//!
//! All nondeterministic AI calls (answer interpretation, candidate scoring,
//! clarifying-question generation) go through the narrow [`AiClient`] trait
//! so the rest of the system is insulated from third-party latency and
//! availability. Every call site has a mandatory deterministic fallback.

pub mod client;
pub mod http;

pub use client::{AiClient, CompletionRequest};
pub use http::HttpAiClient;
