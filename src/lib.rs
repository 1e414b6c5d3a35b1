//! # Grantflow
//!
//! A conversational grant and subsidy matching service. Users answer a
//! branching questionnaire, their answers are folded into a structured
//! profile, and the grant corpus is matched in two stages: rule-based
//! filtering with progressive constraint relaxation, then AI relevance
//! scoring with a deterministic neutral fallback. Ranked batches are
//! cached per session and refined through a feedback loop.
//!
//! ## Architecture
//!
//! - [`catalog`] - immutable question catalog with audience branching
//! - [`flow`] - pure next-question selection over the catalog
//! - [`interpreter`] - normalizes raw answers, AI-mapping free text
//! - [`profile`] - derives the structured matching profile from history
//! - [`filter`] - rule-based candidate filtering with relaxation
//! - [`scorer`] - AI relevance scoring and deterministic ranking
//! - [`recommend`] - batch caching, rematch, and the feedback loop
//! - [`storage`] - SQLite persistence for sessions, history, and results
//! - [`server`] - the JSON HTTP API
//! - [`ai`] - the narrow client interface to the external AI service
//!
//! ## Example
//!
//! ```no_run
//! use grantflow::catalog::QuestionCatalog;
//! use grantflow::flow;
//! use std::collections::HashSet;
//!
//! let catalog = QuestionCatalog::default();
//! let step = flow::next_question(&catalog, None, &HashSet::new());
//! assert!(!step.is_completed());
//! ```

pub mod ai;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod flow;
pub mod interpreter;
pub mod profile;
pub mod recommend;
pub mod scorer;
pub mod server;
pub mod storage;

pub use error::{GrantflowError, Result};
