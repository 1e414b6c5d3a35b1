//! HTTP surface for Grantflow
//!
//! A JSON API over axum. Handlers stay thin: they validate the request
//! shape, call into the session store, flow controller, interpreter, and
//! recommendation service, and map domain errors onto status codes.

use crate::catalog::{ChoiceOption, OptionSource, Question, QuestionCatalog, UserType};
use crate::config::Config;
use crate::error::GrantflowError;
use crate::filter::ConstraintKind;
use crate::flow::{self, FlowStep};
use crate::interpreter::{AnswerInterpreter, AnswerValue};
use crate::profile::UserProfile;
use crate::recommend::RecommendationService;
use crate::storage::{Grant, SqliteStorage};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<SqliteStorage>,
    pub catalog: Arc<QuestionCatalog>,
    pub interpreter: Arc<AnswerInterpreter>,
    pub recommender: Arc<RecommendationService>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/answers", post(submit_answer))
        .route(
            "/sessions/:id/request-more-details",
            post(request_more_details),
        )
        .route("/recommendations/:id", get(get_recommendations))
        .route("/recommendations/:id/feedback", post(submit_feedback))
        .route("/recommendations/:id/rematch", post(rematch))
        .with_state(state)
}

/// Serve the API until shutdown is requested
pub async fn serve(state: AppState, config: &Config) -> crate::error::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

// ---- error mapping ----

/// Wraps domain errors for response conversion
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<GrantflowError>() {
            Some(GrantflowError::SessionNotFound(_))
            | Some(GrantflowError::RecommendationNotFound(_)) => StatusCode::NOT_FOUND,
            Some(GrantflowError::InvalidQuestionId(_)) | Some(GrantflowError::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {:#}", self.0);
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ---- response shapes ----

/// A question as served over the API, options resolved
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub question_id: String,
    pub prompt: String,
    pub kind: crate::catalog::AnswerKind,
    pub options: Vec<ChoiceOption>,
    pub required: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressView {
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: String,
    pub first_question: QuestionView,
}

#[derive(Debug, Serialize)]
pub struct HistoryView {
    pub question_id: String,
    pub question_text: String,
    pub answer: AnswerValue,
    pub answer_label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub user_type: Option<UserType>,
    pub answered_count: u32,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<HistoryView>,
}

#[derive(Debug, Serialize)]
pub struct AnswerAccepted {
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<QuestionView>,
    pub progress: ProgressView,
}

#[derive(Debug, Serialize)]
pub struct MoreDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    /// False once the deep-dive pool is exhausted
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct RecommendationView {
    pub rank: u32,
    pub score: f64,
    pub reasoning: String,
    pub grant: Grant,
    pub feedback_rating: Option<i32>,
    pub feedback_helpful: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsView {
    pub session_id: String,
    pub cached: bool,
    pub relaxed_constraints: Vec<ConstraintKind>,
    pub profile_summary: String,
    pub recommendations: Vec<RecommendationView>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackView {
    pub recorded: bool,
    pub clarifying_questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerBody {
    pub question_id: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub grant_id: String,
    pub rating: i32,
    #[serde(default)]
    pub feedback_text: Option<String>,
    pub is_helpful: bool,
}

// ---- handlers ----

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<SessionCreated> {
    let origin_address = header_str(&headers, "x-forwarded-for")
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());
    let origin_agent = header_str(&headers, "user-agent").map(String::from);

    let session = state
        .storage
        .create_session(origin_address.as_deref(), origin_agent.as_deref())?;
    tracing::info!(session_id = %session.session_id, "Created session");

    let first = match flow::next_question(&state.catalog, None, &HashSet::new()) {
        FlowStep::Ask(q) => q,
        FlowStep::Completed => {
            return Err(GrantflowError::Config("Question catalog is empty".into()).into())
        }
    };
    Ok(Json(SessionCreated {
        session_id: session.session_id,
        first_question: question_view(&state, &first)?,
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionView> {
    let session = state
        .storage
        .get_session(&id)?
        .ok_or(GrantflowError::SessionNotFound(id.clone()))?;
    let history = state.storage.history(&id)?;
    Ok(Json(SessionView {
        session_id: session.session_id,
        user_type: session.user_type,
        answered_count: session.answered_count,
        completed: session.completed,
        created_at: session.created_at,
        updated_at: session.updated_at,
        history: history
            .into_iter()
            .map(|e| HistoryView {
                question_id: e.question_id,
                question_text: e.question_text,
                answer: e.answer,
                answer_label: e.answer_label,
                created_at: e.created_at,
            })
            .collect(),
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    if !state.storage.delete_session(&id)? {
        return Err(GrantflowError::SessionNotFound(id).into());
    }
    tracing::info!(session_id = %id, "Deleted session");
    Ok(StatusCode::NO_CONTENT)
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AnswerBody>,
) -> ApiResult<AnswerAccepted> {
    let session = state
        .storage
        .get_session(&id)?
        .ok_or(GrantflowError::SessionNotFound(id.clone()))?;

    if !flow::is_askable(&state.catalog, session.user_type, &body.question_id) {
        return Err(GrantflowError::InvalidQuestionId(body.question_id).into());
    }
    let question = state
        .catalog
        .get(&body.question_id)
        .ok_or_else(|| GrantflowError::InvalidQuestionId(body.question_id.clone()))?
        .clone();

    let options = resolve_options(&state, &question)?;
    let answer = state
        .interpreter
        .interpret(&question, &options, &body.value)
        .await?;

    let inserted = state.storage.upsert_history(
        &id,
        &question.code,
        &question.prompt,
        &answer.value,
        &answer.label,
    )?;
    if inserted {
        state.storage.record_answer(&id)?;
    }

    let mut user_type = session.user_type;
    if question.code == "user_type" {
        if let Some(parsed) = answer
            .value
            .option_ids()
            .first()
            .and_then(|v| UserType::parse(v))
        {
            state.storage.set_user_type(&id, parsed)?;
            user_type = Some(parsed);
        }
    }

    let answered: HashSet<String> = state
        .storage
        .history(&id)?
        .into_iter()
        .map(|e| e.question_id)
        .collect();
    let progress = flow::progress(&state.catalog, user_type, &answered);

    match flow::next_question(&state.catalog, user_type, &answered) {
        FlowStep::Ask(next) => Ok(Json(AnswerAccepted {
            completed: false,
            next_question: Some(question_view(&state, &next)?),
            progress: ProgressView {
                answered: progress.answered,
                total: progress.total,
            },
        })),
        FlowStep::Completed => Ok(Json(AnswerAccepted {
            completed: true,
            next_question: None,
            progress: ProgressView {
                answered: progress.answered,
                total: progress.total,
            },
        })),
    }
}

async fn request_more_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MoreDetails> {
    let session = state
        .storage
        .get_session(&id)?
        .ok_or(GrantflowError::SessionNotFound(id.clone()))?;
    let answered: HashSet<String> = state
        .storage
        .history(&id)?
        .into_iter()
        .map(|e| e.question_id)
        .collect();

    match flow::next_deep_dive(&state.catalog, session.user_type, &answered) {
        Some(question) => Ok(Json(MoreDetails {
            question: Some(question_view(&state, &question)?),
            available: true,
        })),
        None => Ok(Json(MoreDetails {
            question: None,
            available: false,
        })),
    }
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RecommendationsView> {
    let batch = state.recommender.get_or_compute(&id).await?;
    recommendations_view(&state, id, batch).map(Json)
}

async fn rematch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RecommendationsView> {
    let batch = state.recommender.rematch(&id).await?;
    recommendations_view(&state, id, batch).map(Json)
}

async fn submit_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FeedbackBody>,
) -> ApiResult<FeedbackView> {
    let outcome = state
        .recommender
        .feedback(
            &id,
            &body.grant_id,
            body.rating,
            body.feedback_text.as_deref(),
            body.is_helpful,
        )
        .await?;
    Ok(Json(FeedbackView {
        recorded: true,
        clarifying_questions: outcome.clarifying_questions,
    }))
}

// ---- helpers ----

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn recommendations_view(
    state: &AppState,
    session_id: String,
    batch: crate::recommend::RecommendationBatch,
) -> std::result::Result<RecommendationsView, ApiError> {
    let session = state
        .storage
        .get_session(&session_id)?
        .ok_or_else(|| GrantflowError::SessionNotFound(session_id.clone()))?;
    let history = state.storage.history(&session_id)?;
    let profile = UserProfile::from_history(session.user_type, &history);

    Ok(RecommendationsView {
        session_id,
        cached: batch.cached,
        relaxed_constraints: batch.relaxed,
        profile_summary: profile.summary(),
        recommendations: batch
            .recommendations
            .into_iter()
            .map(|r| RecommendationView {
                rank: r.rank,
                score: r.score,
                reasoning: r.reasoning,
                grant: r.grant,
                feedback_rating: r.feedback_rating,
                feedback_helpful: r.feedback_helpful,
            })
            .collect(),
    })
}

/// Resolve a question's option set for serving
///
/// Named sources reflect live data (`regions` mirrors the corpus tags) and
/// fall back to the built-in list when the corpus has nothing to offer.
fn question_view(
    state: &AppState,
    question: &Question,
) -> std::result::Result<QuestionView, ApiError> {
    let options = resolve_options(state, question)?;
    Ok(QuestionView {
        question_id: question.code.clone(),
        prompt: question.prompt.clone(),
        kind: question.kind,
        options,
        required: question.required,
    })
}

fn resolve_options(
    state: &AppState,
    question: &Question,
) -> std::result::Result<Vec<ChoiceOption>, ApiError> {
    match &question.options {
        OptionSource::None => Ok(Vec::new()),
        OptionSource::Static(opts) => Ok(opts.clone()),
        OptionSource::Named(name) => {
            let resolved = match name.as_str() {
                "regions" => state
                    .storage
                    .distinct_regions()?
                    .into_iter()
                    .map(|id| {
                        let label = option_label(&id);
                        ChoiceOption::new(id, label)
                    })
                    .collect(),
                _ => Vec::new(),
            };
            if resolved.is_empty() {
                Ok(QuestionCatalog::fallback_options(name))
            } else {
                Ok(resolved)
            }
        }
    }
}

/// Display label for a tag-derived option id
fn option_label(id: &str) -> String {
    let spaced = id.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}
