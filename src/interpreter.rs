//! Answer interpretation for Grantflow
//!
//! Converts raw submitted values into normalized, typed answer values.
//! Structured selections are accepted verbatim; natural-language text
//! submitted against a closed option set is mapped through the AI channel.
//! AI failures never dead-end the conversation: the literal text is kept,
//! tagged uninterpreted.

use crate::ai::{AiClient, CompletionRequest};
use crate::catalog::{AnswerKind, ChoiceOption, Question};
use crate::error::{GrantflowError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Normalized answer value with a stored discriminant
///
/// Downstream profile derivation dispatches on the tag and never relies on
/// runtime type inspection of the raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerValue {
    /// One structured selection
    Choice { option: String },
    /// Multiple structured selections
    MultiChoice { options: Vec<String> },
    /// AI-mapped selection(s) from natural-language input
    Interpreted { options: Vec<String>, confidence: f64 },
    /// Literal free text (open questions, or interpretation fallback)
    FreeText { text: String },
}

impl AnswerValue {
    /// Option ids carried by this value, empty for free text
    pub fn option_ids(&self) -> Vec<&str> {
        match self {
            Self::Choice { option } => vec![option.as_str()],
            Self::MultiChoice { options } | Self::Interpreted { options, .. } => {
                options.iter().map(|s| s.as_str()).collect()
            }
            Self::FreeText { .. } => Vec::new(),
        }
    }

    /// Literal text, if this is a free-text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::FreeText { text } => Some(text.as_str()),
            _ => None,
        }
    }
}

/// A normalized answer plus its display label
#[derive(Debug, Clone, PartialEq)]
pub struct InterpretedAnswer {
    pub value: AnswerValue,
    pub label: String,
}

/// Shape of the AI mapping response
#[derive(Debug, Deserialize)]
struct MappingResponse {
    #[serde(default)]
    options: Vec<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

/// Converts raw submitted values into normalized answers
pub struct AnswerInterpreter {
    ai: Arc<dyn AiClient>,
}

impl AnswerInterpreter {
    /// Create a new interpreter backed by the given AI client
    pub fn new(ai: Arc<dyn AiClient>) -> Self {
        Self { ai }
    }

    /// Normalize a raw submitted value against a question definition
    ///
    /// `options` is the question's option set resolved at serve time.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for payloads whose JSON shape cannot belong to
    /// the question (wrong JSON type, empty input, unknown structured ids).
    /// AI unavailability is not an error: it degrades to literal text.
    pub async fn interpret(
        &self,
        question: &Question,
        options: &[ChoiceOption],
        raw: &serde_json::Value,
    ) -> Result<InterpretedAnswer> {
        match question.kind {
            AnswerKind::FreeText | AnswerKind::LongText => {
                let text = as_nonempty_string(raw)?;
                Ok(InterpretedAnswer {
                    label: text.clone(),
                    value: AnswerValue::FreeText { text },
                })
            }
            AnswerKind::SingleChoice => self.interpret_single(question, options, raw).await,
            AnswerKind::MultiChoice => self.interpret_multi(question, options, raw).await,
        }
    }

    async fn interpret_single(
        &self,
        question: &Question,
        options: &[ChoiceOption],
        raw: &serde_json::Value,
    ) -> Result<InterpretedAnswer> {
        let text = as_nonempty_string(raw)?;
        if let Some(opt) = options.iter().find(|o| o.id == text) {
            return Ok(InterpretedAnswer {
                label: opt.label.clone(),
                value: AnswerValue::Choice {
                    option: opt.id.clone(),
                },
            });
        }
        // Natural language where a choice was expected.
        Ok(self.map_via_ai(question, options, &text, false).await)
    }

    async fn interpret_multi(
        &self,
        question: &Question,
        options: &[ChoiceOption],
        raw: &serde_json::Value,
    ) -> Result<InterpretedAnswer> {
        if let Some(items) = raw.as_array() {
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                let id = item.as_str().ok_or_else(|| {
                    GrantflowError::Validation(format!(
                        "Answer for {} must be an array of strings",
                        question.code
                    ))
                })?;
                if !options.iter().any(|o| o.id == id) {
                    return Err(GrantflowError::Validation(format!(
                        "Unknown option id for {}: {}",
                        question.code, id
                    ))
                    .into());
                }
                ids.push(id.to_string());
            }
            if ids.is_empty() {
                return Err(GrantflowError::Validation(format!(
                    "Answer for {} must not be empty",
                    question.code
                ))
                .into());
            }
            let label = label_for_ids(options, &ids);
            return Ok(InterpretedAnswer {
                label,
                value: AnswerValue::MultiChoice { options: ids },
            });
        }

        let text = as_nonempty_string(raw)?;
        Ok(self.map_via_ai(question, options, &text, true).await)
    }

    /// Map free text onto the closed option set via the AI channel
    ///
    /// Never fails: on AI error, timeout, or an unusable mapping the literal
    /// text is stored tagged uninterpreted and the flow continues.
    async fn map_via_ai(
        &self,
        question: &Question,
        options: &[ChoiceOption],
        text: &str,
        multi: bool,
    ) -> InterpretedAnswer {
        let request = mapping_request(question, options, text, multi);
        match self.ai.complete(&request).await {
            Ok(response) => match parse_mapping(&response, options, multi) {
                Some((ids, confidence)) => {
                    let label = label_for_ids(options, &ids);
                    InterpretedAnswer {
                        label,
                        value: AnswerValue::Interpreted {
                            options: ids,
                            confidence,
                        },
                    }
                }
                None => {
                    tracing::warn!(
                        question = %question.code,
                        "AI mapping returned no usable options, storing literal text"
                    );
                    literal_fallback(text)
                }
            },
            Err(e) => {
                tracing::warn!(
                    question = %question.code,
                    "AI interpretation unavailable ({}), storing literal text",
                    e
                );
                literal_fallback(text)
            }
        }
    }
}

/// Build the mapping prompt for one free-text answer
fn mapping_request(
    question: &Question,
    options: &[ChoiceOption],
    text: &str,
    multi: bool,
) -> CompletionRequest {
    let option_list = options
        .iter()
        .map(|o| format!("- {} ({})", o.id, o.label))
        .collect::<Vec<_>>()
        .join("\n");
    let cardinality = if multi {
        "one or more option ids"
    } else {
        "exactly one option id"
    };
    let system = format!(
        "You map a user's free-text answer onto a closed option set. \
         Respond with JSON only, no prose: \
         {{\"options\": [{}], \"confidence\": <0.0-1.0>}}. \
         Pick {} from the listed ids. If nothing fits, return an empty array.",
        "\"<option_id>\"", cardinality
    );
    let user = format!(
        "Question: {}\nOptions:\n{}\nUser answer: {}",
        question.prompt, option_list, text
    );
    CompletionRequest::new(system, user)
}

/// Parse the AI mapping response, keeping only ids from the option set
fn parse_mapping(
    response: &str,
    options: &[ChoiceOption],
    multi: bool,
) -> Option<(Vec<String>, f64)> {
    let json = extract_json(response)?;
    let parsed: MappingResponse = serde_json::from_str(json).ok()?;
    let mut ids: Vec<String> = parsed
        .options
        .into_iter()
        .filter(|id| options.iter().any(|o| &o.id == id))
        .collect();
    ids.dedup();
    if ids.is_empty() {
        return None;
    }
    if !multi {
        ids.truncate(1);
    }
    Some((ids, parsed.confidence.clamp(0.0, 1.0)))
}

/// Extract the first JSON object from a response that may carry code fences
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn literal_fallback(text: &str) -> InterpretedAnswer {
    InterpretedAnswer {
        label: text.to_string(),
        value: AnswerValue::FreeText {
            text: text.to_string(),
        },
    }
}

fn label_for_ids(options: &[ChoiceOption], ids: &[String]) -> String {
    ids.iter()
        .map(|id| {
            options
                .iter()
                .find(|o| &o.id == id)
                .map(|o| o.label.clone())
                .unwrap_or_else(|| id.clone())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn as_nonempty_string(raw: &serde_json::Value) -> Result<String> {
    let text = raw
        .as_str()
        .ok_or_else(|| GrantflowError::Validation("Answer value must be a string".to_string()))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GrantflowError::Validation("Answer value must not be empty".to_string()).into());
    }
    Ok(trimmed.to_string())
}
