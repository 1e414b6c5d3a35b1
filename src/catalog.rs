//! Immutable question catalog for Grantflow
//!
//! The catalog is defined once in configuration (or falls back to the
//! built-in default) and is never mutated at runtime. Each question carries
//! a branch-eligibility audience so the flow controller can compute the
//! active pool for a session's user type.

use crate::error::{GrantflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Coarse user classification set by the first profiling question
///
/// Drives branch eligibility: corporate-only and individual-only questions
/// are merged into the base pool once the user type is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Corporate,
    Individual,
}

impl UserType {
    /// Parse a user type from an option id submitted as an answer
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "corporate" => Some(Self::Corporate),
            "individual" => Some(Self::Individual),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Corporate => write!(f, "corporate"),
            Self::Individual => write!(f, "individual"),
        }
    }
}

/// Which user types see a question
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    #[default]
    All,
    Corporate,
    Individual,
}

impl Audience {
    /// Whether a session with the given (possibly unknown) user type sees
    /// questions with this audience
    ///
    /// Before the user type is known only `All` questions are visible, which
    /// guarantees the profiling question is asked first.
    pub fn visible_to(&self, user_type: Option<UserType>) -> bool {
        match self {
            Self::All => true,
            Self::Corporate => user_type == Some(UserType::Corporate),
            Self::Individual => user_type == Some(UserType::Individual),
        }
    }
}

/// Expected answer shape for a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Exactly one option id
    SingleChoice,
    /// One or more option ids
    MultiChoice,
    /// Short free text (no interpretation target)
    FreeText,
    /// Long free text, stored verbatim, never interpreted
    LongText,
}

/// One selectable option of a choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Stable option id stored in answers
    pub id: String,
    /// Display label shown to the user
    pub label: String,
}

impl ChoiceOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Where a question's option set comes from
///
/// `Named` sources are resolved at serve time (for example `regions`, which
/// reflects the region tags present in the grant corpus). Free-text
/// questions carry no options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSource {
    #[default]
    None,
    Static(Vec<ChoiceOption>),
    Named(String),
}

/// One question definition from the catalog
///
/// Read-only at runtime; the catalog is loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Stable question code, also the key in conversation history
    pub code: String,
    /// Prompt text shown to the user
    pub prompt: String,
    /// Expected answer shape
    pub kind: AnswerKind,
    /// Option set for choice questions
    #[serde(default)]
    pub options: OptionSource,
    /// Required questions are served before optional ones
    #[serde(default)]
    pub required: bool,
    /// Branch eligibility
    #[serde(default)]
    pub audience: Audience,
    /// Relative importance weight carried with the catalog entry; part of
    /// the catalog schema, not consumed by the matching pipeline
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Deep-dive questions are only served via the explicit
    /// request-more-details extension
    #[serde(default)]
    pub deep_dive: bool,
}

fn default_weight() -> f64 {
    1.0
}

impl Question {
    /// Static options, if this question carries an inline option list
    pub fn static_options(&self) -> Option<&[ChoiceOption]> {
        match &self.options {
            OptionSource::Static(opts) => Some(opts),
            _ => None,
        }
    }
}

/// The immutable question catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionCatalog {
    pub questions: Vec<Question>,
}

impl QuestionCatalog {
    /// Load a catalog from a YAML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if the
    /// catalog fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| GrantflowError::Config(format!("Failed to read catalog file: {}", e)))?;
        let catalog: Self = serde_yaml::from_str(&text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Validate catalog integrity: non-empty, unique codes, choice
    /// questions carry an option source
    pub fn validate(&self) -> Result<()> {
        if self.questions.is_empty() {
            return Err(GrantflowError::Config("Catalog has no questions".into()).into());
        }
        let mut seen = std::collections::HashSet::new();
        for q in &self.questions {
            if !seen.insert(q.code.as_str()) {
                return Err(GrantflowError::Config(format!(
                    "Duplicate question code: {}",
                    q.code
                ))
                .into());
            }
            let is_choice = matches!(q.kind, AnswerKind::SingleChoice | AnswerKind::MultiChoice);
            if is_choice && matches!(q.options, OptionSource::None) {
                return Err(GrantflowError::Config(format!(
                    "Choice question {} has no options",
                    q.code
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Look up a question by its code
    pub fn get(&self, code: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.code == code)
    }

    /// The primary question pool for a session, in catalog order
    ///
    /// Base questions plus the branch questions visible to the user type.
    /// Deep-dive questions are excluded; they belong to
    /// [`QuestionCatalog::deep_dive_pool`].
    pub fn primary_pool(&self, user_type: Option<UserType>) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|q| !q.deep_dive && q.audience.visible_to(user_type))
            .collect()
    }

    /// The secondary deep-dive pool, served only on explicit request
    pub fn deep_dive_pool(&self, user_type: Option<UserType>) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|q| q.deep_dive && q.audience.visible_to(user_type))
            .collect()
    }

    /// Fallback options for a named dynamic source
    ///
    /// Used when the dynamic source has nothing to offer (for example an
    /// empty grant corpus for `regions`).
    pub fn fallback_options(name: &str) -> Vec<ChoiceOption> {
        match name {
            "regions" => vec![
                ChoiceOption::new("tokyo", "Tokyo"),
                ChoiceOption::new("osaka", "Osaka"),
                ChoiceOption::new("aichi", "Aichi"),
                ChoiceOption::new("fukuoka", "Fukuoka"),
                ChoiceOption::new("hokkaido", "Hokkaido"),
                ChoiceOption::new("nationwide", "Nationwide"),
            ],
            _ => Vec::new(),
        }
    }
}

impl Default for QuestionCatalog {
    /// The built-in default catalog
    ///
    /// Profiling first, then the filtering dimensions, branch questions per
    /// user type, an optional notes field, and a small deep-dive pool.
    fn default() -> Self {
        let questions = vec![
            Question {
                code: "user_type".into(),
                prompt: "Are you applying as a company or as an individual?".into(),
                kind: AnswerKind::SingleChoice,
                options: OptionSource::Static(vec![
                    ChoiceOption::new("corporate", "A company or other corporation"),
                    ChoiceOption::new("individual", "An individual or sole proprietor"),
                ]),
                required: true,
                audience: Audience::All,
                weight: 1.0,
                deep_dive: false,
            },
            Question {
                code: "region".into(),
                prompt: "Where is your business located?".into(),
                kind: AnswerKind::SingleChoice,
                options: OptionSource::Named("regions".into()),
                required: true,
                audience: Audience::All,
                weight: 1.0,
                deep_dive: false,
            },
            Question {
                code: "purpose".into(),
                prompt: "What do you want to use the funding for? Select all that apply.".into(),
                kind: AnswerKind::MultiChoice,
                options: OptionSource::Static(vec![
                    ChoiceOption::new("it", "IT and digitalization"),
                    ChoiceOption::new("equipment", "Equipment and facilities"),
                    ChoiceOption::new("hiring", "Hiring and training"),
                    ChoiceOption::new("rnd", "Research and development"),
                    ChoiceOption::new("marketing", "Sales and marketing"),
                    ChoiceOption::new("sustainability", "Energy saving and sustainability"),
                    ChoiceOption::new("startup", "Starting a new business"),
                ]),
                required: true,
                audience: Audience::All,
                weight: 1.2,
                deep_dive: false,
            },
            Question {
                code: "budget".into(),
                prompt: "Roughly how much funding are you looking for?".into(),
                kind: AnswerKind::SingleChoice,
                options: OptionSource::Static(vec![
                    ChoiceOption::new("under_1m", "Under 1 million yen"),
                    ChoiceOption::new("1m_to_5m", "1 to 5 million yen"),
                    ChoiceOption::new("5m_to_10m", "5 to 10 million yen"),
                    ChoiceOption::new("over_10m", "Over 10 million yen"),
                    ChoiceOption::new("unspecified", "Not decided yet"),
                ]),
                required: true,
                audience: Audience::All,
                weight: 0.8,
                deep_dive: false,
            },
            Question {
                code: "urgency".into(),
                prompt: "How soon do you need to apply?".into(),
                kind: AnswerKind::SingleChoice,
                options: OptionSource::Static(vec![
                    ChoiceOption::new("within_1_month", "Within a month"),
                    ChoiceOption::new("within_3_months", "Within three months"),
                    ChoiceOption::new("within_6_months", "Within six months"),
                    ChoiceOption::new("anytime", "No particular deadline"),
                ]),
                required: true,
                audience: Audience::All,
                weight: 0.8,
                deep_dive: false,
            },
            Question {
                code: "company_size".into(),
                prompt: "How many employees does your company have?".into(),
                kind: AnswerKind::SingleChoice,
                options: OptionSource::Static(vec![
                    ChoiceOption::new("1_to_5", "1 to 5"),
                    ChoiceOption::new("6_to_20", "6 to 20"),
                    ChoiceOption::new("21_to_100", "21 to 100"),
                    ChoiceOption::new("over_100", "More than 100"),
                ]),
                required: true,
                audience: Audience::Corporate,
                weight: 0.6,
                deep_dive: false,
            },
            Question {
                code: "business_registration".into(),
                prompt: "What is your business registration status?".into(),
                kind: AnswerKind::SingleChoice,
                options: OptionSource::Static(vec![
                    ChoiceOption::new("sole_proprietor", "Registered sole proprietor"),
                    ChoiceOption::new("planning_to_register", "Planning to register"),
                    ChoiceOption::new("not_registered", "Not registered"),
                ]),
                required: true,
                audience: Audience::Individual,
                weight: 0.6,
                deep_dive: false,
            },
            Question {
                code: "notes".into(),
                prompt: "Anything else we should know about your plans? (optional)".into(),
                kind: AnswerKind::LongText,
                options: OptionSource::None,
                required: false,
                audience: Audience::All,
                weight: 0.5,
                deep_dive: false,
            },
            Question {
                code: "challenges".into(),
                prompt: "What are the biggest challenges your business is facing right now?"
                    .into(),
                kind: AnswerKind::LongText,
                options: OptionSource::None,
                required: false,
                audience: Audience::All,
                weight: 0.5,
                deep_dive: true,
            },
            Question {
                code: "past_grants".into(),
                prompt: "Have you received a grant or subsidy before?".into(),
                kind: AnswerKind::SingleChoice,
                options: OptionSource::Static(vec![
                    ChoiceOption::new("yes", "Yes"),
                    ChoiceOption::new("no", "No"),
                ]),
                required: false,
                audience: Audience::All,
                weight: 0.4,
                deep_dive: true,
            },
        ];
        Self { questions }
    }
}
