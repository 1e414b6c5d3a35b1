//! Configuration for Grantflow
//!
//! Loaded from a YAML file when one is given (or found in the default
//! location), otherwise every section falls back to built-in defaults.
//! Command-line flags override file values in `main`.

use crate::error::{GrantflowError, Result};
use crate::filter::{default_relaxation_order, ConstraintKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Database file path; None uses the platform data directory
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Question catalog file; None uses the built-in catalog
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// External AI service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_seconds() -> u64 {
    20
}

fn default_api_key_env() -> String {
    "GRANTFLOW_AI_API_KEY".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            timeout_seconds: default_timeout_seconds(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// Matching pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Recommendation batch size bound
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Order in which filter constraints relax on empty results
    #[serde(default = "default_relaxation_order")]
    pub relaxation_order: Vec<ConstraintKind>,
}

fn default_top_n() -> usize {
    10
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            relaxation_order: default_relaxation_order(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, or defaults when absent
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed, or if
    /// the resulting configuration fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    GrantflowError::Config(format!(
                        "Failed to read config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                serde_yaml::from_str(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> Result<()> {
        if self.matching.top_n == 0 {
            return Err(GrantflowError::Config("matching.top_n must be at least 1".into()).into());
        }
        if self.ai.timeout_seconds == 0 {
            return Err(
                GrantflowError::Config("ai.timeout_seconds must be at least 1".into()).into(),
            );
        }
        if self.ai.api_base.is_empty() {
            return Err(GrantflowError::Config("ai.api_base must not be empty".into()).into());
        }
        Ok(())
    }
}
