//! Narrow AI client trait
//!
//! A single completion-style interface covers all three AI channels
//! (interpretation, scoring, clarifying questions). Call sites build a
//! prompt, parse the response, and fall back deterministically on error;
//! the transport enforces its own timeout and bounded retry.

use crate::error::Result;
use async_trait::async_trait;

/// One completion request against the external AI service
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System instruction framing the task
    pub system: String,
    /// User payload (profile data, candidate list, raw answer text)
    pub user: String,
}

impl CompletionRequest {
    /// Create a new completion request
    ///
    /// # Examples
    ///
    /// ```
    /// use grantflow::ai::CompletionRequest;
    ///
    /// let req = CompletionRequest::new("You map answers to options.", "budget: around 2M");
    /// assert!(req.system.contains("map"));
    /// ```
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Client for the external AI service
///
/// Implementations must bound the call with an explicit timeout. A single
/// retry is acceptable; unbounded retry loops are not. Errors are returned
/// to the caller, which must degrade gracefully rather than propagate them
/// up the request chain.
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Run one completion and return the raw response text
    ///
    /// # Errors
    ///
    /// Returns error if the API call fails, times out, or returns an
    /// unusable response.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_new() {
        let req = CompletionRequest::new("system", "user");
        assert_eq!(req.system, "system");
        assert_eq!(req.user, "user");
    }

    #[test]
    fn test_trait_object_is_usable() {
        struct Fixed;

        #[async_trait]
        impl AiClient for Fixed {
            async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
                Ok("ok".to_string())
            }
        }

        let client: Box<dyn AiClient> = Box::new(Fixed);
        let out = tokio_test::block_on(client.complete(&CompletionRequest::new("s", "u"))).unwrap();
        assert_eq!(out, "ok");
    }
}
