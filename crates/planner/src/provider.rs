//! Upstream completion provider.
//!
//! One provider instance is shared by every engine the controller builds, so
//! implementations must be safe to call from concurrent passes.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};

/// A completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub counterpart_id: String,
    pub prompt: String,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// Upstream completion service.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Complete a prompt.
    ///
    /// # Errors
    ///
    /// Returns `PlannerError::Provider` when the upstream call fails.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Configuration for the scripted provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Replies handed out in order, wrapping around.
    #[serde(default)]
    pub replies: Vec<String>,

    /// Reply used when `replies` is empty.
    #[serde(default)]
    pub fallback_reply: Option<String>,
}

/// Provider that replays canned replies.
#[derive(Debug)]
pub struct ScriptedProvider {
    replies: Vec<String>,
    fallback: Option<String>,
    next: AtomicUsize,
}

impl ScriptedProvider {
    /// Create a provider cycling through `replies`.
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            fallback: None,
            next: AtomicUsize::new(0),
        }
    }

    /// Create a provider from configuration.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            replies: config.replies.clone(),
            fallback: config.fallback_reply.clone(),
            next: AtomicUsize::new(0),
        }
    }

    /// Number of completions served so far.
    pub fn served(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let turn = self.next.fetch_add(1, Ordering::Relaxed);
        let reply = match self.replies.len() {
            0 => self.fallback.clone(),
            len => turn
                .checked_rem(len)
                .and_then(|index| self.replies.get(index))
                .cloned(),
        };

        tracing::debug!(
            provider = self.name(),
            model = %request.model,
            turn,
            "Serving scripted completion"
        );

        reply.ok_or_else(|| PlannerError::provider(self.name(), "no scripted replies configured"))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "m".to_string(),
            counterpart_id: "counterpart".to_string(),
            prompt: "hello".to_string(),
            temperature: None,
        }
    }

    #[tokio::test]
    async fn should_cycle_through_replies() {
        let provider = ScriptedProvider::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(provider.complete(request()).await.unwrap(), "a");
        assert_eq!(provider.complete(request()).await.unwrap(), "b");
        assert_eq!(provider.complete(request()).await.unwrap(), "a");
        assert_eq!(provider.served(), 3);
    }

    #[tokio::test]
    async fn should_use_fallback_when_no_replies() {
        let provider = ScriptedProvider::from_config(&ProviderConfig {
            replies: Vec::new(),
            fallback_reply: Some("ok".to_string()),
        });
        assert_eq!(provider.complete(request()).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn should_fail_without_any_reply() {
        let provider = ScriptedProvider::new(Vec::new());
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, PlannerError::Provider { .. }));
    }
}
