//! Port traits implemented by infrastructure crates.
//!
//! The orchestration layer depends only on these traits:
//!
//! - [`LlmGateway`]: send a prompt, receive completion text and token counts.
//!   Implemented by the `llm` crate (OpenAI, Anthropic, Bedrock).
//! - [`Workspace`]: a key-value file store rooted at the output directory.
//!   Implemented by the `workspace` crate.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{ArtifactPath, RetryPolicy, TokenUsage};

// ---------------------------------------------------------------------------
// LLM gateway
// ---------------------------------------------------------------------------

/// A completed LLM call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Completion text exactly as returned by the backend.
    pub text: String,
    /// Usage reported by the backend, if it reports any.
    pub usage: Option<TokenUsage>,
}

impl Completion {
    /// A completion with backend-reported usage.
    pub fn with_usage(text: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            text: text.into(),
            usage: Some(usage),
        }
    }

    /// A completion whose backend reported no usage.
    pub fn without_usage(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Failures of a single gateway call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The request never reached the backend or the connection dropped.
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials were missing or rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The backend throttled the request.
    #[error("Rate limit exceeded")]
    RateLimited {
        /// Delay requested by the backend, when it sent one.
        retry_after: Option<Duration>,
    },

    /// The backend answered with an error.
    ///
    /// `consumed` carries usage the backend reported for the failed call so it
    /// can still be accounted.
    #[error("Provider error: {message}")]
    Provider {
        message: String,
        /// Whether a retry may succeed (e.g. HTTP 5xx).
        transient: bool,
        consumed: Option<TokenUsage>,
    },

    /// The call did not complete within the per-call timeout.
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),

    /// The gateway is not usable with the given configuration.
    #[error("Gateway configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Whether, and when, the failed call may be retried.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            GatewayError::Network(_) | GatewayError::Timeout(_) => {
                RetryPolicy::Retryable { after: None }
            }
            GatewayError::RateLimited { retry_after } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            GatewayError::Provider { transient, .. } if *transient => {
                RetryPolicy::Retryable { after: None }
            }
            GatewayError::Provider { .. }
            | GatewayError::Authentication(_)
            | GatewayError::Configuration(_) => RetryPolicy::NonRetryable,
        }
    }

    /// Usage the backend reported for the failed call, if any.
    pub fn consumed_usage(&self) -> Option<TokenUsage> {
        match self {
            GatewayError::Provider { consumed, .. } => *consumed,
            _ => None,
        }
    }
}

/// Uniform access to an LLM backend.
///
/// Implementations must be cheap to share behind an `Arc`; one gateway instance
/// is shared by every role of a team.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Submits `prompt` and returns the completion.
    async fn ask(&self, prompt: &str) -> Result<Completion, GatewayError>;

    /// Human-readable backend label used in logs (e.g. `"openai:gpt-4o"`).
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// Failures of workspace I/O.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Underlying I/O failure.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The stored content is not valid UTF-8.
    #[error("Content at '{path}' is not valid UTF-8")]
    InvalidEncoding { path: String },
}

/// The file store generated projects and artifacts are written to.
///
/// Owned and mutated exclusively by the orchestrator; roles and actions never
/// touch it.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Creates the root plus `src/`, `docs/` and `tests/`. Idempotent.
    async fn initialize(&self) -> Result<(), WorkspaceError>;

    /// Writes `content` to `path`, creating parent directories as needed.
    async fn write(&self, path: &ArtifactPath, content: &str) -> Result<(), WorkspaceError>;

    /// Reads `path`, returning `None` if it does not exist.
    async fn read(&self, path: &ArtifactPath) -> Result<Option<String>, WorkspaceError>;
}
