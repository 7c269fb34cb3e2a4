//! Top-level error and retry-policy types for the CrewForge pipeline domain.
//!
//! [`CrewForgeError`] covers conditions that halt the pipeline itself.
//! Component-level errors (LLM gateway failures, workspace I/O failures) are
//! defined next to their port traits in [`crate::ports`].
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let the gateway client decide
/// whether to re-invoke an operation.
///
/// - `Retryable` errors: network failures, timeouts, transient rate-limit
///   responses, backend 5xx responses.
/// - `NonRetryable` errors: authentication failures, invalid configuration,
///   rejected requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Renders `items` as a newline-separated bullet list.
fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors that halt the pipeline.
///
/// Per-call failures (gateway errors, malformed LLM output) never surface as a
/// [`CrewForgeError`]; they are absorbed into a degraded
/// [`crate::ActionOutcome`]. The variants here are phase-level preconditions
/// and internal contract violations.
///
/// The type is serialisable so the failure can be persisted alongside the
/// token ledger before it propagates.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrewForgeError {
    /// An action result document carried no `input_tokens`/`output_tokens`.
    ///
    /// Every action must attach usage; a result without it is a contract
    /// violation and is never silently zeroed.
    #[error("Token accounting missing from the result of {action}")]
    MissingTokenAccounting {
        /// The action (or artifact) whose result lacked usage fields.
        action: String,
    },

    /// A role was asked to run an action it does not have.
    #[error("Action '{requested}' not found on {role}; available actions: {}", .available.join(", "))]
    ActionNotFound {
        role: String,
        requested: String,
        /// Names of the actions bound to the role.
        available: Vec<String>,
    },

    /// Feature discovery escalation ended without an implementable feature.
    #[error("Feature discovery exhausted after {escalations} escalation(s): {reason}")]
    FeatureDiscoveryExhausted {
        /// Number of escalation steps taken before giving up.
        escalations: usize,
        reason: String,
    },

    /// A batch's integration review was still not approved after remediation.
    #[error("Failed to integrate batch {batch}:\n\nCritical conflicts:\n{}", bullets(.conflicts))]
    IntegrationConflictUnresolved {
        /// 1-based batch number.
        batch: u32,
        /// Conflicts reported by the last review, verbatim.
        conflicts: Vec<String>,
    },

    /// Final validation was rejected by the business or technical reviewer.
    #[error(
        "{reviewer} validation rejected the implementation.\nMissing Requirements:\n{}\nDeviations:\n{}\nQuality Issues:\n{}",
        bullets(.missing_requirements),
        bullets(.deviations),
        bullets(.quality_issues)
    )]
    ValidationRejected {
        /// `"Business"` or `"Technical"`.
        reviewer: String,
        missing_requirements: Vec<String>,
        deviations: Vec<String>,
        quality_issues: Vec<String>,
    },

    /// The configuration is invalid, or a component was used before it was
    /// wired (e.g. a role without a gateway).
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// A generated project file could not be materialised.
    #[error("Workspace failure at '{path}': {message}")]
    WorkspaceFailure { path: String, message: String },
}

impl CrewForgeError {
    /// Creates a [`CrewForgeError::ConfigurationError`].
    pub fn config(message: impl Into<String>) -> Self {
        CrewForgeError::ConfigurationError {
            message: message.into(),
        }
    }

    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            CrewForgeError::MissingTokenAccounting { .. } => "missing_token_accounting",
            CrewForgeError::ActionNotFound { .. } => "action_not_found",
            CrewForgeError::FeatureDiscoveryExhausted { .. } => "feature_discovery_exhausted",
            CrewForgeError::IntegrationConflictUnresolved { .. } => {
                "integration_conflict_unresolved"
            }
            CrewForgeError::ValidationRejected { .. } => "validation_rejected",
            CrewForgeError::ConfigurationError { .. } => "configuration_error",
            CrewForgeError::WorkspaceFailure { .. } => "workspace_failure",
        }
    }
}
