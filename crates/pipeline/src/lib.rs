//! Core domain for CrewForge.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type and error type used by the team pipeline, plus the port traits the
//! infrastructure crates implement. It performs no I/O.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** Infrastructure crates (`llm`,
//! `workspace`) implement the traits in [`ports`]; the `team` crate drives the
//! pipeline using only what is defined here.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`FeatureName`, `WorkItemTitle`, `ArtifactPath`, `PipelineRunId`) |
//! | [`types`] | Shared value types (`TokenCount`, `TokenUsage`, `Timestamp`) |
//! | [`ledger`] | Team-wide token accounting (`TokenLedger`) |
//! | [`outcome`] | `ActionOutcome` / `ActionResult` and their document form |
//! | [`normalizer`] | LLM text to `ActionOutcome` |
//! | [`planning`] | Work items and sprint plans |
//! | [`implementation`] | Features, batches and accepted implementations |
//! | [`config`] | Team configuration |
//! | [`ports`] | `LlmGateway` and `Workspace` traits |
//! | [`errors`] | Pipeline error and retry-policy types |

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod implementation;
pub mod ledger;
pub mod normalizer;
pub mod outcome;
pub mod planning;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{ExecutionConfig, LlmConfig, LlmProviderKind, TeamConfig};
pub use errors::{CrewForgeError, RetryPolicy};
pub use identifiers::{slugify, ArtifactPath, FeatureName, PipelineRunId, WorkItemTitle};
pub use implementation::{
    extract_features, partition_into_batches, FeatureBatch, FeatureSpec, GeneratedFiles,
    Implementation, CORE_FEATURE,
};
pub use ledger::{LedgerEntry, TokenLedger};
pub use normalizer::{extract_fenced_block, lift_response, normalize_text, normalize_value};
pub use outcome::{ActionOutcome, ActionResult};
pub use planning::{Priority, SprintPlan, WorkItem, WorkItemKind, DEFAULT_SPRINT_CAPACITY};
pub use ports::{Completion, GatewayError, LlmGateway, Workspace, WorkspaceError};
pub use types::{Timestamp, TokenCount, TokenUsage, UsageSource};
