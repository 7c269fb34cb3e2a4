//! The CrewForge software team.
//!
//! Role personas, the actions they perform, and the orchestrator that runs
//! them through the pipeline against an [`pipeline::LlmGateway`] and a
//! [`pipeline::Workspace`].
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Everything here sequences calls between the
//! domain in the [`pipeline`] crate and the port implementations supplied by
//! the composition root. No HTTP or filesystem code lives in this crate.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`actions`] | Action catalogue and requests |
//! | [`prompts`] | Handlebars prompt templates |
//! | [`contract`] | Per-action output shaping |
//! | [`gateway`] | Timeout, retry and usage accounting around a gateway |
//! | [`roles`] | Personas and the assembled team |
//! | [`discovery`] | Feature discovery escalation |
//! | [`artifacts`] | Artifact persistence and file materialisation |
//! | [`orchestrator`] | The pipeline state machine |

pub mod actions;
pub mod artifacts;
pub mod contract;
pub mod discovery;
pub mod gateway;
pub mod orchestrator;
pub mod prompts;
pub mod roles;

pub use actions::{ActionKind, ActionRequest, UnknownAction};
pub use artifacts::ArtifactStore;
pub use discovery::{DiscoveryStep, FeatureDiscoveryPolicy, MAX_ESCALATIONS_PER_MODE};
pub use gateway::{GatewayClient, GatewayReply};
pub use orchestrator::{Orchestrator, PipelinePhase, PipelineReport};
pub use prompts::{PromptBook, PromptError};
pub use roles::{Role, RoleKind, Seat, Team};
