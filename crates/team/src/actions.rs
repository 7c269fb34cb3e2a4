//! The action catalogue.
//!
//! An action is one LLM-backed operation: render a prompt, ask the gateway
//! once (the [`GatewayClient`] may retry transport failures inside that one
//! invocation), normalise the reply and shape it to the action's output
//! contract. Two requests short-circuit locally without calling the gateway.
//!
//! Actions never fail: gateway and parse failures become a degraded
//! [`ActionOutcome`] with whatever usage was measured.

use std::str::FromStr;

use pipeline::{ActionOutcome, ActionResult, SprintPlan, TokenUsage, WorkItem};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, error};

use crate::contract;
use crate::gateway::GatewayClient;
use crate::prompts::PromptBook;

/// Every action a role can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    AnalyzeRequirements,
    RefineRequirements,
    BreakdownSystem,
    IdentifyFeatures,
    CreateProjectStructure,
    ImplementFeature,
    ReviewCode,
    ReviewIntegration,
    ReviewRequirements,
    PlanWork,
    RunTests,
}

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        ActionKind::AnalyzeRequirements,
        ActionKind::RefineRequirements,
        ActionKind::BreakdownSystem,
        ActionKind::IdentifyFeatures,
        ActionKind::CreateProjectStructure,
        ActionKind::ImplementFeature,
        ActionKind::ReviewCode,
        ActionKind::ReviewIntegration,
        ActionKind::ReviewRequirements,
        ActionKind::PlanWork,
        ActionKind::RunTests,
    ];

    /// The action's name as used in logs, the ledger and at the boundary.
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::AnalyzeRequirements => "AnalyzeRequirements",
            ActionKind::RefineRequirements => "RefineRequirements",
            ActionKind::BreakdownSystem => "BreakdownSystem",
            ActionKind::IdentifyFeatures => "IdentifyFeatures",
            ActionKind::CreateProjectStructure => "CreateProjectStructure",
            ActionKind::ImplementFeature => "ImplementFeature",
            ActionKind::ReviewCode => "ReviewCode",
            ActionKind::ReviewIntegration => "ReviewIntegration",
            ActionKind::ReviewRequirements => "ReviewRequirements",
            ActionKind::PlanWork => "PlanWork",
            ActionKind::RunTests => "RunTests",
        }
    }

    /// Key the action's payload is nested under in its document, if any.
    pub fn wrap_key(self) -> Option<&'static str> {
        match self {
            ActionKind::AnalyzeRequirements
            | ActionKind::RefineRequirements
            | ActionKind::BreakdownSystem
            | ActionKind::IdentifyFeatures => Some("specification"),
            ActionKind::CreateProjectStructure => Some("project_structure"),
            ActionKind::ReviewCode => Some("review"),
            ActionKind::RunTests => Some("test_files"),
            ActionKind::ImplementFeature
            | ActionKind::ReviewIntegration
            | ActionKind::ReviewRequirements
            | ActionKind::PlanWork => None,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A name that matches no action in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for ActionKind {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownAction(wanted.to_string()))
    }
}

/// An action invocation with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    AnalyzeRequirements {
        requirements: String,
        spec: Value,
    },
    RefineRequirements {
        analysis: Value,
        feedback: String,
    },
    BreakdownSystem {
        requirements: Value,
        feedback: String,
    },
    IdentifyFeatures {
        analysis: Value,
        feedback: String,
    },
    CreateProjectStructure {
        specification: Value,
    },
    ImplementFeature {
        feature: String,
        spec: Value,
    },
    ReviewCode {
        code: Value,
        context: Value,
    },
    ReviewIntegration {
        batch: Vec<Value>,
        previous: Vec<Value>,
        requirements: Value,
    },
    ReviewRequirements {
        requirements: Value,
        implementation: Value,
        original_prompt: String,
    },
    PlanWork {
        work_items: Vec<WorkItem>,
        current_plan: SprintPlan,
    },
    RunTests {
        implementations: Vec<Value>,
        focus: Option<String>,
    },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::AnalyzeRequirements { .. } => ActionKind::AnalyzeRequirements,
            ActionRequest::RefineRequirements { .. } => ActionKind::RefineRequirements,
            ActionRequest::BreakdownSystem { .. } => ActionKind::BreakdownSystem,
            ActionRequest::IdentifyFeatures { .. } => ActionKind::IdentifyFeatures,
            ActionRequest::CreateProjectStructure { .. } => ActionKind::CreateProjectStructure,
            ActionRequest::ImplementFeature { .. } => ActionKind::ImplementFeature,
            ActionRequest::ReviewCode { .. } => ActionKind::ReviewCode,
            ActionRequest::ReviewIntegration { .. } => ActionKind::ReviewIntegration,
            ActionRequest::ReviewRequirements { .. } => ActionKind::ReviewRequirements,
            ActionRequest::PlanWork { .. } => ActionKind::PlanWork,
            ActionRequest::RunTests { .. } => ActionKind::RunTests,
        }
    }
}

/// Runs one action end to end.
pub(crate) async fn execute(
    request: &ActionRequest,
    client: &GatewayClient,
    prompts: &PromptBook,
) -> ActionResult {
    let kind = request.kind();
    if let Some(result) = short_circuit(request) {
        debug!(action = %kind, "Action short-circuited without an LLM call");
        return result;
    }

    let prompt = match prompts.render(request) {
        Ok(prompt) => prompt,
        Err(e) => {
            error!(action = %kind, error = %e, "Prompt rendering failed");
            return ActionResult::new(
                ActionOutcome::Failed(format!("Prompt rendering failed: {}", e)),
                TokenUsage::not_invoked(),
            );
        }
    };

    let reply = client.ask(&prompt).await;
    let outcome = contract::shape(request, reply.outcome);
    ActionResult::new(outcome, reply.usage)
}

/// Requests that are answered locally.
fn short_circuit(request: &ActionRequest) -> Option<ActionResult> {
    match request {
        ActionRequest::ReviewIntegration { batch, .. } if batch.is_empty() => {
            let payload = json!({
                "approved": false,
                "conflicts": ["No implementations were submitted for integration review"],
            });
            Some(ActionResult::new(
                ActionOutcome::Structured(into_map(payload)),
                TokenUsage::not_invoked(),
            ))
        }
        ActionRequest::PlanWork {
            work_items,
            current_plan,
        } if work_items.is_empty() => Some(ActionResult::new(
            ActionOutcome::Structured(current_plan.to_document()),
            TokenUsage::not_invoked(),
        )),
        _ => None,
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
