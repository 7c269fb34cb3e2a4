//! Team roles.
//!
//! A role is a named persona with a fixed action catalogue. Roles are
//! stateless apart from the gateway client bound to them; they never touch
//! the workspace or the ledger.

use std::sync::Arc;

use pipeline::{ActionResult, CrewForgeError};
use tracing::instrument;

use crate::actions::{self, ActionKind, ActionRequest};
use crate::gateway::GatewayClient;
use crate::prompts::PromptBook;

/// The personas a team is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    ProjectManager,
    Architect,
    TechLead,
    Developer,
    CodeReviewer,
    QaEngineer,
}

impl RoleKind {
    /// The actions this persona can perform.
    pub fn actions(self) -> &'static [ActionKind] {
        match self {
            RoleKind::ProjectManager => &[
                ActionKind::AnalyzeRequirements,
                ActionKind::RefineRequirements,
                ActionKind::ReviewRequirements,
                ActionKind::PlanWork,
            ],
            RoleKind::Architect => &[
                ActionKind::CreateProjectStructure,
                ActionKind::BreakdownSystem,
                ActionKind::IdentifyFeatures,
                ActionKind::ReviewIntegration,
                ActionKind::ReviewRequirements,
            ],
            RoleKind::TechLead => &[
                ActionKind::ImplementFeature,
                ActionKind::ReviewCode,
                ActionKind::ReviewRequirements,
            ],
            RoleKind::Developer => &[ActionKind::ImplementFeature],
            RoleKind::CodeReviewer => &[ActionKind::ReviewCode],
            RoleKind::QaEngineer => &[ActionKind::RunTests, ActionKind::ReviewRequirements],
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            RoleKind::ProjectManager => "ProjectManager",
            RoleKind::Architect => "Architect",
            RoleKind::TechLead => "TechLead",
            RoleKind::Developer => "Developer",
            RoleKind::CodeReviewer => "CodeReviewer",
            RoleKind::QaEngineer => "QAEngineer",
        }
    }
}

/// One team member.
#[derive(Debug, Clone)]
pub struct Role {
    kind: RoleKind,
    name: String,
    prompts: Arc<PromptBook>,
    client: Option<GatewayClient>,
}

impl Role {
    /// Creates an unbound role; bind a gateway before running it.
    pub fn new(kind: RoleKind, name: impl Into<String>, prompts: Arc<PromptBook>) -> Self {
        Self {
            kind,
            name: name.into(),
            prompts,
            client: None,
        }
    }

    /// Binds the gateway shared by every action of this role.
    pub fn bind_gateway(&mut self, client: GatewayClient) {
        self.client = Some(client);
    }

    pub fn kind(&self) -> RoleKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_names(&self) -> Vec<String> {
        self.kind.actions().iter().map(|a| a.name().to_string()).collect()
    }

    /// Looks up an action by name, as given at a boundary.
    pub fn resolve(&self, name: &str) -> Result<ActionKind, CrewForgeError> {
        name.parse::<ActionKind>()
            .ok()
            .filter(|kind| self.kind.actions().contains(kind))
            .ok_or_else(|| self.not_found(name))
    }

    /// Runs `request`.
    ///
    /// Fails only when the action is not in this role's catalogue or no
    /// gateway is bound; everything that goes wrong inside the action is
    /// reported through the result's outcome.
    #[instrument(skip_all, fields(role = %self.name, action = %request.kind()))]
    pub async fn run(&self, request: &ActionRequest) -> Result<ActionResult, CrewForgeError> {
        let kind = request.kind();
        if !self.kind.actions().contains(&kind) {
            return Err(self.not_found(kind.name()));
        }
        let client = self.client.as_ref().ok_or_else(|| {
            CrewForgeError::config(format!("{} has no LLM gateway bound", self.name))
        })?;
        Ok(actions::execute(request, client, &self.prompts).await)
    }

    fn not_found(&self, requested: &str) -> CrewForgeError {
        CrewForgeError::ActionNotFound {
            role: self.name.clone(),
            requested: requested.to_string(),
            available: self.action_names(),
        }
    }
}

/// Which team member to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    ProjectManager,
    Architect,
    TechLead,
    /// 0-based index into the developer pool.
    Developer(usize),
    CodeReviewer,
    QaEngineer,
}

/// The full team sharing one gateway.
#[derive(Debug, Clone)]
pub struct Team {
    project_manager: Role,
    architect: Role,
    tech_lead: Role,
    developers: Vec<Role>,
    code_reviewer: Role,
    qa_engineer: Role,
}

impl Team {
    /// Creates every role and binds `client` to each.
    pub fn assemble(num_developers: usize, client: GatewayClient) -> Result<Self, CrewForgeError> {
        if num_developers == 0 {
            return Err(CrewForgeError::config("a team needs at least one developer"));
        }
        let prompts = Arc::new(
            PromptBook::new().map_err(|e| CrewForgeError::config(e.to_string()))?,
        );
        let bound = |kind: RoleKind, name: String| {
            let mut role = Role::new(kind, name, prompts.clone());
            role.bind_gateway(client.clone());
            role
        };

        Ok(Self {
            project_manager: bound(RoleKind::ProjectManager, "ProjectManager".into()),
            architect: bound(RoleKind::Architect, "Architect".into()),
            tech_lead: bound(RoleKind::TechLead, "TechLead".into()),
            developers: (1..=num_developers)
                .map(|i| bound(RoleKind::Developer, format!("Developer{}", i)))
                .collect(),
            code_reviewer: bound(RoleKind::CodeReviewer, "CodeReviewer".into()),
            qa_engineer: bound(RoleKind::QaEngineer, "QAEngineer".into()),
        })
    }

    pub fn developer_count(&self) -> usize {
        self.developers.len()
    }

    /// The role in `seat`. A developer index outside the pool is a
    /// configuration error; seats never wrap around.
    pub fn seat(&self, seat: Seat) -> Result<&Role, CrewForgeError> {
        let role = match seat {
            Seat::ProjectManager => &self.project_manager,
            Seat::Architect => &self.architect,
            Seat::TechLead => &self.tech_lead,
            Seat::Developer(index) => self.developers.get(index).ok_or_else(|| {
                CrewForgeError::config(format!(
                    "developer seat {} requested but the pool has {} developers",
                    index + 1,
                    self.developers.len()
                ))
            })?,
            Seat::CodeReviewer => &self.code_reviewer,
            Seat::QaEngineer => &self.qa_engineer,
        };
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbound(kind: RoleKind) -> Role {
        Role::new(kind, kind.title(), Arc::new(PromptBook::new().unwrap()))
    }

    #[test]
    fn test_catalogues() {
        assert_eq!(
            unbound(RoleKind::CodeReviewer).action_names(),
            vec!["ReviewCode".to_string()]
        );
        assert!(RoleKind::Architect.actions().contains(&ActionKind::ReviewIntegration));
        assert!(!RoleKind::QaEngineer.actions().contains(&ActionKind::ImplementFeature));
        for kind in [RoleKind::ProjectManager, RoleKind::Architect, RoleKind::TechLead, RoleKind::QaEngineer] {
            assert!(kind.actions().contains(&ActionKind::ReviewRequirements));
        }
    }

    #[test]
    fn test_resolve_unknown_action_lists_catalogue() {
        let role = unbound(RoleKind::CodeReviewer);
        let err = role.resolve("NoSuchAction").unwrap_err();
        assert_eq!(
            err,
            CrewForgeError::ActionNotFound {
                role: "CodeReviewer".into(),
                requested: "NoSuchAction".into(),
                available: vec!["ReviewCode".into()],
            }
        );
        assert!(err.to_string().contains("ReviewCode"));

        // Known action, wrong role.
        assert!(role.resolve("PlanWork").is_err());
        assert_eq!(role.resolve("ReviewCode").unwrap(), ActionKind::ReviewCode);
    }

    #[tokio::test]
    async fn test_unbound_role_is_a_configuration_error() {
        let role = unbound(RoleKind::CodeReviewer);
        let request = ActionRequest::ReviewCode {
            code: serde_json::json!({}),
            context: serde_json::json!({}),
        };
        let err = role.run(&request).await.unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[tokio::test]
    async fn test_run_rejects_foreign_action_before_needing_gateway() {
        let role = unbound(RoleKind::Developer);
        let request = ActionRequest::PlanWork {
            work_items: Vec::new(),
            current_plan: Default::default(),
        };
        let err = role.run(&request).await.unwrap_err();
        assert_eq!(err.kind(), "action_not_found");
    }
}
