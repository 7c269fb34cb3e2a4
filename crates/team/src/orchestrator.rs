//! Pipeline orchestrator.
//!
//! Drives one run from requirements to validated project:
//!
//! ```text
//! Analyze -> Design -> CoreImplementation -> FeatureDiscovery
//!         -> BatchedImplementation (integration review per batch)
//!         -> Review -> Test -> Validation -> Complete
//! ```
//!
//! The orchestrator is the only component that mutates the workspace, the
//! token ledger and the accepted implementation list. Every action it runs
//! lands in the ledger exactly once, whether the call succeeded or not.

use std::fmt;
use std::sync::Arc;

use pipeline::{
    partition_into_batches, ActionOutcome, ActionResult, ArtifactPath, CrewForgeError,
    FeatureName, FeatureSpec, GeneratedFiles, Implementation, LlmGateway, PipelineRunId,
    SprintPlan, TeamConfig, Timestamp, TokenLedger, WorkItem, WorkItemKind, Workspace,
    DEFAULT_SPRINT_CAPACITY,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, instrument, warn};

use crate::actions::{ActionKind, ActionRequest};
use crate::artifacts::ArtifactStore;
use crate::contract::UNSPECIFIED_CONFLICT;
use crate::discovery::{DiscoveryStep, FeatureDiscoveryPolicy};
use crate::gateway::GatewayClient;
use crate::roles::{Seat, Team};

/// Entries listed in the end-of-run token summary.
const TOP_CONSUMERS: usize = 5;

/// Where the run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Setup,
    Analyze,
    Design,
    CoreImplementation,
    FeatureDiscovery,
    BatchedImplementation,
    Review,
    Test,
    Validation,
    Complete,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelinePhase::Setup => "setup",
            PipelinePhase::Analyze => "analyze",
            PipelinePhase::Design => "design",
            PipelinePhase::CoreImplementation => "core_implementation",
            PipelinePhase::FeatureDiscovery => "feature_discovery",
            PipelinePhase::BatchedImplementation => "batched_implementation",
            PipelinePhase::Review => "review",
            PipelinePhase::Test => "test",
            PipelinePhase::Validation => "validation",
            PipelinePhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: PipelineRunId,
    /// Non-core features in acceptance order, remediation work included.
    pub features: Vec<FeatureName>,
    pub files_written: usize,
    pub artifacts: Vec<ArtifactPath>,
    pub ledger: TokenLedger,
}

/// An integration review reduced to what the orchestrator acts on.
#[derive(Debug, Clone)]
struct IntegrationVerdict {
    approved: bool,
    conflicts: Vec<String>,
    work_items: Vec<WorkItem>,
}

impl IntegrationVerdict {
    fn from_result(result: &ActionResult) -> Self {
        if let Some(reason) = result.failure_reason() {
            let conflict = format!("Integration review could not be completed: {}", reason);
            return Self {
                approved: false,
                work_items: WorkItem::remediation(&conflict).into_iter().collect(),
                conflicts: vec![conflict],
            };
        }

        let approved = result.flag("approved");
        let mut conflicts = result.string_list("conflicts");
        if !approved && conflicts.is_empty() {
            conflicts.push(UNSPECIFIED_CONFLICT.to_string());
        }
        let mut work_items = result
            .field("new_work_items")
            .map(WorkItem::list_from_value)
            .unwrap_or_default();
        if work_items.is_empty() {
            work_items = conflicts.iter().filter_map(|c| WorkItem::remediation(c)).collect();
        }
        Self {
            approved,
            conflicts,
            work_items,
        }
    }
}

/// Runs the team through the pipeline.
pub struct Orchestrator {
    run_id: PipelineRunId,
    team: Team,
    workspace: Arc<dyn Workspace>,
    store: ArtifactStore,
    ledger: TokenLedger,
    implementations: Vec<Implementation>,
    artifacts: Vec<ArtifactPath>,
    files_written: usize,
    sprints_run: u32,
    max_remediation_rounds: u32,
    phase: PipelinePhase,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("run_id", &self.run_id)
            .field("phase", &self.phase)
            .field("developers", &self.team.developer_count())
            .field("implementations", &self.implementations.len())
            .field("actions", &self.ledger.entries().len())
            .finish()
    }
}

impl Orchestrator {
    /// Assembles the team around `gateway` and targets `workspace`.
    pub fn new(
        config: &TeamConfig,
        gateway: Arc<dyn LlmGateway>,
        workspace: Arc<dyn Workspace>,
    ) -> Result<Self, CrewForgeError> {
        config.validate()?;
        let client = GatewayClient::from_config(gateway, &config.execution);
        let team = Team::assemble(config.num_developers, client)?;
        Ok(Self {
            run_id: PipelineRunId::new_random(),
            team,
            store: ArtifactStore::new(workspace.clone()),
            workspace,
            ledger: TokenLedger::new(),
            implementations: Vec::new(),
            artifacts: Vec::new(),
            files_written: 0,
            sprints_run: 0,
            max_remediation_rounds: config.execution.max_remediation_rounds,
            phase: PipelinePhase::Setup,
        })
    }

    pub fn run_id(&self) -> PipelineRunId {
        self.run_id
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    /// Accepted implementations, core first.
    pub fn implementations(&self) -> &[Implementation] {
        &self.implementations
    }

    /// Runs the whole pipeline for `prompt` with an optional structured
    /// `spec` (pass `Value::Null` when there is none).
    ///
    /// Whatever happens, the ledger is persisted to `docs/token_usage.json`
    /// before this returns. On failure the error is also written to
    /// `docs/pipeline_failure.json`.
    #[instrument(skip_all, fields(run_id = %self.run_id))]
    pub async fn run(&mut self, prompt: &str, spec: &Value) -> Result<PipelineReport, CrewForgeError> {
        info!(
            developers = self.team.developer_count(),
            max_remediation_rounds = self.max_remediation_rounds,
            "Starting pipeline"
        );

        match self.execute(prompt, spec).await {
            Ok(()) => {
                self.phase = PipelinePhase::Complete;
                self.persist_ledger().await;
                self.log_summary();
                info!(
                    features = self.implementations.len().saturating_sub(1),
                    files_written = self.files_written,
                    "Pipeline complete"
                );
                Ok(self.report())
            }
            Err(err) => {
                error!(phase = %self.phase, kind = err.kind(), error = %err, "Pipeline failed");
                let mut doc = match serde_json::to_value(&err) {
                    Ok(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                doc.insert("message".into(), Value::String(err.to_string()));
                doc.insert("phase".into(), Value::String(self.phase.to_string()));
                doc.insert("run_id".into(), Value::String(self.run_id.to_string()));
                doc.insert("timestamp".into(), Value::String(Timestamp::now().to_string()));
                self.persist("pipeline_failure", &doc).await;
                self.persist_ledger().await;
                self.log_summary();
                Err(err)
            }
        }
    }

    async fn execute(&mut self, prompt: &str, spec: &Value) -> Result<(), CrewForgeError> {
        self.workspace
            .initialize()
            .await
            .map_err(|e| CrewForgeError::WorkspaceFailure {
                path: ".".into(),
                message: e.to_string(),
            })?;

        let analysis = self.analyze(prompt, spec).await?;
        self.design(&analysis).await?;
        self.implement_core(&analysis).await?;
        let (analysis, features) = self.discover_features(analysis).await?;
        self.implement_batches(&analysis, features).await?;
        self.review().await?;
        let test_results = self.test().await?;
        self.validate(&analysis, &test_results, prompt).await
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    #[instrument(skip_all, fields(phase = "analyze"))]
    async fn analyze(&mut self, prompt: &str, spec: &Value) -> Result<Map<String, Value>, CrewForgeError> {
        self.phase = PipelinePhase::Analyze;
        info!("Analyzing requirements");
        let request = ActionRequest::AnalyzeRequirements {
            requirements: prompt.to_string(),
            spec: spec.clone(),
        };
        let doc = self.perform(Seat::ProjectManager, request).await?.to_document();
        self.persist("requirements_analysis", &doc).await;
        Ok(doc)
    }

    #[instrument(skip_all, fields(phase = "design"))]
    async fn design(&mut self, analysis: &Map<String, Value>) -> Result<(), CrewForgeError> {
        self.phase = PipelinePhase::Design;
        info!("Creating project structure");
        let specification = analysis
            .get("specification")
            .cloned()
            .unwrap_or_else(|| Value::Object(analysis.clone()));
        let doc = self
            .perform(Seat::Architect, ActionRequest::CreateProjectStructure { specification })
            .await?
            .to_document();
        self.materialize(&GeneratedFiles::at(&doc, "/project_structure/files")).await?;
        self.persist("project_structure", &doc).await;
        Ok(())
    }

    #[instrument(skip_all, fields(phase = "core_implementation"))]
    async fn implement_core(&mut self, analysis: &Map<String, Value>) -> Result<(), CrewForgeError> {
        self.phase = PipelinePhase::CoreImplementation;
        info!("Implementing core functionality");
        let core = FeatureName::core();
        let request = ActionRequest::ImplementFeature {
            feature: core.to_string(),
            spec: Value::Object(analysis.clone()),
        };
        let result = self.perform(Seat::TechLead, request).await?;
        let implementation = Implementation::from_result(core, &result);
        self.materialize(&implementation.files).await?;
        self.persist("core_implementation", &implementation.document).await;
        self.implementations.push(implementation);
        Ok(())
    }

    /// Returns the analysis the features were finally read from, and the
    /// non-core features to implement.
    #[instrument(skip_all, fields(phase = "feature_discovery"))]
    async fn discover_features(
        &mut self,
        analysis: Map<String, Value>,
    ) -> Result<(Map<String, Value>, Vec<FeatureSpec>), CrewForgeError> {
        self.phase = PipelinePhase::FeatureDiscovery;
        let mut policy = FeatureDiscoveryPolicy::default();
        let mut working = analysis;

        loop {
            let (action, feedback) = match policy.next(&working)? {
                DiscoveryStep::Ready(features) => {
                    info!(
                        features = features.len(),
                        escalations = policy.escalations(),
                        "Features discovered"
                    );
                    return Ok((working, features));
                }
                DiscoveryStep::Escalate { action, feedback } => (action, feedback),
            };

            info!(action = %action, escalation = policy.escalations(), "Escalating feature discovery");
            let current = Value::Object(working.clone());
            let (seat, request) = match action {
                ActionKind::RefineRequirements => (
                    Seat::ProjectManager,
                    ActionRequest::RefineRequirements {
                        analysis: current,
                        feedback,
                    },
                ),
                ActionKind::BreakdownSystem => (
                    Seat::Architect,
                    ActionRequest::BreakdownSystem {
                        requirements: current,
                        feedback,
                    },
                ),
                ActionKind::IdentifyFeatures => (
                    Seat::Architect,
                    ActionRequest::IdentifyFeatures {
                        analysis: current,
                        feedback,
                    },
                ),
                other => {
                    return Err(CrewForgeError::config(format!(
                        "{} is not a feature discovery action",
                        other
                    )))
                }
            };
            working = self.perform(seat, request).await?.to_document();
            self.persist(&format!("feature_discovery_{}", policy.escalations()), &working)
                .await;
        }
    }

    #[instrument(skip_all, fields(phase = "batched_implementation"))]
    async fn implement_batches(
        &mut self,
        analysis: &Map<String, Value>,
        features: Vec<FeatureSpec>,
    ) -> Result<(), CrewForgeError> {
        self.phase = PipelinePhase::BatchedImplementation;
        let batches = partition_into_batches(features, self.team.developer_count());
        let total = batches.len();

        for batch in batches {
            info!(batch = batch.number, of = total, features = batch.features.len(), "Implementing batch");
            let mut produced = Vec::with_capacity(batch.features.len());
            for (index, feature) in batch.features.iter().enumerate() {
                // Accepted work only; the rest of this batch is still unreviewed.
                let implementations: Vec<Value> =
                    self.implementations.iter().map(Implementation::to_context).collect();
                let request = ActionRequest::ImplementFeature {
                    feature: feature.name.to_string(),
                    spec: json!({
                        "analysis": analysis,
                        "feature": feature.details,
                        "implementations": implementations,
                    }),
                };
                let result = self.perform(Seat::Developer(index), request).await?;
                let implementation = Implementation::from_result(feature.name.clone(), &result);
                self.materialize(&implementation.files).await?;
                self.persist(
                    &format!("feature_{}_implementation", feature.name.slug()),
                    &implementation.document,
                )
                .await;
                produced.push(implementation);
            }
            self.integrate_batch(batch.number, produced, analysis).await?;
        }
        Ok(())
    }

    /// Reviews a batch against what is already accepted, remediating and
    /// re-reviewing up to the configured number of rounds.
    #[instrument(skip_all, fields(batch = number))]
    async fn integrate_batch(
        &mut self,
        number: u32,
        produced: Vec<Implementation>,
        analysis: &Map<String, Value>,
    ) -> Result<(), CrewForgeError> {
        let mut candidates = produced;
        let mut round = 0u32;

        loop {
            let request = ActionRequest::ReviewIntegration {
                batch: candidates.iter().map(Implementation::to_context).collect(),
                previous: self.implementations.iter().map(Implementation::to_context).collect(),
                requirements: Value::Object(analysis.clone()),
            };
            let result = self.perform(Seat::Architect, request).await?;
            let name = match round {
                0 => format!("integration_review_batch_{}", number),
                r => format!("integration_review_batch_{}_retry_{}", number, r),
            };
            self.persist(&name, &result.to_document()).await;

            let verdict = IntegrationVerdict::from_result(&result);
            if verdict.approved {
                info!(accepted = candidates.len(), round, "Batch integrated");
                self.implementations.extend(candidates);
                return Ok(());
            }

            warn!(conflicts = verdict.conflicts.len(), round, "Integration review rejected batch");
            if round >= self.max_remediation_rounds {
                return Err(CrewForgeError::IntegrationConflictUnresolved {
                    batch: number,
                    conflicts: verdict.conflicts,
                });
            }
            round += 1;

            let batch_context: Vec<Value> = candidates.iter().map(Implementation::to_context).collect();
            let outputs = self.remediate(number, &verdict, &batch_context, analysis).await?;
            candidates.extend(outputs);
        }
    }

    /// Plans and runs the work items of a rejected review. Returns the
    /// implementations produced.
    async fn remediate(
        &mut self,
        batch: u32,
        verdict: &IntegrationVerdict,
        batch_context: &[Value],
        analysis: &Map<String, Value>,
    ) -> Result<Vec<Implementation>, CrewForgeError> {
        let items = &verdict.work_items;
        let planned = self
            .perform(
                Seat::ProjectManager,
                ActionRequest::PlanWork {
                    work_items: items.clone(),
                    current_plan: SprintPlan::default(),
                },
            )
            .await?;
        let mut plan = planned.payload().map(SprintPlan::from_document).unwrap_or_default();
        if plan.is_empty() || !plan.references_any(items) {
            info!(items = items.len(), "Sprint plan unusable, scheduling locally");
            plan = SprintPlan::schedule(items, DEFAULT_SPRINT_CAPACITY);
        }
        self.persist(&format!("sprint_plan_batch_{}", batch), &plan.to_document()).await;

        let mut outputs = Vec::new();
        for (sprint, sprint_items) in plan.resolve(items) {
            self.sprints_run += 1;
            let ordinal = self.sprints_run;
            info!(batch, sprint, ordinal, items = sprint_items.len(), "Running remediation sprint");

            let mut produced: Vec<Implementation> = Vec::new();
            for item in sprint_items {
                if item.kind == WorkItemKind::Test {
                    let request = ActionRequest::RunTests {
                        implementations: batch_context.to_vec(),
                        focus: Some(format!("{}: {}", item.title, item.description)),
                    };
                    let doc = self.perform(Seat::QaEngineer, request).await?.to_document();
                    self.materialize(&GeneratedFiles::at(&doc, "/test_files/files")).await?;
                    self.persist(&format!("work_item_{}", item.title.slug()), &doc).await;
                    continue;
                }

                let seat = match item.kind {
                    WorkItemKind::Implementation => Seat::Developer(0),
                    _ => Seat::TechLead,
                };
                let request = ActionRequest::ImplementFeature {
                    feature: item.title.to_string(),
                    spec: json!({
                        "work_item": item,
                        "conflicts": verdict.conflicts,
                        "analysis": analysis,
                    }),
                };
                let result = self.perform(seat, request).await?;
                let implementation = Implementation::from_result(FeatureName::from(&item.title), &result);
                self.materialize(&implementation.files).await?;
                self.persist(&format!("work_item_{}", item.title.slug()), &implementation.document)
                    .await;

                let review = ActionRequest::ReviewCode {
                    code: implementation.to_context(),
                    context: json!({ "work_item": item, "conflicts": verdict.conflicts }),
                };
                let reviewed = self.perform(Seat::TechLead, review).await?;
                self.persist(&format!("code_review_{}", item.title.slug()), &reviewed.to_document())
                    .await;
                produced.push(implementation);
            }

            if !produced.is_empty() {
                let request = ActionRequest::RunTests {
                    implementations: produced.iter().map(Implementation::to_context).collect(),
                    focus: None,
                };
                let doc = self.perform(Seat::QaEngineer, request).await?.to_document();
                self.materialize(&GeneratedFiles::at(&doc, "/test_files/files")).await?;
                self.persist(&format!("test_results_sprint_{}", ordinal), &doc).await;
            }
            outputs.extend(produced);
        }
        Ok(outputs)
    }

    #[instrument(skip_all, fields(phase = "review"))]
    async fn review(&mut self) -> Result<(), CrewForgeError> {
        self.phase = PipelinePhase::Review;
        let snapshot: Vec<(FeatureName, Value)> = self
            .implementations
            .iter()
            .map(|i| (i.feature.clone(), i.to_context()))
            .collect();
        info!(implementations = snapshot.len(), "Reviewing code");

        for (feature, code) in snapshot {
            let request = ActionRequest::ReviewCode {
                code,
                context: json!({ "feature": feature }),
            };
            let doc = self.perform(Seat::CodeReviewer, request).await?.to_document();
            self.persist(&format!("review_{}", feature.slug()), &doc).await;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(phase = "test"))]
    async fn test(&mut self) -> Result<Map<String, Value>, CrewForgeError> {
        self.phase = PipelinePhase::Test;
        info!("Generating tests");
        let request = ActionRequest::RunTests {
            implementations: self.feature_contexts(),
            focus: None,
        };
        let doc = self.perform(Seat::QaEngineer, request).await?.to_document();
        self.materialize(&GeneratedFiles::at(&doc, "/test_files/files")).await?;
        self.persist("test_results", &doc).await;
        Ok(doc)
    }

    /// Business and technical sign-off. Both reviews always run; the results
    /// are persisted before a rejection is raised.
    #[instrument(skip_all, fields(phase = "validation"))]
    async fn validate(
        &mut self,
        analysis: &Map<String, Value>,
        test_results: &Map<String, Value>,
        prompt: &str,
    ) -> Result<(), CrewForgeError> {
        self.phase = PipelinePhase::Validation;
        info!("Validating implementation against requirements");

        let core = self
            .implementations
            .iter()
            .find(|i| i.is_core())
            .map(Implementation::to_context)
            .unwrap_or(Value::Null);
        let implementation = json!({
            "core": core,
            "features": self.feature_contexts(),
            "test_results": test_results,
        });
        let review = |implementation: Value| ActionRequest::ReviewRequirements {
            requirements: Value::Object(analysis.clone()),
            implementation,
            original_prompt: prompt.to_string(),
        };

        let business = self.perform(Seat::ProjectManager, review(implementation.clone())).await?;
        let technical = self.perform(Seat::Architect, review(implementation)).await?;

        let mut results = Map::new();
        results.insert("business_validation".into(), Value::Object(business.to_document()));
        results.insert("technical_validation".into(), Value::Object(technical.to_document()));
        results.insert("timestamp".into(), Value::String(Timestamp::now().to_string()));

        let rejected = [("Business", &business), ("Technical", &technical)]
            .into_iter()
            .find(|(_, result)| !result.flag("approved"))
            .map(|(reviewer, result)| rejection(reviewer, result));

        match rejected {
            None => {
                results.insert("status".into(), Value::String("passed".into()));
                self.persist("validation_results", &results).await;
                info!("Validation passed");
                Ok(())
            }
            Some(err) => {
                results.insert("status".into(), Value::String("failed".into()));
                results.insert("error".into(), Value::String(err.to_string()));
                results.insert(
                    "error_details".into(),
                    serde_json::to_value(&err).unwrap_or(Value::Null),
                );
                self.persist("validation_results", &results).await;
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Runs `request` on the role in `seat` and records its usage.
    async fn perform(&mut self, seat: Seat, request: ActionRequest) -> Result<ActionResult, CrewForgeError> {
        let role = self.team.seat(seat)?;
        let role_name = role.name().to_string();
        let result = role.run(&request).await?;

        let action = request.kind();
        self.ledger.record(&role_name, action.name(), result.usage());
        if let Some(reason) = result.failure_reason() {
            warn!(role = %role_name, action = %action, reason, "Action degraded");
        }
        Ok(result)
    }

    async fn persist(&mut self, name: &str, doc: &Map<String, Value>) {
        if let Some(path) = self.store.persist(name, doc).await {
            self.artifacts.push(path);
        }
    }

    async fn materialize(&mut self, files: &GeneratedFiles) -> Result<(), CrewForgeError> {
        self.files_written += self.store.materialize(files).await?;
        Ok(())
    }

    async fn persist_ledger(&mut self) {
        match serde_json::to_value(&self.ledger) {
            Ok(Value::Object(doc)) => self.persist("token_usage", &doc).await,
            Ok(_) => {}
            Err(e) => error!(error = %e, "Failed to serialise token ledger"),
        }
    }

    fn feature_contexts(&self) -> Vec<Value> {
        self.implementations
            .iter()
            .filter(|i| !i.is_core())
            .map(Implementation::to_context)
            .collect()
    }

    fn log_summary(&self) {
        info!(
            actions = self.ledger.entries().len(),
            input_tokens = self.ledger.input_tokens().as_u64(),
            output_tokens = self.ledger.output_tokens().as_u64(),
            total_tokens = self.ledger.total_tokens().as_u64(),
            "Token usage summary"
        );
        for (rank, entry) in self.ledger.top_consumers(TOP_CONSUMERS).into_iter().enumerate() {
            info!(
                rank = rank + 1,
                role = %entry.role,
                action = %entry.action,
                total_tokens = entry.total_tokens.as_u64(),
                "Top token consumer"
            );
        }

        let suspicious = self.ledger.suspicious_entries().count();
        if suspicious > 0 {
            warn!(entries = suspicious, "Actions reported zero input and output tokens");
        }
        let degraded = self.ledger.degraded_entries().count();
        if degraded > 0 {
            warn!(entries = degraded, "Actions used estimated or unavailable token counts");
        }
    }

    fn report(&self) -> PipelineReport {
        PipelineReport {
            run_id: self.run_id,
            features: self
                .implementations
                .iter()
                .filter(|i| !i.is_core())
                .map(|i| i.feature.clone())
                .collect(),
            files_written: self.files_written,
            artifacts: self.artifacts.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

fn rejection(reviewer: &str, result: &ActionResult) -> CrewForgeError {
    let mut quality_issues = result.string_list("quality_issues");
    if let ActionOutcome::Failed(reason) = result.outcome() {
        quality_issues.push(format!("Validation could not be completed: {}", reason));
    }
    CrewForgeError::ValidationRejected {
        reviewer: reviewer.to_string(),
        missing_requirements: result.string_list("missing_requirements"),
        deviations: result.string_list("deviations"),
        quality_issues,
    }
}
