//! Prompt templates.
//!
//! One Handlebars template per [`ActionKind`], registered under the action's
//! name. Request payloads are rendered to pretty JSON before substitution so
//! templates only ever see strings.

use handlebars::Handlebars;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::actions::{ActionKind, ActionRequest};

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("invalid prompt template '{name}': {message}")]
    Template { name: String, message: String },

    #[error("failed to render prompt '{name}': {message}")]
    Render { name: String, message: String },
}

/// Compiled prompt templates for the whole catalogue.
pub struct PromptBook {
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for PromptBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptBook")
            .field("templates", &self.registry.get_templates().len())
            .finish()
    }
}

impl PromptBook {
    /// Compiles every template.
    pub fn new() -> Result<Self, PromptError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        for kind in ActionKind::ALL {
            registry
                .register_template_string(kind.name(), template_for(kind))
                .map_err(|e| PromptError::Template {
                    name: kind.name().to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(Self { registry })
    }

    /// Renders the prompt for `request`.
    pub fn render(&self, request: &ActionRequest) -> Result<String, PromptError> {
        let name = request.kind().name();
        self.registry
            .render(name, &Value::Object(context_for(request)))
            .map_err(|e| PromptError::Render {
                name: name.to_string(),
                message: e.to_string(),
            })
    }
}

fn context_for(request: &ActionRequest) -> Map<String, Value> {
    let mut ctx = Map::new();
    let mut put = |key: &str, value: String| {
        ctx.insert(key.to_string(), Value::String(value));
    };
    match request {
        ActionRequest::AnalyzeRequirements { requirements, spec } => {
            put("requirements", requirements.clone());
            put("spec", pretty(spec));
        }
        ActionRequest::RefineRequirements { analysis, feedback }
        | ActionRequest::IdentifyFeatures { analysis, feedback } => {
            put("analysis", pretty(analysis));
            put("feedback", feedback.clone());
        }
        ActionRequest::BreakdownSystem {
            requirements,
            feedback,
        } => {
            put("requirements", pretty(requirements));
            put("feedback", feedback.clone());
        }
        ActionRequest::CreateProjectStructure { specification } => {
            put("specification", pretty(specification));
        }
        ActionRequest::ImplementFeature { feature, spec } => {
            put("feature", feature.clone());
            put("feature_slug", pipeline::slugify(feature));
            put("spec", pretty(spec));
        }
        ActionRequest::ReviewCode { code, context } => {
            put("code", pretty(code));
            put("context", pretty(context));
        }
        ActionRequest::ReviewIntegration {
            batch,
            previous,
            requirements,
        } => {
            put("batch", pretty_list(batch));
            put("previous", pretty_list(previous));
            put("requirements", pretty(requirements));
        }
        ActionRequest::ReviewRequirements {
            requirements,
            implementation,
            original_prompt,
        } => {
            put("requirements", pretty(requirements));
            put("implementation", pretty(implementation));
            put("original_prompt", original_prompt.clone());
        }
        ActionRequest::PlanWork {
            work_items,
            current_plan,
        } => {
            put(
                "work_items",
                serde_json::to_string_pretty(work_items).unwrap_or_default(),
            );
            put("current_plan", pretty(&Value::Object(current_plan.to_document())));
        }
        ActionRequest::RunTests {
            implementations,
            focus,
        } => {
            put("implementations", pretty_list(implementations));
            put("focus", focus.clone().unwrap_or_default());
        }
    }
    ctx
}

fn pretty(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn pretty_list(values: &[Value]) -> String {
    serde_json::to_string_pretty(values).unwrap_or_default()
}

const JSON_ONLY: &str = "Return only a valid JSON object. Do not include any explanatory text before or after the JSON.";

fn template_for(kind: ActionKind) -> String {
    let body = match kind {
        ActionKind::AnalyzeRequirements => ANALYZE_REQUIREMENTS,
        ActionKind::RefineRequirements => REFINE_REQUIREMENTS,
        ActionKind::BreakdownSystem => BREAKDOWN_SYSTEM,
        ActionKind::IdentifyFeatures => IDENTIFY_FEATURES,
        ActionKind::CreateProjectStructure => CREATE_PROJECT_STRUCTURE,
        ActionKind::ImplementFeature => IMPLEMENT_FEATURE,
        ActionKind::ReviewCode => REVIEW_CODE,
        ActionKind::ReviewIntegration => REVIEW_INTEGRATION,
        ActionKind::ReviewRequirements => REVIEW_REQUIREMENTS,
        ActionKind::PlanWork => PLAN_WORK,
        ActionKind::RunTests => RUN_TESTS,
    };
    format!("{}\n\n{}\n", body.trim(), JSON_ONLY)
}

const ANALYZE_REQUIREMENTS: &str = r#"
You are the project manager of a software team. Analyze the project requirements
and specification below and produce a detailed technical specification.

Requirements:
{{requirements}}

Specification:
{{spec}}

Respond with this structure:
{
  "features": [{"name": "...", "type": "core | feature", "description": "...", "priority": "High | Medium | Low"}],
  "data_models": [...],
  "api_endpoints": [...],
  "technical_requirements": [...],
  "testing": [...]
}
"#;

const REFINE_REQUIREMENTS: &str = r#"
You are the project manager of a software team. The current analysis could not be
turned into implementable features.

Feedback:
{{feedback}}

Current analysis:
{{analysis}}

Refine the analysis so that it lists concrete, independently implementable
features. Respond with this structure:
{
  "features": [{"name": "...", "type": "feature", "description": "..."}],
  "technical_requirements": [...]
}
"#;

const BREAKDOWN_SYSTEM: &str = r#"
You are the software architect. Break the system described below down into
components that developers can implement independently.

Feedback:
{{feedback}}

Requirements:
{{requirements}}

Respond with this structure:
{
  "components": [{"name": "...", "type": "core | feature", "responsibilities": [...], "interfaces": [...]}]
}
"#;

const IDENTIFY_FEATURES: &str = r#"
You are the software architect. The analysis below only describes the core of the
system; the core is already implemented.

Feedback:
{{feedback}}

Analysis:
{{analysis}}

Identify the user-facing features to build on top of the core. Do not list the
core itself. Respond with this structure:
{
  "features": [{"name": "...", "type": "feature", "description": "...", "depends_on": [...]}]
}
"#;

const CREATE_PROJECT_STRUCTURE: &str = r#"
You are the software architect. Based on the specification below, create the
initial project structure and files.

Specification:
{{specification}}

Include the build manifest with dependencies, a README with setup and usage
instructions, ignore files, the package skeleton and the test directory layout.
Respond with this structure:
{
  "files": {"relative/path": "file content"}
}
"#;

const IMPLEMENT_FEATURE: &str = r#"
You are a software developer. Implement the following feature with tests.

Feature: {{feature}}

Specification and context:
{{spec}}

Respond with this structure:
{
  "feature": "{{feature}}",
  "implementation": {
    "files": {
      "src/{{feature_slug}}.ext": "source code",
      "tests/test_{{feature_slug}}.ext": "test code"
    }
  },
  "notes": "integration notes"
}
"#;

const REVIEW_CODE: &str = r#"
You are a code reviewer. Review the code below for quality, potential bugs,
performance issues and security concerns.

Code:
{{code}}

Context:
{{context}}

Respond with this structure:
{
  "approved": true,
  "score": 0,
  "issues": [...],
  "suggestions": [...]
}
"#;

const REVIEW_INTEGRATION: &str = r#"
You are the software architect reviewing how new implementations integrate with
the existing code.

New implementations:
{{batch}}

Previously integrated implementations:
{{previous}}

Requirements:
{{requirements}}

Check interface compatibility, dependency management and conflicts between the
implementations. Respond with this structure:
{
  "approved": true,
  "conflicts": ["..."],
  "new_work_items": [{"title": "...", "description": "...", "priority": "High | Medium | Low", "estimated_effort": 3, "dependencies": [], "kind": "implementation | review | test"}],
  "recommendations": ["..."]
}
"#;

const REVIEW_REQUIREMENTS: &str = r#"
Validate that the implementation satisfies the original request and the agreed
requirements.

Original request:
{{original_prompt}}

Requirements:
{{requirements}}

Implementation:
{{implementation}}

Respond with this structure:
{
  "approved": true,
  "missing_requirements": ["..."],
  "deviations": ["..."],
  "quality_issues": ["..."]
}
"#;

const PLAN_WORK: &str = r#"
You are the project manager. Schedule the work items below into sprints,
respecting their dependencies and putting high-priority items first.

Work items:
{{work_items}}

Current plan:
{{current_plan}}

Refer to work items by their exact title. Respond with this structure:
{
  "sprints": {"1": ["title", "..."], "2": ["..."]},
  "dependencies": {"title": ["prerequisite title"]},
  "effort_per_sprint": {"1": 6}
}
"#;

const RUN_TESTS: &str = r#"
You are the QA engineer. Write and evaluate tests for the implementations below.
{{#if focus}}
Focus on: {{focus}}
{{/if}}
Implementations:
{{implementations}}

Respond with this structure:
{
  "files": {"tests/relative/path": "test code"},
  "results": {"passed": true, "coverage": "...", "issues": [...]}
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_template_compiles() {
        let book = PromptBook::new().unwrap();
        assert!(format!("{:?}", book).contains("11"));
    }

    #[test]
    fn test_render_substitutes_without_html_escaping() {
        let book = PromptBook::new().unwrap();
        let prompt = book
            .render(&ActionRequest::AnalyzeRequirements {
                requirements: "Build a <url> shortener & redirector".into(),
                spec: json!({"language": "rust"}),
            })
            .unwrap();
        assert!(prompt.contains("Build a <url> shortener & redirector"));
        assert!(prompt.contains("\"language\": \"rust\""));
        assert!(prompt.ends_with(&format!("{}\n", JSON_ONLY)));
    }

    #[test]
    fn test_run_tests_focus_is_optional() {
        let book = PromptBook::new().unwrap();
        let unfocused = book
            .render(&ActionRequest::RunTests {
                implementations: vec![json!({"feature": "a"})],
                focus: None,
            })
            .unwrap();
        assert!(!unfocused.contains("Focus on"));

        let focused = book
            .render(&ActionRequest::RunTests {
                implementations: Vec::new(),
                focus: Some("Add tests for login".into()),
            })
            .unwrap();
        assert!(focused.contains("Focus on: Add tests for login"));
    }

    #[test]
    fn test_implement_feature_uses_slug_in_paths() {
        let book = PromptBook::new().unwrap();
        let prompt = book
            .render(&ActionRequest::ImplementFeature {
                feature: "URL Shortening".into(),
                spec: json!({}),
            })
            .unwrap();
        assert!(prompt.contains("src/url_shortening.ext"));
    }
}
