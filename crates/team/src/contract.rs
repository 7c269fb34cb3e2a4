//! Output contracts.
//!
//! Shapes a normalised outcome into the document each action guarantees:
//! lifts a lone `"response"` wrapper, nests the payload under the action's
//! wrap key and fills every guaranteed key with a neutral default. Failed
//! outcomes pass through untouched.

use pipeline::{lift_response, ActionOutcome};
use serde_json::{json, Map, Value};

use crate::actions::ActionRequest;

/// Conflict recorded when a review rejects a batch without saying why.
pub const UNSPECIFIED_CONFLICT: &str =
    "Integration review did not approve the batch and reported no specific conflicts";

pub(crate) fn shape(request: &ActionRequest, outcome: ActionOutcome) -> ActionOutcome {
    let lifted = match outcome {
        ActionOutcome::Failed(reason) => return ActionOutcome::Failed(reason),
        other => lift_response(other),
    };
    let kind = request.kind();

    let mut doc = match kind.wrap_key() {
        Some(key) => wrap(key, lifted),
        None => match lifted {
            ActionOutcome::Structured(map) => map,
            ActionOutcome::Raw(text) => {
                let mut map = Map::new();
                map.insert("response".into(), Value::String(text));
                map
            }
            ActionOutcome::Failed(reason) => return ActionOutcome::Failed(reason),
        },
    };

    match request {
        ActionRequest::AnalyzeRequirements { .. }
        | ActionRequest::RefineRequirements { .. }
        | ActionRequest::BreakdownSystem { .. }
        | ActionRequest::IdentifyFeatures { .. }
        | ActionRequest::ReviewCode { .. } => {}
        ActionRequest::CreateProjectStructure { .. } => {
            ensure_nested(&mut doc, "project_structure", "files", json!({}));
        }
        ActionRequest::RunTests { .. } => {
            ensure_nested(&mut doc, "test_files", "files", json!({}));
            ensure_nested(&mut doc, "test_files", "results", json!({}));
        }
        ActionRequest::ImplementFeature { feature, .. } => shape_implementation(&mut doc, feature),
        ActionRequest::ReviewIntegration { .. } => shape_integration_review(&mut doc),
        ActionRequest::ReviewRequirements { .. } => {
            let approved = truthy(doc.get("approved"));
            doc.insert("approved".into(), Value::Bool(approved));
            for key in ["missing_requirements", "deviations", "quality_issues"] {
                ensure_list(&mut doc, key);
            }
        }
        ActionRequest::PlanWork { .. } => {
            for key in ["sprints", "dependencies", "effort_per_sprint"] {
                if !doc.get(key).map(is_container).unwrap_or(false) {
                    doc.insert(key.into(), json!({}));
                }
            }
        }
    }

    debug_assert!(kind.wrap_key().map(|k| doc.contains_key(k)).unwrap_or(true));
    ActionOutcome::Structured(doc)
}

/// Nests the payload under `key` unless the LLM already did.
fn wrap(key: &str, outcome: ActionOutcome) -> Map<String, Value> {
    let inner = match outcome {
        ActionOutcome::Structured(map) => {
            if map.get(key).map(Value::is_object).unwrap_or(false) {
                return map;
            }
            Value::Object(map)
        }
        ActionOutcome::Raw(text) => json!({ "response": text }),
        ActionOutcome::Failed(reason) => json!({ "error": reason }),
    };
    let mut doc = Map::new();
    doc.insert(key.to_string(), inner);
    doc
}

fn shape_implementation(doc: &mut Map<String, Value>, feature: &str) {
    if !doc.get("feature").map(Value::is_string).unwrap_or(false) {
        doc.insert("feature".into(), Value::String(feature.to_string()));
    }

    let mut implementation = match doc.remove("implementation") {
        Some(Value::Object(map)) => map,
        Some(Value::String(text)) => {
            let mut map = Map::new();
            map.insert("notes".into(), Value::String(text));
            map
        }
        _ => Map::new(),
    };

    // Files returned at the top level belong under the implementation.
    if !implementation.get("files").map(is_container).unwrap_or(false) {
        let files = doc
            .remove("files")
            .filter(is_container)
            .unwrap_or_else(|| json!({}));
        implementation.insert("files".into(), files);
    }
    doc.insert("implementation".into(), Value::Object(implementation));
}

fn shape_integration_review(doc: &mut Map<String, Value>) {
    let approved = match doc.get("approved") {
        Some(value) => truthy(Some(value)),
        None => truthy(doc.get("success")),
    };
    doc.insert("approved".into(), Value::Bool(approved));
    for key in ["conflicts", "new_work_items", "recommendations"] {
        ensure_list(doc, key);
    }

    let no_conflicts = doc
        .get("conflicts")
        .and_then(Value::as_array)
        .map(Vec::is_empty)
        .unwrap_or(true);
    if !approved && no_conflicts {
        let conflict = match doc.get("response").and_then(Value::as_str) {
            Some(text) => format!("Integration review returned an unstructured verdict: {}", text),
            None => UNSPECIFIED_CONFLICT.to_string(),
        };
        doc.insert("conflicts".into(), json!([conflict]));
    }
}

fn ensure_nested(doc: &mut Map<String, Value>, outer: &str, inner: &str, default: Value) {
    if let Some(Value::Object(map)) = doc.get_mut(outer) {
        if !map.get(inner).map(is_container).unwrap_or(false) {
            map.insert(inner.to_string(), default);
        }
    }
}

/// Coerces a field to a list: `null`/missing become `[]`, scalars a
/// one-element list.
fn ensure_list(doc: &mut Map<String, Value>, key: &str) {
    let value = match doc.remove(key) {
        Some(Value::Array(items)) => Value::Array(items),
        Some(Value::Null) | None => json!([]),
        Some(Value::String(s)) if s.trim().is_empty() => json!([]),
        Some(other) => json!([other]),
    };
    doc.insert(key.to_string(), value);
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{SprintPlan, WorkItem};

    fn structured(value: Value) -> ActionOutcome {
        match value {
            Value::Object(map) => ActionOutcome::Structured(map),
            _ => panic!("expected object"),
        }
    }

    fn shaped(request: &ActionRequest, value: Value) -> Value {
        match shape(request, structured(value)) {
            ActionOutcome::Structured(map) => Value::Object(map),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    fn analyze() -> ActionRequest {
        ActionRequest::AnalyzeRequirements {
            requirements: "x".into(),
            spec: json!({}),
        }
    }

    fn integration() -> ActionRequest {
        ActionRequest::ReviewIntegration {
            batch: vec![json!({})],
            previous: Vec::new(),
            requirements: json!({}),
        }
    }

    #[test]
    fn test_analysis_is_wrapped_under_specification() {
        let doc = shaped(&analyze(), json!({"features": ["a"]}));
        assert_eq!(doc, json!({"specification": {"features": ["a"]}}));
    }

    #[test]
    fn test_already_wrapped_payload_is_not_double_wrapped() {
        let doc = shaped(&analyze(), json!({"specification": {"features": []}}));
        assert_eq!(doc, json!({"specification": {"features": []}}));
    }

    #[test]
    fn test_response_wrapper_is_lifted_before_wrapping() {
        let doc = shaped(&analyze(), json!({"response": {"components": ["api"]}}));
        assert_eq!(doc, json!({"specification": {"components": ["api"]}}));
    }

    #[test]
    fn test_raw_text_is_kept_under_wrap_key() {
        let outcome = shape(&analyze(), ActionOutcome::Raw("not json".into()));
        assert_eq!(outcome, structured(json!({"specification": {"response": "not json"}})));
    }

    #[test]
    fn test_failed_outcome_passes_through() {
        let outcome = shape(&integration(), ActionOutcome::Failed("timeout".into()));
        assert_eq!(outcome, ActionOutcome::Failed("timeout".into()));
    }

    #[test]
    fn test_project_structure_and_tests_get_file_defaults() {
        let structure = ActionRequest::CreateProjectStructure {
            specification: json!({}),
        };
        assert_eq!(
            shaped(&structure, json!({"directories": ["src"]})),
            json!({"project_structure": {"directories": ["src"], "files": {}}})
        );

        let tests = ActionRequest::RunTests {
            implementations: Vec::new(),
            focus: None,
        };
        assert_eq!(
            shaped(&tests, json!({"files": {"tests/a.rs": "x"}})),
            json!({"test_files": {"files": {"tests/a.rs": "x"}, "results": {}}})
        );
    }

    #[test]
    fn test_implementation_defaults_and_stray_files() {
        let request = ActionRequest::ImplementFeature {
            feature: "search".into(),
            spec: json!({}),
        };
        assert_eq!(
            shaped(&request, json!({"files": {"src/search.rs": "fn s() {}"}})),
            json!({"feature": "search", "implementation": {"files": {"src/search.rs": "fn s() {}"}}})
        );
        assert_eq!(
            shaped(&request, json!({"implementation": "see notes"})),
            json!({"feature": "search", "implementation": {"notes": "see notes", "files": {}}})
        );
    }

    #[test]
    fn test_integration_review_reads_success_when_approved_missing() {
        let doc = shaped(&integration(), json!({"success": true, "feedback": "ok"}));
        assert_eq!(doc["approved"], true);
        assert_eq!(doc["conflicts"], json!([]));
        assert_eq!(doc["new_work_items"], json!([]));
        assert_eq!(doc["recommendations"], json!([]));
    }

    #[test]
    fn test_rejection_without_conflicts_gets_one() {
        let doc = shaped(&integration(), json!({"approved": false}));
        assert_eq!(doc["conflicts"], json!([UNSPECIFIED_CONFLICT]));

        let raw = shape(&integration(), ActionOutcome::Raw("looks broken".into()));
        let ActionOutcome::Structured(map) = raw else {
            panic!("expected structured")
        };
        assert_eq!(map["approved"], false);
        assert!(map["conflicts"][0].as_str().unwrap().contains("looks broken"));
    }

    #[test]
    fn test_requirements_review_defaults() {
        let request = ActionRequest::ReviewRequirements {
            requirements: json!({}),
            implementation: json!({}),
            original_prompt: "p".into(),
        };
        let doc = shaped(&request, json!({"approved": "true", "deviations": "uses sqlite"}));
        assert_eq!(doc["approved"], true);
        assert_eq!(doc["deviations"], json!(["uses sqlite"]));
        assert_eq!(doc["missing_requirements"], json!([]));
        assert_eq!(doc["quality_issues"], json!([]));
    }

    #[test]
    fn test_plan_defaults() {
        let request = ActionRequest::PlanWork {
            work_items: vec![WorkItem::remediation("x").unwrap()],
            current_plan: SprintPlan::default(),
        };
        let doc = shaped(&request, json!({"sprints": "none"}));
        assert_eq!(doc, json!({"sprints": {}, "dependencies": {}, "effort_per_sprint": {}}));
    }
}
