//! Roles driven through the public API with a recording stub gateway.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Route, StubGateway};
use pipeline::{ActionOutcome, CrewForgeError, TokenUsage, UsageSource};
use serde_json::{json, Value};
use team::{ActionRequest, GatewayClient, Seat, Team};

fn team(gateway: &Arc<StubGateway>) -> Team {
    let client = GatewayClient::new(gateway.clone(), Duration::from_secs(1), 1, Duration::from_millis(1));
    Team::assemble(2, client).unwrap()
}

#[tokio::test]
async fn test_analysis_carries_stub_usage_exactly() {
    let gateway = StubGateway::new();
    let team = team(&gateway);
    let request = ActionRequest::AnalyzeRequirements {
        requirements: "Build a URL shortener".into(),
        spec: json!({}),
    };

    let result = team.seat(Seat::ProjectManager).unwrap().run(&request).await.unwrap();

    assert!(result.field("specification").is_some());
    assert_eq!(*result.usage(), TokenUsage::reported(10, 5));
    let doc = result.to_document();
    assert_eq!(doc["input_tokens"], 10);
    assert_eq!(doc["output_tokens"], 5);
}

#[tokio::test]
async fn test_empty_integration_batch_never_reaches_the_gateway() {
    let gateway = StubGateway::new();
    let team = team(&gateway);
    let request = ActionRequest::ReviewIntegration {
        batch: Vec::new(),
        previous: vec![json!({"feature": "core"})],
        requirements: json!({}),
    };

    let result = team.seat(Seat::Architect).unwrap().run(&request).await.unwrap();

    let doc = Value::Object(result.to_document());
    assert_eq!(doc["approved"], false);
    assert!(!doc["conflicts"][0].as_str().unwrap().is_empty());
    assert_eq!(doc["input_tokens"], 0);
    assert_eq!(doc["output_tokens"], 0);
    assert_eq!(result.usage().source, UsageSource::NotInvoked);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_action_lists_bound_actions() {
    let gateway = StubGateway::new();
    let team = team(&gateway);
    let architect = team.seat(Seat::Architect).unwrap();

    let err = architect.resolve("NoSuchAction").unwrap_err();
    assert!(matches!(err, CrewForgeError::ActionNotFound { .. }));
    let message = err.to_string();
    for action in architect.action_names() {
        assert!(message.contains(&action), "{} not listed in {}", action, message);
    }
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_developer_seats_never_wrap_around() {
    let gateway = StubGateway::new();
    let team = team(&gateway);
    assert_eq!(team.developer_count(), 2);
    assert_eq!(team.seat(Seat::Developer(0)).unwrap().name(), "Developer1");
    assert_eq!(team.seat(Seat::Developer(1)).unwrap().name(), "Developer2");
    let err = team.seat(Seat::Developer(2)).unwrap_err();
    assert_eq!(err.kind(), "configuration_error");
    assert!(err.to_string().contains("developer seat 3"));
}

#[tokio::test]
async fn test_fenced_implementation_is_normalised() {
    let gateway = StubGateway::new();
    let team = team(&gateway);
    let request = ActionRequest::ImplementFeature {
        feature: "Click Stats".into(),
        spec: json!({"feature": {"name": "Click Stats"}}),
    };

    let result = team.seat(Seat::Developer(1)).unwrap().run(&request).await.unwrap();

    assert!(matches!(result.outcome(), ActionOutcome::Structured(_)));
    assert_eq!(result.field("feature"), Some(&json!("Click Stats")));
    assert_eq!(
        result.field("implementation").unwrap()["files"]["src/click_stats.rs"],
        json!("// Click Stats\n")
    );
    assert_eq!(gateway.calls(), vec![Route::Implement]);
}
