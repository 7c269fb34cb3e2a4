//! Shared fixtures: a stub gateway that answers each action from a script
//! (falling back to a happy-path reply) and records what it was asked.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipeline::{
    slugify, ArtifactPath, Completion, GatewayError, LlmGateway, TeamConfig, TokenUsage, Workspace,
};
use serde_json::{json, Map, Value};
use workspace::MemoryWorkspace;

/// Usage the stub reports for every answered call.
pub const STUB_USAGE: (u64, u64) = (10, 5);

/// Which action a prompt belongs to, read from its opening line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Analyze,
    Refine,
    Breakdown,
    Identify,
    Structure,
    Implement,
    CodeReview,
    Integration,
    Validation,
    Plan,
    Tests,
}

impl Route {
    pub fn of(prompt: &str) -> Route {
        const PREFIXES: [(&str, Route); 11] = [
            ("You are the project manager of a software team. Analyze", Route::Analyze),
            ("You are the project manager of a software team. The current", Route::Refine),
            ("You are the project manager. Schedule", Route::Plan),
            ("You are the software architect. Break", Route::Breakdown),
            ("You are the software architect. The analysis below", Route::Identify),
            ("You are the software architect. Based on", Route::Structure),
            ("You are the software architect reviewing", Route::Integration),
            ("You are a software developer.", Route::Implement),
            ("You are a code reviewer.", Route::CodeReview),
            ("You are the QA engineer.", Route::Tests),
            ("Validate that the implementation", Route::Validation),
        ];
        PREFIXES
            .iter()
            .find(|(prefix, _)| prompt.starts_with(prefix))
            .map(|(_, route)| *route)
            .unwrap_or_else(|| panic!("unroutable prompt: {}", &prompt[..prompt.len().min(80)]))
    }
}

pub enum Reply {
    Json(Value),
    Text(String),
    Error(GatewayError),
    /// Never answers.
    Hang,
}

#[derive(Default)]
pub struct StubGateway {
    scripted: Mutex<HashMap<Route, VecDeque<Reply>>>,
    calls: Mutex<Vec<Route>>,
    prompts: Mutex<Vec<String>>,
}

impl StubGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues `reply` for the next call on `route`.
    pub fn script(&self, route: Route, reply: Reply) -> &Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(route)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<Route> {
        self.calls.lock().unwrap().clone()
    }

    /// The prompt of every call on `route`, in call order.
    pub fn prompts(&self, route: Route) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| Route::of(p) == route)
            .cloned()
            .collect()
    }

    pub fn count(&self, route: Route) -> usize {
        self.calls().iter().filter(|r| **r == route).count()
    }
}

#[async_trait]
impl LlmGateway for StubGateway {
    async fn ask(&self, prompt: &str) -> Result<Completion, GatewayError> {
        let route = Route::of(prompt);
        let reply = {
            self.calls.lock().unwrap().push(route);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.scripted
                .lock()
                .unwrap()
                .get_mut(&route)
                .and_then(VecDeque::pop_front)
        };
        let usage = TokenUsage::reported(STUB_USAGE.0, STUB_USAGE.1);
        match reply.unwrap_or_else(|| default_reply(route, prompt)) {
            Reply::Json(value) => Ok(Completion::with_usage(value.to_string(), usage)),
            Reply::Text(text) => Ok(Completion::with_usage(text, usage)),
            Reply::Error(e) => Err(e),
            Reply::Hang => std::future::pending().await,
        }
    }

    fn describe(&self) -> String {
        "stub".into()
    }
}

fn default_reply(route: Route, prompt: &str) -> Reply {
    match route {
        Route::Analyze => Reply::Json(json!({
            "features": [
                {"name": "core", "type": "core"},
                {"name": "Shorten", "type": "feature"},
                {"name": "Redirect", "type": "feature"},
                {"name": "Stats", "type": "feature"}
            ],
            "data_models": ["Link"]
        })),
        Route::Refine | Route::Breakdown | Route::Identify => Reply::Json(json!({
            "features": [{"name": "Shorten", "type": "feature"}]
        })),
        Route::Structure => Reply::Json(json!({
            "files": {"Cargo.toml": "[package]\nname = \"shortener\"\n", "README.md": "# Shortener\n"}
        })),
        Route::Implement => Reply::Text(implementation_reply(prompt)),
        Route::CodeReview => Reply::Json(json!({"approved": true, "score": 8, "issues": []})),
        Route::Integration => Reply::Json(json!({"approved": true, "conflicts": []})),
        Route::Validation => Reply::Json(json!({"approved": true})),
        // Unusable plan; the orchestrator schedules locally.
        Route::Plan => Reply::Json(json!({"sprints": {}})),
        Route::Tests => Reply::Json(json!({
            "files": {"tests/integration.rs": "#[test]\nfn works() {}\n"},
            "results": {"passed": true}
        })),
    }
}

/// A fenced implementation of whatever feature the prompt names.
fn implementation_reply(prompt: &str) -> String {
    let feature = prompt
        .lines()
        .find_map(|line| line.strip_prefix("Feature: "))
        .unwrap_or("unknown")
        .trim();
    let mut files = Map::new();
    files.insert(
        format!("src/{}.rs", slugify(feature)),
        Value::String(format!("// {}\n", feature)),
    );
    let body = json!({"feature": feature, "implementation": {"files": files}});
    format!("Here you go:\n```json\n{}\n```\n", body)
}

/// Fast-failing configuration for tests.
pub fn config(developers: usize) -> TeamConfig {
    let mut config = TeamConfig::default();
    config.num_developers = developers;
    config.execution.call_timeout_secs = 1;
    config.execution.max_attempts = 1;
    config.execution.retry_backoff_ms = 1;
    config
}

/// Reads `docs/<name>.json` back as JSON.
pub async fn artifact(ws: &MemoryWorkspace, name: &str) -> Option<Value> {
    let text = ws.read(&ArtifactPath::document(name)).await.unwrap()?;
    Some(serde_json::from_str(&text).unwrap())
}
