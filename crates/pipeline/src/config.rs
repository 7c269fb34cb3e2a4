//! Team configuration.
//!
//! Plain data with serde defaults; the `cli` crate loads it from YAML and fills
//! credentials from the environment. [`TeamConfig::validate`] is the single
//! place its invariants are checked.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CrewForgeError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Bedrock,
    #[serde(alias = "open_ai", alias = "open-ai")]
    OpenAi,
    Anthropic,
}

impl LlmProviderKind {
    /// Model used when the configuration names none.
    pub fn default_model(self) -> &'static str {
        match self {
            LlmProviderKind::Bedrock => "anthropic.claude-3-5-sonnet-20241022-v2:0",
            LlmProviderKind::OpenAi => "gpt-4-turbo",
            LlmProviderKind::Anthropic => "claude-3-5-sonnet-latest",
        }
    }

    /// Environment variable consulted for the API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            LlmProviderKind::Bedrock => "AWS_BEARER_TOKEN_BEDROCK",
            LlmProviderKind::OpenAi => "OPENAI_API_KEY",
            LlmProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl std::fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LlmProviderKind::Bedrock => "bedrock",
            LlmProviderKind::OpenAi => "openai",
            LlmProviderKind::Anthropic => "anthropic",
        };
        f.write_str(name)
    }
}

/// LLM backend settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: Option<String>,
    pub model_id: Option<String>,
    pub region: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Override for OpenAI-compatible endpoints.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            api_key: None,
            model_id: None,
            region: "us-east-1".to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            base_url: None,
        }
    }
}

impl LlmConfig {
    /// The configured model, or the provider default.
    pub fn model(&self) -> &str {
        self.model_id
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }
}

// Keeps the API key out of logs.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model_id", &self.model_id)
            .field("region", &self.region)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Call budgets for the gateway client and the integration loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub call_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub max_remediation_rounds: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 300,
            max_attempts: 3,
            retry_backoff_ms: 2000,
            max_remediation_rounds: 1,
        }
    }
}

impl ExecutionConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Base of the exponential back-off schedule.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Complete team configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    pub llm: LlmConfig,
    pub num_developers: usize,
    pub workspace_dir: PathBuf,
    pub execution: ExecutionConfig,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            num_developers: 2,
            workspace_dir: PathBuf::from("./output"),
            execution: ExecutionConfig::default(),
        }
    }
}

impl TeamConfig {
    /// Checks the configuration invariants.
    pub fn validate(&self) -> Result<(), CrewForgeError> {
        if self.num_developers == 0 {
            return Err(CrewForgeError::config("num_developers must be at least 1"));
        }
        if self.execution.max_attempts == 0 {
            return Err(CrewForgeError::config("execution.max_attempts must be at least 1"));
        }
        if self.execution.call_timeout_secs == 0 {
            return Err(CrewForgeError::config(
                "execution.call_timeout_secs must be at least 1",
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(CrewForgeError::config("llm.max_tokens must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(CrewForgeError::config(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.region.trim().is_empty() && self.llm.provider == LlmProviderKind::Bedrock {
            return Err(CrewForgeError::config("llm.region is required for bedrock"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TeamConfig::default();
        assert_eq!(config.num_developers, 2);
        assert_eq!(config.llm.provider, LlmProviderKind::Bedrock);
        assert_eq!(config.llm.region, "us-east-1");
        assert_eq!(config.execution.call_timeout(), Duration::from_secs(300));
        assert_eq!(config.execution.max_remediation_rounds, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: TeamConfig = serde_json::from_value(serde_json::json!({
            "llm": {"provider": "openai", "model_id": "gpt-4o"},
            "execution": {"max_attempts": 5}
        }))
        .unwrap();
        assert_eq!(config.llm.provider, LlmProviderKind::OpenAi);
        assert_eq!(config.llm.model(), "gpt-4o");
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.execution.max_attempts, 5);
        assert_eq!(config.execution.retry_backoff_ms, 2000);
    }

    #[test]
    fn test_model_falls_back_to_provider_default() {
        let llm = LlmConfig {
            provider: LlmProviderKind::OpenAi,
            model_id: Some("  ".into()),
            ..LlmConfig::default()
        };
        assert_eq!(llm.model(), "gpt-4-turbo");
    }

    #[test]
    fn test_validate_rejects_zero_developers() {
        let config = TeamConfig {
            num_developers: 0,
            ..TeamConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("num_developers"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let llm = LlmConfig {
            api_key: Some("sk-secret".into()),
            ..LlmConfig::default()
        };
        let rendered = format!("{:?}", llm);
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
