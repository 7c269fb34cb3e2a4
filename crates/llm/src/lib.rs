//! CrewForge LLM provider adapters.
//!
//! Implements [`pipeline::LlmGateway`] for AWS Bedrock, OpenAI-compatible
//! chat endpoints and the Anthropic Messages API. The adapters make exactly
//! one HTTP request per call; timeouts and retries belong to the caller.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, response
//! parsing and status mapping live here. The [`pipeline`] crate sees only
//! [`pipeline::LlmGateway`] and [`pipeline::GatewayError`].

use std::sync::Arc;

use pipeline::{GatewayError, LlmConfig, LlmGateway, LlmProviderKind};
use tracing::info;

mod anthropic;
mod bedrock;
mod http;
mod openai;

pub use anthropic::AnthropicGateway;
pub use bedrock::BedrockGateway;
pub use openai::OpenAiGateway;

/// Builds the gateway selected by `config.provider`.
///
/// The API key must already be resolved; a missing key is a
/// [`GatewayError::Configuration`].
pub fn build_gateway(config: &LlmConfig) -> Result<Arc<dyn LlmGateway>, GatewayError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            GatewayError::Configuration(format!(
                "no API key configured for {:?}; set llm.api_key or {}",
                config.provider,
                config.provider.api_key_env()
            ))
        })?;
    let client = http::client()?;

    let gateway: Arc<dyn LlmGateway> = match config.provider {
        LlmProviderKind::Bedrock => Arc::new(BedrockGateway::new(client, config, api_key)),
        LlmProviderKind::OpenAi => Arc::new(OpenAiGateway::new(client, config, api_key)),
        LlmProviderKind::Anthropic => Arc::new(AnthropicGateway::new(client, config, api_key)),
    };
    info!(gateway = %gateway.describe(), "LLM gateway ready");
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_a_configuration_error() {
        let config = LlmConfig::default();
        match build_gateway(&config) {
            Err(GatewayError::Configuration(message)) => {
                assert!(message.contains("AWS_BEARER_TOKEN_BEDROCK"))
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn test_provider_selection() {
        let config = LlmConfig {
            provider: LlmProviderKind::OpenAi,
            api_key: Some("sk-test".into()),
            model_id: Some("gpt-4o".into()),
            ..LlmConfig::default()
        };
        let gateway = build_gateway(&config).unwrap();
        assert_eq!(gateway.describe(), "openai:gpt-4o");
    }
}
