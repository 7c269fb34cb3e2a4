//! Anthropic Messages API adapter.
//!
//! The request and response types are shared with the Bedrock adapter, which
//! serves the same message format.

use async_trait::async_trait;
use pipeline::{Completion, GatewayError, LlmConfig, LlmGateway, TokenUsage};
use serde::{Deserialize, Serialize};

use crate::http;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
pub(crate) struct MessagesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<&'static str>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Message<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> Message<'a> {
    pub fn user(content: &'a str) -> Self {
        Self { role: "user", content }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl MessagesResponse {
    /// Concatenates the text blocks; tool and thinking blocks are dropped.
    pub fn into_completion(self) -> Completion {
        let text: String = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text" || block.kind.is_empty())
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        match self.usage {
            Some(usage) => Completion::with_usage(
                text,
                TokenUsage::reported(usage.input_tokens, usage.output_tokens),
            ),
            None => Completion::without_usage(text),
        }
    }
}

/// Anthropic's hosted API.
pub struct AnthropicGateway {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicGateway {
    pub fn new(client: reqwest::Client, config: &LlmConfig, api_key: String) -> Self {
        Self {
            client,
            api_key,
            model: config.model().to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn request<'a>(&'a self, prompt: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: Some(&self.model),
            anthropic_version: None,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![Message::user(prompt)],
        }
    }
}

#[async_trait]
impl LlmGateway for AnthropicGateway {
    async fn ask(&self, prompt: &str) -> Result<Completion, GatewayError> {
        let request = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request(prompt));
        let response: MessagesResponse = http::send_json(request).await?;
        Ok(response.into_completion())
    }

    fn describe(&self) -> String {
        format!("anthropic:{}", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::LlmProviderKind;
    use serde_json::json;

    fn gateway() -> AnthropicGateway {
        let config = LlmConfig {
            provider: LlmProviderKind::Anthropic,
            max_tokens: 1024,
            temperature: 0.2,
            ..LlmConfig::default()
        };
        AnthropicGateway::new(reqwest::Client::new(), &config, "key".into())
    }

    #[test]
    fn test_request_body() {
        let gateway = gateway();
        let body = serde_json::to_value(gateway.request("hello")).unwrap();
        assert_eq!(body["model"], "claude-3-5-sonnet-latest");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"], json!([{"role": "user", "content": "hello"}]));
        assert!(body.get("anthropic_version").is_none());
    }

    #[test]
    fn test_response_text_blocks_and_usage() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "{\"a\": "},
                {"type": "tool_use", "id": "t1"},
                {"type": "text", "text": "1}"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 4},
            "stop_reason": "end_turn"
        }))
        .unwrap();
        let completion = response.into_completion();
        assert_eq!(completion.text, "{\"a\": 1}");
        assert_eq!(completion.usage, Some(TokenUsage::reported(12, 4)));
    }

    #[test]
    fn test_response_without_usage() {
        let response: MessagesResponse =
            serde_json::from_value(json!({"content": [{"type": "text", "text": "hi"}]})).unwrap();
        assert_eq!(response.into_completion(), Completion::without_usage("hi"));
    }
}
