//! OpenAI chat completions adapter. Also serves OpenAI-compatible endpoints
//! through `llm.base_url`.

use async_trait::async_trait;
use pipeline::{Completion, GatewayError, LlmConfig, LlmGateway, TokenUsage};
use serde::{Deserialize, Serialize};

use crate::anthropic::Message;
use crate::http;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl ChatResponse {
    fn into_completion(self) -> Result<Completion, GatewayError> {
        let usage = self
            .usage
            .map(|u| TokenUsage::reported(u.prompt_tokens, u.completion_tokens));
        let choice = self.choices.into_iter().next().ok_or_else(|| GatewayError::Provider {
            message: "response contained no choices".into(),
            transient: false,
            consumed: usage,
        })?;
        let text = choice.message.content.unwrap_or_default();
        Ok(match usage {
            Some(usage) => Completion::with_usage(text, usage),
            None => Completion::without_usage(text),
        })
    }
}

pub struct OpenAiGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiGateway {
    pub fn new(client: reqwest::Client, config: &LlmConfig, api_key: String) -> Self {
        let base_url = config
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Self {
            client,
            api_key,
            base_url,
            model: config.model().to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn ask(&self, prompt: &str) -> Result<Completion, GatewayError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![Message::user(prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let request = self.client.post(self.url()).bearer_auth(&self.api_key).json(&body);
        let response: ChatResponse = http::send_json(request).await?;
        response.into_completion()
    }

    fn describe(&self) -> String {
        format!("openai:{}", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::LlmProviderKind;
    use serde_json::json;

    fn config(base_url: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: LlmProviderKind::OpenAi,
            base_url: base_url.map(str::to_string),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_base_url_override() {
        let default = OpenAiGateway::new(reqwest::Client::new(), &config(None), "k".into());
        assert_eq!(default.url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(default.describe(), "openai:gpt-4-turbo");

        let local = OpenAiGateway::new(reqwest::Client::new(), &config(Some("http://localhost:1234/v1/")), "k".into());
        assert_eq!(local.url(), "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn test_response_parsing() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 30, "completion_tokens": 9, "total_tokens": 39}
        }))
        .unwrap();
        let completion = response.into_completion().unwrap();
        assert_eq!(completion.text, "{\"ok\": true}");
        assert_eq!(completion.usage, Some(TokenUsage::reported(30, 9)));
    }

    #[test]
    fn test_empty_choices_keep_consumed_usage() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [],
            "usage": {"prompt_tokens": 30, "completion_tokens": 0}
        }))
        .unwrap();
        match response.into_completion() {
            Err(GatewayError::Provider { consumed, transient, .. }) => {
                assert!(!transient);
                assert_eq!(consumed, Some(TokenUsage::reported(30, 0)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
