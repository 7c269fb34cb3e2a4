//! AWS Bedrock adapter for Anthropic models.
//!
//! Authenticates with a Bedrock API key sent as a bearer token, so no SigV4
//! signing is needed.

use async_trait::async_trait;
use pipeline::{Completion, GatewayError, LlmConfig, LlmGateway};

use crate::anthropic::{Message, MessagesRequest, MessagesResponse};
use crate::http;

const BEDROCK_VERSION: &str = "bedrock-2023-05-31";

pub struct BedrockGateway {
    client: reqwest::Client,
    api_key: String,
    model: String,
    region: String,
    max_tokens: u32,
    temperature: f32,
}

impl BedrockGateway {
    pub fn new(client: reqwest::Client, config: &LlmConfig, api_key: String) -> Self {
        Self {
            client,
            api_key,
            model: config.model().to_string(),
            region: config.region.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn url(&self) -> String {
        format!(
            "https://bedrock-runtime.{}.amazonaws.com/model/{}/invoke",
            self.region,
            self.model.replace(':', "%3A")
        )
    }

    fn request<'a>(&'a self, prompt: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: None,
            anthropic_version: Some(BEDROCK_VERSION),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![Message::user(prompt)],
        }
    }
}

#[async_trait]
impl LlmGateway for BedrockGateway {
    async fn ask(&self, prompt: &str) -> Result<Completion, GatewayError> {
        let request = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt));
        let response: MessagesResponse = http::send_json(request).await?;
        Ok(response.into_completion())
    }

    fn describe(&self) -> String {
        format!("bedrock:{}@{}", self.model, self.region)
    }
}
