use async_trait::async_trait;
use reqwest::Client;

use quill_core::{Message, ToolSchema};

use crate::protocol::{build_chat_body, decode_sse_data, ThinkingOptions};
use crate::provider::{EventStream, ModelError, ModelProvider, Result};
use crate::sse::event_stream_from_sse;

const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const DEFAULT_MODEL: &str = "qwen3-235b-a22b";

/// Streaming client for any OpenAI-compatible chat-completions endpoint.
/// Defaults target the DashScope compatible mode with thinking enabled.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
    thinking: Option<ThinkingOptions>,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: Some(1000),
            thinking: Some(ThinkingOptions {
                enabled: true,
                budget_tokens: 500,
            }),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_thinking(mut self, thinking: Option<ThinkingOptions>) -> Self {
        self.thinking = thinking;
        self
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<EventStream> {
        let body = build_chat_body(&self.model, messages, tools, self.max_tokens, self.thinking);

        log::debug!(
            "requesting completion: model={}, messages={}, tools={}",
            self.model,
            messages.len(),
            tools.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(ModelError::Api(format!("HTTP {}: {}", status, text)));
        }

        let stream = event_stream_from_sse(response, |data| {
            if data.trim().is_empty() {
                return Ok(Vec::new());
            }
            decode_sse_data(data)
        });

        Ok(stream)
    }
}
