mod client;
pub(crate) mod types;

use anyhow::Result;
use tracing::debug;

use crate::error::AiError;
use crate::message::Message;

use client::OpenAiClient;

const DEFAULT_MAX_TOKENS: u32 = 4096;

// =============================================================================
// OpenAi Agent
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    temperature: Option<f32>,
    max_tokens: u32,
    http: reqwest::Client,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            temperature: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            http: reqwest::Client::new(),
        }
    }

    /// Point the client at an OpenAI-compatible proxy or alternate endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    fn request(&self, messages: &[Message]) -> types::ChatRequest {
        let mut request = types::ChatRequest::new(&self.model)
            .messages(messages.iter().map(types::WireMessage::from));

        if types::uses_max_completion_tokens(&self.model) {
            request = request.max_completion_tokens(self.max_tokens);
        } else {
            request = request.max_tokens(self.max_tokens);
            if let Some(temperature) = self.temperature {
                request = request.temperature(temperature);
            }
        }
        request
    }

    /// Send an ordered conversation and return the first choice's content.
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let request = self.request(messages);
        let response = self.client().chat(&request).await?;

        if let Some(ref usage) = response.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI usage"
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AiError::EmptyCompletion(self.model.clone()).into())
    }
}
