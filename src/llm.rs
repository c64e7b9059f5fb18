//! LLM integration — a thin provider trait over OpenAI-compatible
//! chat-completions endpoints.
//!
//! Both the classifier and the draft writer talk to an [`LlmProvider`];
//! the pipeline never sees HTTP. Retry policy, if any, belongs to the
//! provider's HTTP client, not the orchestration core.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;

use crate::error::LlmError;

/// A single prompt exchange with an LLM.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Base64-encoded images attached to the user turn.
    pub images: Vec<String>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.7,
            max_tokens: 2048,
            images: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

/// Free-text completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Run one completion and return the assistant's text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Endpoint base, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!(model = %config.model, "Using chat-completions provider");
    Arc::new(ChatCompletionsProvider::new(config))
}

/// OpenAI-compatible chat-completions client.
pub struct ChatCompletionsProvider {
    base_url: String,
    api_key: secrecy::SecretString,
    model: String,
    client: reqwest::Client,
}

impl ChatCompletionsProvider {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Build the user message, inlining images as data URLs when present.
    fn user_message(&self, request: &CompletionRequest) -> serde_json::Value {
        if request.images.is_empty() {
            return json!({"role": "user", "content": request.user});
        }
        let mut parts = vec![json!({"type": "text", "text": request.user})];
        for image in &request.images {
            parts.push(json!({
                "type": "image_url",
                "image_url": {"url": format!("data:image/jpeg;base64,{image}")}
            }));
        }
        json!({"role": "user", "content": parts})
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": [
                {"role": "system", "content": request.system},
                self.user_message(&request),
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.model.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::AuthFailed {
                provider: self.model.clone(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: self.model.clone(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        let parsed: serde_json::Value =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                provider: self.model.clone(),
                reason: e.to_string(),
            })?;

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: self.model.clone(),
                reason: "missing choices[0].message.content".to_string(),
            })
    }
}
