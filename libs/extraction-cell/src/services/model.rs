use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_utils::json::extract_json_object;

/// What the model is told about the structure it must produce.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaHint {
    pub schema_name: String,
    pub system_prompt: String,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Language model is not configured")]
    NotConfigured,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Unreadable provider response: {0}")]
    Malformed(String),
}

impl ModelError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::NotConfigured => false,
            ModelError::Transport(_) | ModelError::Malformed(_) => true,
            ModelError::Provider { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// The opaque language-understanding capability: text in, semi-structured JSON out.
///
/// The returned value is untrusted. It may be any JSON shape, including a bare
/// string when the provider ignored the requested format.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn understand(&self, text: &str, hint: &SchemaHint) -> Result<Value, ModelError>;
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiModel {
    api_key: String,
    base_url: String,
    model: String,
    http_client: Client,
}

impl OpenAiModel {
    pub fn new(config: &AppConfig) -> Result<Self, ModelError> {
        if !config.is_model_configured() {
            return Err(ModelError::NotConfigured);
        }

        // The extractor enforces the per-attempt timeout; this one only guards against hung sockets.
        let http_client = Client::builder()
            .timeout(config.extraction_timeout() + Duration::from_secs(5))
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        Ok(Self {
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.openai_model.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn understand(&self, text: &str, hint: &SchemaHint) -> Result<Value, ModelError> {
        debug!("Requesting '{}' extraction from {}", hint.schema_name, self.model);

        let prompt = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": hint.system_prompt },
                { "role": "user", "content": text }
            ],
            "temperature": 0,
            "response_format": { "type": "json_object" }
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&prompt)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Provider { status: status.as_u16(), body });
        }

        let ai_response: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let content = ai_response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ModelError::Malformed("missing choices[0].message.content".to_string()))?;

        Ok(match extract_json_object(content) {
            Some(object) => Value::Object(object),
            None => {
                warn!("Model reply for '{}' contained no JSON object", hint.schema_name);
                Value::String(content.to_string())
            }
        })
    }
}

/// Stand-in used when no provider is configured; every call is unavailable.
pub struct UnavailableModel;

#[async_trait]
impl LanguageModel for UnavailableModel {
    async fn understand(&self, _text: &str, _hint: &SchemaHint) -> Result<Value, ModelError> {
        Err(ModelError::NotConfigured)
    }
}
