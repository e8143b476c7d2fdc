//! The inference-client boundary.
//!
//! The orchestration core only depends on the [`InferenceClient`] trait:
//! `generate(prompt, options) -> raw JSON value | error`. The raw value is
//! deliberately left unparsed because provider response shapes are unstable
//! across families and versions; extraction lives in
//! [`crate::core::fusion::extract_reply_text`].

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::api::{
    ChatMessage, ChatRequest, ErrorBody, GenerateOptions, InferenceError, InferenceErrorKind,
};
use crate::utils::url::construct_api_url;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Value, InferenceError>;
}

pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    provider_name: String,
}

impl HttpInferenceClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        let base_url = base_url
            .or_else(|| std::env::var("FANFUSE_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = api_key.or_else(|| std::env::var("FANFUSE_API_KEY").ok());
        let provider_name = if base_url == DEFAULT_BASE_URL {
            "OpenAI".to_string()
        } else {
            "OpenAI-compatible".to_string()
        };

        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url,
            api_key,
            provider_name,
        }
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Value, InferenceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| InferenceError::not_configured(&self.provider_name))?;

        let request = ChatRequest {
            model: options.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let url = construct_api_url(&self.base_url, "chat/completions");
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::new(InferenceErrorKind::Unknown, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(classify_http_failure(status.as_u16(), &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| InferenceError::new(InferenceErrorKind::Unknown, e.to_string()))
    }
}

/// Map an HTTP failure onto the error taxonomy. The status code decides the
/// broad class; the error body refines 429s, which OpenAI-style providers
/// use for both throttling and exhausted quotas.
fn classify_http_failure(status: u16, body: &str) -> InferenceError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error);
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| collapse_whitespace(body));

    let code = detail.as_ref().and_then(|d| {
        d.code
            .as_ref()
            .and_then(|c| c.as_str().map(str::to_owned))
            .or_else(|| d.kind.clone())
    });

    let kind = match status {
        429 => {
            if code.as_deref() == Some("insufficient_quota")
                || message.to_lowercase().contains("quota")
            {
                InferenceErrorKind::QuotaExceeded
            } else {
                InferenceErrorKind::RateLimited
            }
        }
        402 => InferenceErrorKind::QuotaExceeded,
        400 | 404 | 422 => InferenceErrorKind::InvalidRequest,
        401 | 403 => InferenceErrorKind::NotConfigured,
        _ => InferenceErrorKind::Unknown,
    };

    InferenceError::new(kind, message)
}

fn collapse_whitespace(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "<empty>".to_string()
    } else {
        collapsed
    }
}
