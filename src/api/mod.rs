use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Deserialize)]
pub struct ErrorBody {
    pub error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
pub struct ErrorDetail {
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<serde_json::Value>,
}

/// Per-call generation parameters. Defaults come from the model's registry
/// entry; callers may override before dispatch.
#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub model: String,
    /// Sampling temperature, clamped to [0.0, 2.0] at construction.
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerateOptions {
    pub fn new(model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            temperature: temperature.clamp(0.0, 2.0),
            max_tokens: max_tokens.max(1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InferenceErrorKind {
    RateLimited,
    QuotaExceeded,
    InvalidRequest,
    NotConfigured,
    Unknown,
}

impl InferenceErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InferenceErrorKind::RateLimited => "rate_limited",
            InferenceErrorKind::QuotaExceeded => "quota_exceeded",
            InferenceErrorKind::InvalidRequest => "invalid_request",
            InferenceErrorKind::NotConfigured => "not_configured",
            InferenceErrorKind::Unknown => "unknown",
        }
    }

    /// Rate-limit and quota failures are the recoverable class: the fan-out
    /// orchestrator may substitute a sibling model, and fusion falls back to
    /// raw concatenation.
    pub fn is_capacity_exhausted(self) -> bool {
        matches!(
            self,
            InferenceErrorKind::RateLimited | InferenceErrorKind::QuotaExceeded
        )
    }
}

#[derive(Clone, Debug)]
pub struct InferenceError {
    pub kind: InferenceErrorKind,
    pub message: String,
}

impl InferenceError {
    pub fn new(kind: InferenceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_configured(provider: &str) -> Self {
        Self::new(
            InferenceErrorKind::NotConfigured,
            format!(
                "No API key configured for {provider}. Set FANFUSE_API_KEY or add one to the config file."
            ),
        )
    }
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for InferenceError {}

pub mod client;

pub use client::{HttpInferenceClient, InferenceClient};
