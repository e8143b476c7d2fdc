//! Fusion orchestration
//!
//! Builds a synthesis prompt from the confirmed candidate subset, issues
//! one call to the designated fusion model, and extracts text from whatever
//! shape the provider returns. Any failure degrades to a fallback that
//! presents the original responses with a visible notice; [`fuse`] never
//! returns an error.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::api::{GenerateOptions, InferenceClient, InferenceError, InferenceErrorKind};
use crate::core::registry::{FusionModelConfig, ModelRegistry};
use crate::core::selection::{FusionSelection, SelectionGate};

/// The instruction block appended to every fusion prompt. Kept stable so
/// fused outputs are comparable across runs.
const FUSION_INSTRUCTIONS: &str = "## Your Task:
Create a single, superior response that combines the best elements of the responses above.

- Merge complementary information: combine unique insights and details from each response.
- Resolve contradictions: when the responses disagree, favor the most accurate or well-supported claims.
- Eliminate redundancy: remove repeated content while preserving every valuable point.
- Preserve code snippets, formulas, and technical details exactly.
- Produce one coherent, well-organized answer that addresses all aspects of the original question.

Create your synthesized response now:";

/// Deterministic, pure prompt construction. Each selected response appears
/// in the order given, labeled with its model's display name, followed by
/// the fixed instruction block.
pub fn build_fusion_prompt(user_message: &str, selected: &[(String, String)]) -> String {
    let mut prompt = format!(
        "You are an expert AI synthesizer. Here are responses from {} different AI models about: \"{}\"\n\n",
        selected.len(),
        user_message
    );

    for (index, (label, text)) in selected.iter().enumerate() {
        if index > 0 {
            prompt.push_str("\n---\n\n");
        }
        prompt.push_str(&format!("**Response {} ({}):**\n{}\n", index + 1, label, text));
    }

    prompt.push('\n');
    prompt.push_str(FUSION_INSTRUCTIONS);
    prompt
}

/// Extract reply text from a provider response, trying known shapes in a
/// fixed priority order:
///
/// 1. flat `text` field
/// 2. nested `response.text`
/// 3. `candidates[0].content.parts[0].text`
/// 4. `content.parts[0].text`
/// 5. `choices[0].message.content` (chat-completions shape)
/// 6. a raw JSON string
///
/// The shape is unstable across providers and versions, so this detection
/// is part of the orchestration core, not the transport client. An empty
/// result from every strategy is a hard failure.
pub fn extract_reply_text(value: &Value) -> Result<String, String> {
    const PATHS: &[&str] = &[
        "/text",
        "/response/text",
        "/candidates/0/content/parts/0/text",
        "/content/parts/0/text",
        "/choices/0/message/content",
    ];

    for path in PATHS {
        if let Some(text) = value.pointer(path).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return Ok(text.to_string());
            }
        }
    }

    if let Some(text) = value.as_str() {
        if !text.trim().is_empty() {
            return Ok(text.to_string());
        }
    }

    Err(format!(
        "no usable text in provider response: {}",
        summarize_value(value)
    ))
}

fn summarize_value(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.len() <= 200 {
        return rendered;
    }
    // Back off to a char boundary; serialized JSON can put multi-byte
    // sequences anywhere.
    let mut end = 200;
    while !rendered.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &rendered[..end])
}

#[derive(Debug, Clone)]
pub struct FusionResult {
    pub source_model_ids: Vec<String>,
    pub fused_text: String,
    pub produced_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackCause {
    NotConfigured,
    CapacityExhausted,
    Unexpected,
}

impl fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let notice = match self {
            FallbackCause::NotConfigured => {
                "Fusion model not configured. Showing individual responses."
            }
            FallbackCause::CapacityExhausted => {
                "Fusion model rate limit or quota exceeded. Showing individual responses."
            }
            FallbackCause::Unexpected => "Fusion failed. Showing individual responses.",
        };
        f.write_str(notice)
    }
}

#[derive(Debug, Clone)]
pub struct FusionFallback {
    /// The original `(model_id, text)` pairs, rendered unfused.
    pub source_texts: Vec<(String, String)>,
    pub cause: FallbackCause,
    pub reason: String,
}

/// Exactly one variant exists per fusion attempt.
#[derive(Debug, Clone)]
pub enum FusionOutcome {
    Fused(FusionResult),
    Fallback(FusionFallback),
}

fn classify_failure(err: &InferenceError) -> FallbackCause {
    match err.kind {
        InferenceErrorKind::NotConfigured => FallbackCause::NotConfigured,
        kind if kind.is_capacity_exhausted() => FallbackCause::CapacityExhausted,
        _ => FallbackCause::Unexpected,
    }
}

/// Run the fusion call. Infallible by contract: every failure path resolves
/// to [`FusionOutcome::Fallback`]. There is no retry and no sibling
/// substitution here; fusion is a single call to a single designated model.
pub async fn fuse(
    client: &dyn InferenceClient,
    registry: &ModelRegistry,
    fusion: &FusionModelConfig,
    user_message: &str,
    selection: FusionSelection,
) -> FusionOutcome {
    let selected = selection.selected_pairs();

    let fallback = |cause: FallbackCause, reason: String| {
        warn!(%reason, "fusion fell back to raw responses");
        FusionOutcome::Fallback(FusionFallback {
            source_texts: selected.clone(),
            cause,
            reason,
        })
    };

    // The gate enforces this before we are invoked; re-checked here so a
    // selection constructed by hand cannot bypass the invariant.
    if !SelectionGate::CONFIRM_RANGE.contains(&selected.len()) {
        return fallback(
            FallbackCause::Unexpected,
            format!("fusion requires 2 or 3 responses, got {}", selected.len()),
        );
    }

    let labeled: Vec<(String, String)> = selected
        .iter()
        .map(|(model_id, text)| {
            let label = registry
                .find(model_id)
                .map(|m| m.display_name.clone())
                .unwrap_or_else(|| model_id.clone());
            (label, text.clone())
        })
        .collect();

    let prompt = build_fusion_prompt(user_message, &labeled);
    let options = GenerateOptions::new(&fusion.model, fusion.temperature, fusion.max_tokens);

    match client.generate(&prompt, &options).await {
        Ok(value) => match extract_reply_text(&value) {
            Ok(text) => FusionOutcome::Fused(FusionResult {
                source_model_ids: selected.iter().map(|(id, _)| id.clone()).collect(),
                fused_text: text,
                produced_at: Utc::now(),
            }),
            Err(reason) => fallback(FallbackCause::Unexpected, reason),
        },
        Err(err) => {
            let cause = classify_failure(&err);
            fallback(cause, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeSet;

    struct FixedClient(Result<Value, InferenceError>);

    #[async_trait]
    impl InferenceClient for FixedClient {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<Value, InferenceError> {
            self.0.clone()
        }
    }

    struct PromptCapture(std::sync::Mutex<Option<String>>);

    #[async_trait]
    impl InferenceClient for PromptCapture {
        async fn generate(
            &self,
            prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<Value, InferenceError> {
            *self.0.lock().unwrap() = Some(prompt.to_string());
            Ok(json!({ "text": "fused" }))
        }
    }

    fn selection(pairs: &[(&str, &str)]) -> FusionSelection {
        FusionSelection {
            candidates: pairs
                .iter()
                .map(|(id, text)| (id.to_string(), text.to_string()))
                .collect(),
            chosen: (0..pairs.len()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn prompt_contains_labels_and_texts_in_order() {
        let prompt = build_fusion_prompt(
            "compare the options",
            &[
                ("ModelX".to_string(), "foo".to_string()),
                ("ModelY".to_string(), "bar".to_string()),
            ],
        );

        let x = prompt.find("ModelX").expect("label ModelX missing");
        let foo = prompt.find("foo").expect("text foo missing");
        let y = prompt.find("ModelY").expect("label ModelY missing");
        let bar = prompt.find("bar").expect("text bar missing");
        assert!(x < foo && foo < y && y < bar);

        assert!(prompt.contains("compare the options"));
        assert!(prompt.contains("## Your Task:"));
        assert!(prompt.contains("Preserve code snippets, formulas, and technical details exactly."));
    }

    #[test]
    fn prompt_is_deterministic() {
        let pairs = vec![
            ("A".to_string(), "one".to_string()),
            ("B".to_string(), "two".to_string()),
        ];
        assert_eq!(
            build_fusion_prompt("q", &pairs),
            build_fusion_prompt("q", &pairs)
        );
    }

    #[test]
    fn extraction_tries_shapes_in_priority_order() {
        assert_eq!(extract_reply_text(&json!({ "text": "flat" })).unwrap(), "flat");
        assert_eq!(
            extract_reply_text(&json!({ "response": { "text": "nested" } })).unwrap(),
            "nested"
        );
        assert_eq!(
            extract_reply_text(&json!({
                "candidates": [{ "content": { "parts": [{ "text": "candidate" }] } }]
            }))
            .unwrap(),
            "candidate"
        );
        assert_eq!(
            extract_reply_text(&json!({ "content": { "parts": [{ "text": "parts" }] } })).unwrap(),
            "parts"
        );
        assert_eq!(
            extract_reply_text(&json!({
                "choices": [{ "message": { "content": "chat" } }]
            }))
            .unwrap(),
            "chat"
        );
        assert_eq!(extract_reply_text(&json!("raw string")).unwrap(), "raw string");

        // Flat text wins over deeper shapes when both are present.
        assert_eq!(
            extract_reply_text(&json!({
                "text": "flat",
                "response": { "text": "nested" }
            }))
            .unwrap(),
            "flat"
        );
    }

    #[test]
    fn extraction_rejects_empty_and_unknown_shapes() {
        assert!(extract_reply_text(&json!({ "text": "  " })).is_err());
        assert!(extract_reply_text(&json!({ "unrelated": true })).is_err());
        assert!(extract_reply_text(&json!(null)).is_err());
        assert!(extract_reply_text(&json!(42)).is_err());
    }

    #[test]
    fn error_summary_truncates_multibyte_replies_without_panicking() {
        // A long unextractable reply made entirely of multi-byte chars puts
        // a char boundary violation exactly where a naive byte slice cuts.
        let value = json!({ "data": "é".repeat(150) });
        let reason = extract_reply_text(&value).unwrap_err();
        assert!(reason.starts_with("no usable text"));
        assert!(reason.ends_with('…'));
        assert!(reason.len() < 250);
    }

    #[tokio::test]
    async fn fuse_produces_result_on_success() {
        let registry = ModelRegistry::load().unwrap();
        let client = FixedClient(Ok(json!({ "text": "the fused answer" })));

        let outcome = fuse(
            &client,
            &registry,
            registry.fusion_config(),
            "question",
            selection(&[("gemini-2.0-flash", "a"), ("qwen-3-32b", "b")]),
        )
        .await;

        match outcome {
            FusionOutcome::Fused(result) => {
                assert_eq!(result.fused_text, "the fused answer");
                assert_eq!(
                    result.source_model_ids,
                    vec!["gemini-2.0-flash".to_string(), "qwen-3-32b".to_string()]
                );
            }
            FusionOutcome::Fallback(fb) => panic!("unexpected fallback: {}", fb.reason),
        }
    }

    #[tokio::test]
    async fn fuse_labels_prompt_with_display_names() {
        let registry = ModelRegistry::load().unwrap();
        let client = PromptCapture(std::sync::Mutex::new(None));

        fuse(
            &client,
            &registry,
            registry.fusion_config(),
            "question",
            selection(&[("gemini-2.0-flash", "a"), ("qwen-3-32b", "b")]),
        )
        .await;

        let prompt = client.0.lock().unwrap().take().unwrap();
        assert!(prompt.contains("Gemini 2.0 Flash"));
        assert!(prompt.contains("Qwen 3 32B"));
    }

    #[tokio::test]
    async fn fuse_never_errors_for_any_failure_class() {
        let registry = ModelRegistry::load().unwrap();
        let sel = &[("gemini-2.0-flash", "a"), ("qwen-3-32b", "b")];

        let cases: Vec<(Result<Value, InferenceError>, FallbackCause)> = vec![
            (
                Err(InferenceError::not_configured("test")),
                FallbackCause::NotConfigured,
            ),
            (
                Err(InferenceError::new(InferenceErrorKind::RateLimited, "429")),
                FallbackCause::CapacityExhausted,
            ),
            (
                Err(InferenceError::new(InferenceErrorKind::QuotaExceeded, "quota")),
                FallbackCause::CapacityExhausted,
            ),
            (
                Err(InferenceError::new(InferenceErrorKind::Unknown, "boom")),
                FallbackCause::Unexpected,
            ),
            (Ok(json!({ "text": "" })), FallbackCause::Unexpected),
            (Ok(json!({ "weird": "shape" })), FallbackCause::Unexpected),
        ];

        for (reply, expected_cause) in cases {
            let client = FixedClient(reply);
            let outcome =
                fuse(&client, &registry, registry.fusion_config(), "q", selection(sel)).await;
            match outcome {
                FusionOutcome::Fallback(fb) => {
                    assert_eq!(fb.cause, expected_cause);
                    assert_eq!(fb.source_texts.len(), 2);
                    assert!(!fb.reason.is_empty());
                }
                FusionOutcome::Fused(_) => panic!("expected fallback"),
            }
        }
    }

    #[tokio::test]
    async fn fuse_rejects_hand_built_out_of_range_selections() {
        let registry = ModelRegistry::load().unwrap();
        let client = FixedClient(Ok(json!({ "text": "never called" })));

        let outcome = fuse(
            &client,
            &registry,
            registry.fusion_config(),
            "q",
            selection(&[("solo", "only")]),
        )
        .await;
        match outcome {
            FusionOutcome::Fallback(fb) => {
                assert_eq!(fb.cause, FallbackCause::Unexpected);
                assert!(fb.reason.contains("2 or 3"));
            }
            FusionOutcome::Fused(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn fallback_notices_distinguish_causes() {
        let not_configured = FallbackCause::NotConfigured.to_string();
        let capacity = FallbackCause::CapacityExhausted.to_string();
        let unexpected = FallbackCause::Unexpected.to_string();

        assert_ne!(not_configured, capacity);
        assert_ne!(capacity, unexpected);
        assert!(not_configured.contains("not configured"));
        assert!(capacity.contains("rate limit"));
    }
}
