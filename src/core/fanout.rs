//! Fan-out orchestration
//!
//! Dispatches one inference call per selected model concurrently and
//! reports progress over a channel of `(FanOutEvent, turn_id)` pairs. Each
//! task settles independently: one model failing never cancels or delays
//! its siblings. The consumer tracks completion with a [`BatchTracker`]
//! keyed by model ID, so duplicate settle events cannot double-count and
//! events from a superseded turn are discarded.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::{GenerateOptions, InferenceClient, InferenceError};
use crate::core::fusion::extract_reply_text;
use crate::core::registry::{ModelDescriptor, ModelRegistry, MAX_FANOUT_MODELS};
use crate::ui::format::strip_reasoning_blocks;

#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub enum FanOutFailure {
    Provider(InferenceError),
    /// The provider answered, but no usable text could be extracted.
    MalformedResponse(String),
}

impl fmt::Display for FanOutFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanOutFailure::Provider(err) => write!(f, "{err}"),
            FanOutFailure::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

/// One (turn, model) inference request. Created when dispatch begins and
/// mutated only by its own task; exactly one terminal status per instance.
#[derive(Debug, Clone)]
pub struct FanOutRequest {
    pub turn_id: u64,
    pub model_id: String,
    pub status: RequestStatus,
    pub result_text: Option<String>,
    pub error: Option<FanOutFailure>,
    /// Set when a rate-limited model was served by its designated sibling.
    pub served_by: Option<String>,
}

impl FanOutRequest {
    fn pending(turn_id: u64, model_id: &str) -> Self {
        Self {
            turn_id,
            model_id: model_id.to_string(),
            status: RequestStatus::Pending,
            result_text: None,
            error: None,
            served_by: None,
        }
    }

    fn succeed(mut self, text: String, served_by: Option<String>) -> Self {
        self.status = RequestStatus::Succeeded;
        self.result_text = Some(text);
        self.served_by = served_by;
        self
    }

    fn fail(mut self, failure: FanOutFailure) -> Self {
        self.status = RequestStatus::Failed;
        self.error = Some(failure);
        self
    }
}

#[derive(Debug, Clone)]
pub enum FanOutEvent {
    /// The task for `model_id` has started; render a typing indicator.
    Dispatched { model_id: String },
    /// The task settled with a terminal status.
    Settled(FanOutRequest),
}

pub struct DispatchParams {
    pub client: Arc<dyn InferenceClient>,
    pub registry: Arc<ModelRegistry>,
    pub turn_id: u64,
    pub message: String,
    pub attachments: Vec<Attachment>,
    pub model_ids: Vec<String>,
    /// Per-model temperature overrides from config.
    pub temperature_overrides: HashMap<String, f32>,
}

#[derive(Debug)]
pub enum DispatchError {
    NoModelsSelected,
    TooManyModels(usize),
    UnknownModel(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoModelsSelected => write!(f, "select at least one model"),
            DispatchError::TooManyModels(n) => {
                write!(f, "{n} models selected; at most {MAX_FANOUT_MODELS} are allowed")
            }
            DispatchError::UnknownModel(id) => write!(f, "unknown model: {id}"),
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Clone)]
pub struct FanOutService {
    tx: mpsc::UnboundedSender<(FanOutEvent, u64)>,
}

impl FanOutService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(FanOutEvent, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Spawn one task per selected model. Returns the tracker the consumer
    /// uses to detect batch completion. Validation failures reject the
    /// whole dispatch before any task starts.
    pub fn dispatch(&self, params: DispatchParams) -> Result<BatchTracker, DispatchError> {
        let DispatchParams {
            client,
            registry,
            turn_id,
            message,
            attachments,
            model_ids,
            temperature_overrides,
        } = params;

        if model_ids.is_empty() {
            return Err(DispatchError::NoModelsSelected);
        }
        if model_ids.len() > MAX_FANOUT_MODELS {
            return Err(DispatchError::TooManyModels(model_ids.len()));
        }

        let mut descriptors = Vec::with_capacity(model_ids.len());
        for id in &model_ids {
            let descriptor = registry
                .find(id)
                .ok_or_else(|| DispatchError::UnknownModel(id.clone()))?;
            descriptors.push(descriptor.clone());
        }

        let tracker = BatchTracker::new(turn_id, descriptors.iter().map(|d| d.id.clone()));

        for descriptor in descriptors {
            let tx = self.tx.clone();
            let client = Arc::clone(&client);
            let registry = Arc::clone(&registry);
            let message = message.clone();
            let attachments = attachments.clone();
            let temperature = temperature_overrides
                .get(&descriptor.id)
                .copied()
                .unwrap_or(descriptor.default_temperature);

            tokio::spawn(async move {
                let _ = tx.send((
                    FanOutEvent::Dispatched {
                        model_id: descriptor.id.clone(),
                    },
                    turn_id,
                ));

                let request = run_model_request(
                    client.as_ref(),
                    &registry,
                    &descriptor,
                    turn_id,
                    &message,
                    &attachments,
                    temperature,
                )
                .await;

                let _ = tx.send((FanOutEvent::Settled(request), turn_id));
            });
        }

        Ok(tracker)
    }
}

/// Build the prompt for one model. Attachments are only forwarded to models
/// whose descriptor declares support for them.
fn compose_prompt(message: &str, attachments: &[Attachment], descriptor: &ModelDescriptor) -> String {
    if attachments.is_empty() || !descriptor.supports_attachments {
        return message.to_string();
    }

    let mut prompt = String::from(message);
    prompt.push_str("\n\nAttached files:\n");
    for attachment in attachments {
        prompt.push_str(&format!("--- {} ---\n{}\n", attachment.name, attachment.content));
    }
    prompt
}

async fn run_model_request(
    client: &dyn InferenceClient,
    registry: &ModelRegistry,
    descriptor: &ModelDescriptor,
    turn_id: u64,
    message: &str,
    attachments: &[Attachment],
    temperature: f32,
) -> FanOutRequest {
    let request = FanOutRequest::pending(turn_id, &descriptor.id);
    let prompt = compose_prompt(message, attachments, descriptor);
    let options = GenerateOptions::new(&descriptor.id, temperature, descriptor.default_max_tokens);

    let (reply, served_by) = match client.generate(&prompt, &options).await {
        Ok(value) => (Ok(value), None),
        Err(err) if err.kind.is_capacity_exhausted() => {
            // Substitution policy: retry once against the designated
            // sibling, then surface the original failure.
            match registry.rate_limit_sibling(&descriptor.id) {
                Some(sibling) => {
                    warn!(
                        model = %descriptor.id,
                        sibling = %sibling.id,
                        "rate limited; retrying with sibling model"
                    );
                    let sibling_options = GenerateOptions::new(
                        &sibling.id,
                        sibling.default_temperature,
                        sibling.default_max_tokens,
                    );
                    match client.generate(&prompt, &sibling_options).await {
                        Ok(value) => (Ok(value), Some(sibling.id.clone())),
                        Err(_) => (Err(err), None),
                    }
                }
                None => (Err(err), None),
            }
        }
        Err(err) => (Err(err), None),
    };

    match reply {
        Ok(value) => match extract_reply_text(&value) {
            Ok(text) => {
                let text = if descriptor.id.contains("qwen") {
                    strip_reasoning_blocks(&text)
                } else {
                    text
                };
                debug!(model = %descriptor.id, turn = turn_id, "model request settled");
                request.succeed(text, served_by)
            }
            Err(msg) => request.fail(FanOutFailure::MalformedResponse(msg)),
        },
        Err(err) => request.fail(FanOutFailure::Provider(err)),
    }
}

/// What happened when a settle event was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettleOutcome {
    /// First terminal status for this model; `batch_complete` is true only
    /// for the settle that completed the batch.
    Recorded { batch_complete: bool },
    /// This model already settled; the event was ignored.
    Duplicate,
    /// The event belongs to a different turn; discard it.
    StaleTurn,
}

/// Tracks settlement of one fan-out batch. Completion is a set comparison
/// over model identity, not a counter, so duplicate callbacks are harmless.
#[derive(Debug)]
pub struct BatchTracker {
    turn_id: u64,
    expected: HashSet<String>,
    settled: HashMap<String, FanOutRequest>,
    completion_observed: bool,
}

impl BatchTracker {
    fn new(turn_id: u64, expected: impl IntoIterator<Item = String>) -> Self {
        Self {
            turn_id,
            expected: expected.into_iter().collect(),
            settled: HashMap::new(),
            completion_observed: false,
        }
    }

    pub fn turn_id(&self) -> u64 {
        self.turn_id
    }

    pub fn record(&mut self, request: &FanOutRequest) -> SettleOutcome {
        if request.turn_id != self.turn_id {
            debug!(
                event_turn = request.turn_id,
                current_turn = self.turn_id,
                "discarding settle event from stale turn"
            );
            return SettleOutcome::StaleTurn;
        }
        if !self.expected.contains(&request.model_id) || self.settled.contains_key(&request.model_id)
        {
            return SettleOutcome::Duplicate;
        }

        self.settled.insert(request.model_id.clone(), request.clone());

        let complete = self.settled.len() == self.expected.len() && !self.completion_observed;
        if complete {
            self.completion_observed = true;
        }
        SettleOutcome::Recorded {
            batch_complete: complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.settled.len() == self.expected.len()
    }

    /// Successful, non-empty responses in dispatch-independent (model id)
    /// order of settlement; used as the fusion candidate set.
    pub fn successful_responses(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .settled
            .values()
            .filter(|r| r.status == RequestStatus::Succeeded)
            .filter_map(|r| {
                r.result_text
                    .as_ref()
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| (r.model_id.clone(), t.clone()))
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn settled_requests(&self) -> impl Iterator<Item = &FanOutRequest> {
        self.settled.values()
    }
}
