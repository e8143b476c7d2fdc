//! TUI-less ask/chat drivers
//!
//! Consumes the fan-out event channel: typing indicator on dispatch, a
//! panel per settled request, and the selection gate offer once the whole
//! batch settles. All state lives in an explicit [`ChatContext`]; there are
//! no process-wide singletons.

use std::collections::HashMap;
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use crate::api::{HttpInferenceClient, InferenceClient};
use crate::core::config::Config;
use crate::core::fanout::{
    Attachment, BatchTracker, DispatchParams, FanOutEvent, FanOutRequest, FanOutService,
    RequestStatus, SettleOutcome,
};
use crate::core::fusion::{fuse, FusionOutcome};
use crate::core::message::ConversationTurn;
use crate::core::registry::{FusionModelConfig, ModelRegistry};
use crate::core::selection::{ConfirmError, SelectionGate};
use crate::session::{FallbackStore, JsonFileStore, SessionStore};
use crate::ui::format::{format_answer, FormatOptions};
use crate::ui::panels;

/// Models queried when neither the command line nor the config selects any.
const DEFAULT_MODELS: &[&str] = &[
    "llama4-maverick-17b-128e-instruct",
    "gemini-2.0-flash",
    "qwen-3-32b",
];

/// Everything one chat session needs, passed explicitly to the drivers.
pub struct ChatContext {
    pub client: Arc<dyn InferenceClient>,
    pub registry: Arc<ModelRegistry>,
    pub config: Config,
    pub store: FallbackStore,
    pub session_id: String,
    next_turn_id: u64,
}

impl ChatContext {
    pub fn new(session_id: String) -> Result<Self, Box<dyn Error>> {
        let config = Config::load()?;
        let registry = Arc::new(ModelRegistry::load()?);
        let client: Arc<dyn InferenceClient> =
            Arc::new(HttpInferenceClient::new(config.base_url.clone(), None));

        let primary = JsonFileStore::at_default_location()
            .map(|store| Box::new(store) as Box<dyn SessionStore>);
        let store = FallbackStore::new(primary);

        let next_turn_id = store
            .load_history(&session_id)
            .iter()
            .map(|turn| turn.id)
            .max()
            .map_or(1, |max| max + 1);

        Ok(Self {
            client,
            registry,
            config,
            store,
            session_id,
            next_turn_id,
        })
    }

    fn format_options(&self) -> FormatOptions {
        FormatOptions {
            markdown: self.config.markdown_enabled(),
            syntax: self.config.syntax_enabled(),
        }
    }

    fn fusion_config(&self) -> FusionModelConfig {
        let mut fusion = self.registry.fusion_config().clone();
        if let Some(model) = self.config.fusion_model.as_deref() {
            fusion.model = model.to_string();
        }
        fusion
    }

    fn display_name(&self, model_id: &str) -> String {
        self.registry
            .find(model_id)
            .map(|m| m.display_name.clone())
            .unwrap_or_else(|| model_id.to_string())
    }

    fn icon(&self, model_id: &str) -> String {
        self.registry
            .find(model_id)
            .map(|m| m.icon.clone())
            .unwrap_or_else(|| "•".to_string())
    }
}

fn resolve_models(cli_models: &[String], config: &Config) -> Vec<String> {
    if !cli_models.is_empty() {
        return cli_models.to_vec();
    }
    if !config.default_models.is_empty() {
        return config.default_models.clone();
    }
    DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
}

fn load_attachments(paths: &[PathBuf]) -> Result<Vec<Attachment>, Box<dyn Error>> {
    paths
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read attachment {}: {e}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(Attachment { name, content })
        })
        .collect()
}

fn time_label() -> String {
    Local::now().format("%H:%M").to_string()
}

/// Render one settled request. Rendering happens before the history append
/// for that request.
fn render_settled(ctx: &mut ChatContext, request: &FanOutRequest) {
    let name = ctx.display_name(&request.model_id);
    let icon = ctx.icon(&request.model_id);

    match request.status {
        RequestStatus::Succeeded => {
            let text = request.result_text.as_deref().unwrap_or_default();
            let body = format_answer(text, &ctx.format_options());
            println!("\n{}", panels::response_panel(&icon, &name, &time_label(), &body));
            if let Some(served_by) = request.served_by.as_deref() {
                let served_name = ctx.display_name(served_by);
                println!("{}", panels::substitution_note(&name, &served_name));
            }
            let session_id = ctx.session_id.clone();
            ctx.store.append_turn(
                &session_id,
                ConversationTurn::assistant(request.turn_id, text, &request.model_id),
            );
        }
        RequestStatus::Failed => {
            let failure = request
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "failed".to_string());
            println!("\n{}", panels::error_panel(&icon, &name, &failure));
        }
        RequestStatus::Pending => {}
    }
}

/// Dispatch one user turn and drive it to completion.
async fn run_turn(
    ctx: &mut ChatContext,
    service: &FanOutService,
    rx: &mut mpsc::UnboundedReceiver<(FanOutEvent, u64)>,
    prompt: &str,
    attachments: Vec<Attachment>,
    model_ids: Vec<String>,
) -> Result<BatchTracker, Box<dyn Error>> {
    let turn_id = ctx.next_turn_id;
    ctx.next_turn_id += 1;

    let session_id = ctx.session_id.clone();
    ctx.store
        .append_turn(&session_id, ConversationTurn::user(turn_id, prompt));

    let temperature_overrides: HashMap<String, f32> = model_ids
        .iter()
        .filter_map(|id| ctx.config.temperature_override(id).map(|t| (id.clone(), t)))
        .collect();

    let mut tracker = service.dispatch(DispatchParams {
        client: Arc::clone(&ctx.client),
        registry: Arc::clone(&ctx.registry),
        turn_id,
        message: prompt.to_string(),
        attachments,
        model_ids,
        temperature_overrides,
    })?;

    while !tracker.is_complete() {
        let Some((event, event_turn)) = rx.recv().await else {
            break;
        };
        // Events from a superseded turn are dropped here; the tracker
        // double-checks on record.
        if event_turn != tracker.turn_id() {
            continue;
        }
        match event {
            FanOutEvent::Dispatched { model_id } => {
                let name = ctx.display_name(&model_id);
                let icon = ctx.icon(&model_id);
                println!("{}", panels::typing_line(&icon, &name));
            }
            FanOutEvent::Settled(request) => {
                if let SettleOutcome::Recorded { .. } = tracker.record(&request) {
                    render_settled(ctx, &request);
                }
            }
        }
    }

    Ok(tracker)
}

fn parse_selection(input: &str, candidate_count: usize) -> Option<Vec<usize>> {
    if input.eq_ignore_ascii_case("all") {
        return Some((0..candidate_count).collect());
    }
    let indices: Option<Vec<usize>> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .ok()
                .filter(|n| (1..=candidate_count).contains(n))
                .map(|n| n - 1)
        })
        .collect();
    indices.filter(|list| !list.is_empty())
}

/// Offer the selection gate for a settled batch and run fusion on confirm.
async fn offer_fusion(
    ctx: &mut ChatContext,
    lines: &mut Lines<BufReader<Stdin>>,
    prompt: &str,
    tracker: &BatchTracker,
) -> Result<(), Box<dyn Error>> {
    let candidates = tracker.successful_responses();
    let mut gate = SelectionGate::default();
    if !gate.offer(candidates) {
        return Ok(());
    }

    if let Some(selection_view) = gate.selection() {
        println!("\n✨ Fuse responses? Candidates:");
        for (index, (model_id, text)) in selection_view.candidates.iter().enumerate() {
            let preview: String = text.chars().take(80).collect();
            let ellipsis = if text.chars().count() > 80 { "…" } else { "" };
            println!(
                "  [{}] {} - {}{}",
                index + 1,
                ctx.display_name(model_id),
                preview.replace('\n', " "),
                ellipsis
            );
        }
    }

    loop {
        print!("Select 2-3 responses (e.g. 1,3), 'all', or 'skip': ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            gate.cancel();
            return Ok(());
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("skip") {
            gate.cancel();
            return Ok(());
        }

        let candidate_count = gate
            .selection()
            .map(|s| s.candidates.len())
            .unwrap_or_default();
        let Some(desired) = parse_selection(input, candidate_count) else {
            println!("Enter candidate numbers between 1 and {candidate_count}.");
            continue;
        };

        if let Some(selection) = gate.selection() {
            let current = selection.chosen.clone();
            for index in 0..candidate_count {
                let want = desired.contains(&index);
                if want != current.contains(&index) {
                    gate.toggle(index);
                }
            }
        }

        match gate.confirm() {
            Ok(selection) => {
                let fusion_config = ctx.fusion_config();
                println!("🔄 Fusing with {}…", ctx.display_name(&fusion_config.model));
                let outcome = fuse(
                    ctx.client.as_ref(),
                    &ctx.registry,
                    &fusion_config,
                    prompt,
                    selection,
                )
                .await;
                render_fusion_outcome(ctx, tracker.turn_id(), &fusion_config, outcome);
                return Ok(());
            }
            Err(ConfirmError::CountOutOfRange(count)) => {
                println!("Fusion needs 2 or 3 responses; {count} selected. Try again.");
            }
            Err(ConfirmError::GateClosed) => return Ok(()),
        }
    }
}

fn render_fusion_outcome(
    ctx: &mut ChatContext,
    turn_id: u64,
    fusion_config: &FusionModelConfig,
    outcome: FusionOutcome,
) {
    match outcome {
        FusionOutcome::Fused(result) => {
            let body = format_answer(&result.fused_text, &ctx.format_options());
            println!(
                "\n{}",
                panels::fused_banner(
                    &ctx.display_name(&fusion_config.model),
                    &time_label(),
                    &body
                )
            );
            let session_id = ctx.session_id.clone();
            let origin = format!("{}-fused", fusion_config.model);
            ctx.store.append_turn(
                &session_id,
                ConversationTurn::assistant(turn_id, result.fused_text, origin),
            );
        }
        FusionOutcome::Fallback(fallback) => {
            let labeled: Vec<(String, String)> = fallback
                .source_texts
                .iter()
                .map(|(model_id, text)| {
                    (
                        ctx.display_name(model_id),
                        format_answer(text, &ctx.format_options()),
                    )
                })
                .collect();
            println!(
                "\n{}",
                panels::fallback_banner(&fallback.cause.to_string(), &labeled)
            );
        }
    }
}

pub async fn run_ask(
    prompt: Vec<String>,
    models: Vec<String>,
    session: String,
    no_fuse: bool,
    attachment_paths: Vec<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: fanfuse ask <prompt>");
        std::process::exit(1);
    }

    let mut ctx = ChatContext::new(session)?;
    let model_ids = resolve_models(&models, &ctx.config);
    let attachments = load_attachments(&attachment_paths)?;

    let (service, mut rx) = FanOutService::new();
    let tracker = run_turn(&mut ctx, &service, &mut rx, &prompt, attachments, model_ids).await?;

    if !no_fuse {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        offer_fusion(&mut ctx, &mut lines, &prompt, &tracker).await?;
    }

    Ok(())
}

pub async fn run_chat(
    models: Vec<String>,
    session: String,
    no_fuse: bool,
) -> Result<(), Box<dyn Error>> {
    let mut ctx = ChatContext::new(session)?;
    let model_ids = resolve_models(&models, &ctx.config);

    let history = ctx.store.load_history(&ctx.session_id);
    if !history.is_empty() {
        println!("Resuming session '{}' ({} turns)", ctx.session_id, history.len());
    }
    println!("Chatting with: {}", model_ids.join(", "));
    println!("Type a message, or 'exit' to quit.\n");

    let (service, mut rx) = FanOutService::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim().to_string();
        if prompt.is_empty() {
            continue;
        }
        if prompt.eq_ignore_ascii_case("exit") || prompt.eq_ignore_ascii_case("quit") {
            break;
        }

        let tracker = run_turn(
            &mut ctx,
            &service,
            &mut rx,
            &prompt,
            Vec::new(),
            model_ids.clone(),
        )
        .await?;

        if !no_fuse {
            offer_fusion(&mut ctx, &mut lines, &prompt, &tracker).await?;
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_models_win_over_config_defaults() {
        let config = Config {
            default_models: vec!["qwen-3-32b".to_string()],
            ..Default::default()
        };
        assert_eq!(
            resolve_models(&["gemini-2.0-flash".to_string()], &config),
            vec!["gemini-2.0-flash".to_string()]
        );
        assert_eq!(resolve_models(&[], &config), vec!["qwen-3-32b".to_string()]);
        assert_eq!(resolve_models(&[], &Config::default()).len(), 3);
    }

    #[test]
    fn selection_parsing_accepts_lists_and_all() {
        assert_eq!(parse_selection("1,3", 3), Some(vec![0, 2]));
        assert_eq!(parse_selection("2 3", 3), Some(vec![1, 2]));
        assert_eq!(parse_selection("all", 2), Some(vec![0, 1]));
        assert_eq!(parse_selection("0", 3), None);
        assert_eq!(parse_selection("4", 3), None);
        assert_eq!(parse_selection("x,y", 3), None);
        assert_eq!(parse_selection("", 3), None);
    }
}
