//! Transcript persistence
//!
//! Best-effort storage for session transcripts. The orchestration core
//! treats this as fire-and-forget: a failing store must never block
//! rendering, so [`FallbackStore`] degrades silently to an in-memory store
//! and logs a warning.

use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;

use directories::ProjectDirs;
use tracing::warn;

use crate::core::message::ConversationTurn;

/// Oldest session files are pruned past this count.
const MAX_SESSIONS: usize = 20;

pub trait SessionStore {
    fn append_turn(
        &mut self,
        session_id: &str,
        turn: ConversationTurn,
    ) -> Result<(), Box<dyn Error>>;
    fn load_history(&self, session_id: &str) -> Result<Vec<ConversationTurn>, Box<dyn Error>>;
    fn persist(
        &mut self,
        session_id: &str,
        turns: &[ConversationTurn],
    ) -> Result<(), Box<dyn Error>>;
}

/// Keep session IDs filesystem-safe.
fn sanitize_session_id(session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn at_default_location() -> Option<Self> {
        ProjectDirs::from("org", "permacommons", "fanfuse")
            .map(|dirs| Self::new(dirs.data_dir().join("sessions")))
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.root
            .join(format!("{}.json", sanitize_session_id(session_id)))
    }

    fn prune_old_sessions(&self) {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return;
        };
        let mut sessions: Vec<(std::time::SystemTime, PathBuf)> = entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                Some((modified, e.path()))
            })
            .collect();
        if sessions.len() <= MAX_SESSIONS {
            return;
        }
        sessions.sort_by_key(|(modified, _)| *modified);
        for (_, path) in sessions.iter().take(sessions.len() - MAX_SESSIONS) {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to prune old session");
            }
        }
    }
}

impl SessionStore for JsonFileStore {
    fn append_turn(
        &mut self,
        session_id: &str,
        turn: ConversationTurn,
    ) -> Result<(), Box<dyn Error>> {
        let mut turns = self.load_history(session_id)?;
        turns.push(turn);
        self.persist(session_id, &turns)
    }

    fn load_history(&self, session_id: &str) -> Result<Vec<ConversationTurn>, Box<dyn Error>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        let turns = serde_json::from_str(&content)?;
        Ok(turns)
    }

    fn persist(
        &mut self,
        session_id: &str,
        turns: &[ConversationTurn],
    ) -> Result<(), Box<dyn Error>> {
        std::fs::create_dir_all(&self.root)?;
        let content = serde_json::to_string_pretty(turns)?;
        std::fs::write(self.session_path(session_id), content)?;
        self.prune_old_sessions();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    sessions: HashMap<String, Vec<ConversationTurn>>,
}

impl SessionStore for MemoryStore {
    fn append_turn(
        &mut self,
        session_id: &str,
        turn: ConversationTurn,
    ) -> Result<(), Box<dyn Error>> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(turn);
        Ok(())
    }

    fn load_history(&self, session_id: &str) -> Result<Vec<ConversationTurn>, Box<dyn Error>> {
        Ok(self.sessions.get(session_id).cloned().unwrap_or_default())
    }

    fn persist(
        &mut self,
        session_id: &str,
        turns: &[ConversationTurn],
    ) -> Result<(), Box<dyn Error>> {
        self.sessions.insert(session_id.to_string(), turns.to_vec());
        Ok(())
    }
}

/// Primary store with a silent in-memory fallback. Persistence failures are
/// logged and absorbed; none of the trait methods here ever fail.
pub struct FallbackStore {
    primary: Option<Box<dyn SessionStore>>,
    fallback: MemoryStore,
}

impl FallbackStore {
    pub fn new(primary: Option<Box<dyn SessionStore>>) -> Self {
        Self {
            primary,
            fallback: MemoryStore::default(),
        }
    }

    pub fn append_turn(&mut self, session_id: &str, turn: ConversationTurn) {
        if let Some(primary) = self.primary.as_mut() {
            match primary.append_turn(session_id, turn.clone()) {
                Ok(()) => return,
                Err(e) => {
                    warn!(error = %e, "primary session store failed; using in-memory fallback");
                    // Carry over whatever the primary already holds so
                    // earlier turns stay visible for the rest of the run.
                    if let Ok(turns) = primary.load_history(session_id) {
                        let _ = self.fallback.persist(session_id, &turns);
                    }
                    self.primary = None;
                }
            }
        }
        // MemoryStore::append_turn is infallible.
        let _ = self.fallback.append_turn(session_id, turn);
    }

    pub fn load_history(&self, session_id: &str) -> Vec<ConversationTurn> {
        if let Some(primary) = self.primary.as_ref() {
            match primary.load_history(session_id) {
                Ok(turns) => return turns,
                Err(e) => warn!(error = %e, "failed to load session history"),
            }
        }
        self.load_fallback(session_id)
    }

    fn load_fallback(&self, session_id: &str) -> Vec<ConversationTurn> {
        self.fallback.load_history(session_id).unwrap_or_default()
    }
}
