use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TurnSender {
    User,
    Assistant,
}

impl TurnSender {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnSender::User => "user",
            TurnSender::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == TurnSender::User
    }
}

impl TryFrom<&str> for TurnSender {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(TurnSender::User),
            "assistant" => Ok(TurnSender::Assistant),
            _ => Err(format!("invalid turn sender: {value}")),
        }
    }
}

impl TryFrom<String> for TurnSender {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<TurnSender> for String {
    fn from(value: TurnSender) -> Self {
        value.as_str().to_string()
    }
}

/// One entry in a session transcript. Turns are append-only within a
/// session and owned exclusively by the active session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: u64,
    pub content: String,
    pub sender: TurnSender,
    /// Which model produced this turn; `None` for user turns and for
    /// app-authored notices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_model_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(id: u64, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            sender: TurnSender::User,
            origin_model_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(id: u64, content: impl Into<String>, origin_model_id: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            sender: TurnSender::Assistant,
            origin_model_id: Some(origin_model_id.into()),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_round_trips_through_strings() {
        assert_eq!(TurnSender::try_from("user").unwrap(), TurnSender::User);
        assert_eq!(String::from(TurnSender::Assistant), "assistant");
        assert!(TurnSender::try_from("tool").is_err());
    }

    #[test]
    fn constructors_set_origin_model() {
        let user = ConversationTurn::user(1, "hi");
        assert!(user.sender.is_user());
        assert!(user.origin_model_id.is_none());

        let reply = ConversationTurn::assistant(1, "hello", "gemini-2.0-flash");
        assert_eq!(reply.origin_model_id.as_deref(), Some("gemini-2.0-flash"));
    }

    #[test]
    fn turns_serialize_round_trip() {
        let turn = ConversationTurn::assistant(7, "answer", "qwen-3-32b");
        let json = serde_json::to_string(&turn).unwrap();
        let back: ConversationTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 7);
        assert_eq!(back.sender, TurnSender::Assistant);
        assert_eq!(back.origin_model_id.as_deref(), Some("qwen-3-32b"));
    }
}
