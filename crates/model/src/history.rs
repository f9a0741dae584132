use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side of the conversation.
    User,
    /// The assistant backend.
    Assistant,
}

/// Summary of a thread as reported by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ThreadSummary {
    /// The server-assigned identifier.
    pub thread_id: String,
    /// Number of messages persisted in this thread.
    pub message_count: u64,
    /// Time of the most recent message, if the backend reports it.
    pub last_message_time: Option<NaiveDateTime>,
}

/// A persisted message of a thread.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HistoryMessage {
    /// Who wrote the message.
    pub role: Role,
    /// The message text.
    pub text: String,
    /// When the backend stored the message, if it could be read.
    pub timestamp: Option<NaiveDateTime>,
}
