//! Core data models for conversation memory
//!
//! JSON field names follow the chat client's camelCase shape so message lists
//! and memory blobs written by the browser load unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Text of the canned greeting every new chat starts with
pub const WELCOME_MESSAGE: &str = "Hello! I'm your AI assistant. How can I help you today?";

//
// ================= Messages =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Bot,
}

/// A file attached to a message, carried as a data URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data_url: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data_url: Some(data_url.into()),
        }
    }
}

/// A single chat turn.
///
/// UI-only decorations (reactions, likes) present in stored JSON are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Attachment>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(message_type: MessageType, content: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            id: now.timestamp_millis(),
            message_type,
            content: content.into(),
            timestamp: Some(now),
            files: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageType::User, content)
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(MessageType::Bot, content)
    }

    /// The greeting a fresh chat is seeded with
    pub fn welcome() -> Self {
        Self::bot(WELCOME_MESSAGE)
    }

    pub fn with_files(mut self, files: Vec<Attachment>) -> Self {
        self.files = files;
        self
    }

    pub fn is_user(&self) -> bool {
        self.message_type == MessageType::User
    }
}

//
// ================= Summaries =================
//

/// Trimmed copy of a message kept inside a summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnippet {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Digest of older conversation turns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub total_messages: usize,
    pub user_messages: usize,
    pub bot_messages: usize,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub recent_context: Vec<ContextSnippet>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
}

/// Summaries carried across sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStore {
    #[serde(default, deserialize_with = "deserialize_summaries")]
    pub previous_summaries: Vec<ConversationSummary>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_sessions: u64,
}

/// Skip stored summaries that no longer parse instead of losing the whole store
fn deserialize_summaries<'de, D>(deserializer: D) -> Result<Vec<ConversationSummary>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;

    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Skipping malformed stored summary: {}", e);
                None
            }
        })
        .collect())
}

//
// ================= Model Context =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Model,
}

impl From<MessageType> for HistoryRole {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::User => HistoryRole::User,
            MessageType::Bot => HistoryRole::Model,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// One part of a model turn: either text or an inline payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub parts: Vec<Part>,
}

/// Summary attached to a context: the fresh digest (if history overflowed)
/// plus any relevant summaries recalled from earlier sessions.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    #[serde(flatten)]
    pub digest: Option<ConversationSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relevant_summaries: Vec<ConversationSummary>,
}

/// Everything the request composer needs for one model call
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub conversation_history: Vec<HistoryEntry>,
    pub summary: Option<ContextSummary>,
    pub context_size: usize,
    pub total_messages: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_summaries: usize,
    pub total_sessions: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub memory_size: usize,
}
