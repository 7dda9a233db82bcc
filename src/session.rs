//! Chat session workflow
//!
//! Wraps the memory manager around a single chat: seeds the welcome greeting,
//! records user and model turns, prepares each model request and folds the
//! session into cross-session memory when it ends.

use crate::gemini::GenerateContentRequest;
use crate::memory::MemoryManager;
use crate::models::{Attachment, ConversationContext, ConversationSummary, MemoryStore, Message};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Context and request body for one model call
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub context: ConversationContext,
    pub request: GenerateContentRequest,
}

pub struct ChatSession {
    manager: Arc<MemoryManager>,
    messages: Vec<Message>,
    last_digest: Option<ConversationSummary>,
}

impl ChatSession {
    /// Start a fresh chat seeded with the welcome greeting
    pub fn new(manager: Arc<MemoryManager>) -> Self {
        Self::from_messages(manager, vec![Message::welcome()])
    }

    /// Resume a chat from stored messages
    pub fn from_messages(manager: Arc<MemoryManager>, messages: Vec<Message>) -> Self {
        Self {
            manager,
            messages,
            last_digest: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Digest produced by the latest prepared turn, if history overflowed
    pub fn last_digest(&self) -> Option<&ConversationSummary> {
        self.last_digest.as_ref()
    }

    pub fn push_user_message(
        &mut self,
        text: impl Into<String>,
        files: Vec<Attachment>,
    ) -> Message {
        let mut message = Message::user(text).with_files(files);
        message.id = self.next_id();
        self.messages.push(message.clone());
        message
    }

    pub fn record_reply(&mut self, text: impl Into<String>) -> Message {
        let mut message = Message::bot(text);
        message.id = self.next_id();
        self.messages.push(message.clone());
        message
    }

    /// Prepare the model request for the latest user message.
    ///
    /// Returns `None` when the session has no user message yet.
    pub fn prepare_request(&mut self, memory: Option<&MemoryStore>) -> Option<PreparedTurn> {
        let index = self.messages.iter().rposition(|m| m.is_user())?;
        let current = &self.messages[index];

        let context = self
            .manager
            .prepare_conversation_context(&self.messages, current, memory);
        let request = GenerateContentRequest::from_context(&context, current);

        if let Some(digest) = context.summary.as_ref().and_then(|s| s.digest.clone()) {
            self.last_digest = Some(digest);
        }

        info!(
            "Prepared request: {} contents, {} of {} messages in context",
            request.contents.len(),
            context.context_size,
            context.total_messages
        );

        Some(PreparedTurn { context, request })
    }

    /// Fold this session into `memory` and persist the result
    pub async fn finish(&self, memory: Option<MemoryStore>) -> MemoryStore {
        let updated = self
            .manager
            .update_memory_data(memory, &self.messages, self.last_digest.as_ref());
        self.manager.save_memory(&updated).await;
        updated
    }

    /// Millisecond ids, bumped when two messages land in the same millisecond
    fn next_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        match self.messages.last() {
            Some(last) if last.id >= now => last.id + 1,
            _ => now,
        }
    }
}
