//! Memory Manager
//!
//! Orchestrates one model turn's context: drops the welcome greeting,
//! summarizes overflowed history, recalls matching summaries from earlier
//! sessions and maps the selected turns into model history entries.
//! Also owns the persisted memory store (update, save, load, clear, stats).

use crate::config::MemoryConfig;
use crate::memory::context_selector::{dedup_by_turn, select_relevant_context};
use crate::memory::store::MemoryStorage;
use crate::memory::summarizer::{create_conversation_summary, find_relevant_summaries};
use crate::models::{
    Attachment, ContextSummary, ConversationContext, ConversationSummary, HistoryEntry,
    MemoryStats, MemoryStore, Message, MessageType, Part,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prepares model context and persists cross-session memory
pub struct MemoryManager {
    config: MemoryConfig,
    storage: Arc<dyn MemoryStorage>,
}

impl MemoryManager {
    pub fn new(storage: Arc<dyn MemoryStorage>) -> Self {
        Self {
            config: MemoryConfig::default(),
            storage,
        }
    }

    pub fn with_config(config: MemoryConfig, storage: Arc<dyn MemoryStorage>) -> Self {
        Self { config, storage }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// The canned greeting is not a conversation turn
    pub fn is_welcome_message(&self, message: &Message) -> bool {
        message.message_type == MessageType::Bot
            && message.content.contains(&self.config.welcome_marker)
    }

    /// Build the context for answering `current` given the session so far
    pub fn prepare_conversation_context(
        &self,
        current_messages: &[Message],
        current: &Message,
        memory: Option<&MemoryStore>,
    ) -> ConversationContext {
        let filtered: Vec<Message> = current_messages
            .iter()
            .filter(|m| !self.is_welcome_message(m))
            .cloned()
            .collect();

        info!(
            "Preparing conversation context: {} messages, current: {:?}",
            filtered.len(),
            preview(&current.content, 50)
        );

        let mut digest = None;
        let mut context_messages: &[Message] = &filtered;

        if filtered.len() > self.config.summary_threshold {
            let split = filtered.len().saturating_sub(self.config.context_window_size);
            let (older, recent) = filtered.split_at(split);

            info!("Creating summary for {} older messages", older.len());
            digest = Some(create_conversation_summary(older, &self.config));
            context_messages = recent;
        }

        let relevant_summaries = memory
            .map(|m| {
                find_relevant_summaries(
                    &m.previous_summaries,
                    &current.content,
                    self.config.max_relevant_summaries,
                )
            })
            .unwrap_or_default();

        if !relevant_summaries.is_empty() {
            info!("Found {} relevant previous summaries", relevant_summaries.len());
        }

        let summary = if digest.is_some() || !relevant_summaries.is_empty() {
            Some(ContextSummary {
                digest,
                relevant_summaries,
            })
        } else {
            None
        };

        let selected = select_relevant_context(context_messages, current, &self.config);
        let context_size = selected.len();
        info!("Selected {} messages for context", context_size);

        let conversation_history: Vec<HistoryEntry> = dedup_by_turn(selected)
            .into_iter()
            .map(to_history_entry)
            .collect();

        debug!(
            "Conversation history prepared: {} entries, summary: {}",
            conversation_history.len(),
            summary.is_some()
        );

        ConversationContext {
            conversation_history,
            summary,
            context_size,
            total_messages: filtered.len(),
        }
    }

    /// Fold a session into the memory store. The caller persists the result.
    pub fn update_memory_data(
        &self,
        current: Option<MemoryStore>,
        messages: &[Message],
        summary: Option<&ConversationSummary>,
    ) -> MemoryStore {
        let mut memory = current.unwrap_or_default();

        if let Some(summary) = summary {
            memory.previous_summaries.push(summary.clone());

            let max = self.config.max_stored_summaries;
            if memory.previous_summaries.len() > max {
                let excess = memory.previous_summaries.len() - max;
                memory.previous_summaries.drain(..excess);
            }
        }

        memory.last_updated = Some(Utc::now());
        memory.total_sessions += 1;

        debug!(
            "Memory updated after session of {} messages: {} summaries, {} sessions",
            messages.len(),
            memory.previous_summaries.len(),
            memory.total_sessions
        );

        memory
    }

    /// Persist the memory store; failures are logged, never returned
    pub async fn save_memory(&self, memory: &MemoryStore) {
        let serialized = match serde_json::to_string(memory) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!("Failed to serialize memory data: {}", e);
                return;
            }
        };

        if let Err(e) = self
            .storage
            .set(&self.config.persistence_key, &serialized)
            .await
        {
            warn!("Failed to save memory data: {}", e);
        }
    }

    /// Load the memory store; absent or unreadable memory yields `None`
    pub async fn load_memory(&self) -> Option<MemoryStore> {
        let raw = match self.storage.get(&self.config.persistence_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to load memory data: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(memory) => Some(memory),
            Err(e) => {
                warn!("Failed to parse stored memory data: {}", e);
                None
            }
        }
    }

    /// Remove persisted memory; failures are logged
    pub async fn clear_memory(&self) {
        if let Err(e) = self.storage.delete(&self.config.persistence_key).await {
            warn!("Failed to clear memory data: {}", e);
        }
    }
}

/// Size and counters of a memory store, zeroed when absent
pub fn memory_stats(memory: Option<&MemoryStore>) -> MemoryStats {
    let Some(memory) = memory else {
        return MemoryStats {
            total_summaries: 0,
            total_sessions: 0,
            last_updated: None,
            memory_size: 0,
        };
    };

    MemoryStats {
        total_summaries: memory.previous_summaries.len(),
        total_sessions: memory.total_sessions,
        last_updated: memory.last_updated,
        memory_size: serde_json::to_string(memory)
            .map(|s| s.len())
            .unwrap_or(0),
    }
}

pub(crate) fn to_history_entry(message: &Message) -> HistoryEntry {
    let mut parts = Vec::with_capacity(1 + message.files.len());
    parts.push(Part::text(message.content.clone()));
    parts.extend(message.files.iter().filter_map(inline_part));

    HistoryEntry {
        role: message.message_type.into(),
        parts,
    }
}

/// Inline payload of a data-URL attachment, if it carries base64 data.
///
/// Gemini only accepts base64 `inlineData`, so other payloads are dropped.
fn inline_part(file: &Attachment) -> Option<Part> {
    let data = file.data_url.as_deref()?.split(',').nth(1)?;

    if !is_base64_payload(data) {
        debug!("Dropping attachment of type {} without base64 data", file.mime_type);
        return None;
    }

    Some(Part::inline(file.mime_type.clone(), data))
}

/// Scan the alphabet without allocating; only the final quantum is decoded,
/// which is where padding can be wrong.
fn is_base64_payload(data: &str) -> bool {
    if data.is_empty() || data.len() % 4 != 0 {
        return false;
    }

    let (body, tail) = data.split_at(data.len() - 4);
    body.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
        && STANDARD.decode(tail).is_ok()
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut preview: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryError;
    use crate::memory::store::InMemoryStorage;
    use crate::models::{HistoryRole, WELCOME_MESSAGE};
    use chrono::{DateTime, Duration, TimeZone};

    struct FailingStorage;

    #[async_trait::async_trait]
    impl MemoryStorage for FailingStorage {
        async fn get(&self, _key: &str) -> crate::Result<Option<String>> {
            Err(MemoryError::Storage("unavailable".to_string()))
        }

        async fn set(&self, _key: &str, _value: &str) -> crate::Result<()> {
            Err(MemoryError::Storage("unavailable".to_string()))
        }

        async fn delete(&self, _key: &str) -> crate::Result<()> {
            Err(MemoryError::Storage("unavailable".to_string()))
        }
    }

    fn manager() -> MemoryManager {
        MemoryManager::new(Arc::new(InMemoryStorage::new()))
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn message_at(index: i64, message_type: MessageType, content: &str) -> Message {
        Message {
            id: index,
            message_type,
            content: content.to_string(),
            timestamp: Some(base_time() + Duration::seconds(index)),
            files: Vec::new(),
        }
    }

    fn history(len: i64) -> Vec<Message> {
        (0..len)
            .map(|i| {
                if i % 2 == 0 {
                    message_at(i, MessageType::User, &format!("question about topic{} please", i))
                } else {
                    message_at(i, MessageType::Bot, &format!("answer number {}", i))
                }
            })
            .collect()
    }

    fn stored_summary(topics: &[&str]) -> ConversationSummary {
        ConversationSummary {
            total_messages: 12,
            user_messages: 6,
            bot_messages: 6,
            topics: topics.iter().map(|t| t.to_string()).collect(),
            recent_context: Vec::new(),
            created_at: base_time(),
            last_message_time: Some(base_time()),
        }
    }

    #[test]
    fn test_short_history_has_no_summary() {
        let manager = manager();
        let messages = history(6);
        let current = message_at(100, MessageType::User, "next");

        let context = manager.prepare_conversation_context(&messages, &current, None);
        assert!(context.summary.is_none());
        assert_eq!(context.total_messages, 6);
        assert_eq!(context.context_size, 6);
        assert_eq!(context.conversation_history.len(), 6);
        assert_eq!(context.conversation_history[0].role, HistoryRole::User);
        assert_eq!(context.conversation_history[1].role, HistoryRole::Model);
    }

    #[test]
    fn test_long_history_is_summarized() {
        let manager = manager();
        let messages = history(35);
        let current = message_at(100, MessageType::User, "something new entirely");

        let context = manager.prepare_conversation_context(&messages, &current, None);
        let summary = context.summary.expect("summary for long history");
        let digest = summary.digest.expect("fresh digest");

        assert_eq!(digest.total_messages, 25);
        assert_eq!(digest.user_messages, 13);
        assert_eq!(digest.bot_messages, 12);
        assert!(digest.topics.len() <= 10);
        assert_eq!(digest.recent_context.len(), 5);
        assert_eq!(digest.last_message_time, messages[24].timestamp);
        assert!(summary.relevant_summaries.is_empty());

        assert_eq!(context.total_messages, 35);
        assert_eq!(context.context_size, 10);
        assert!(context.conversation_history.len() <= 20);
        assert_eq!(
            context.conversation_history[0].parts[0].text.as_deref(),
            Some(messages[25].content.as_str())
        );
    }

    #[test]
    fn test_welcome_message_excluded() {
        let manager = manager();
        let mut messages = vec![Message {
            timestamp: Some(base_time() - Duration::seconds(10)),
            ..Message::bot(WELCOME_MESSAGE)
        }];
        messages.extend(history(4));
        let current = message_at(100, MessageType::User, "hello");

        let context = manager.prepare_conversation_context(&messages, &current, None);
        assert_eq!(context.total_messages, 4);
        assert!(context
            .conversation_history
            .iter()
            .flat_map(|entry| entry.parts.iter())
            .all(|part| part.text.as_deref() != Some(WELCOME_MESSAGE)));

        // Only the bot greeting is filtered; a user quoting it still counts
        let quoted = vec![message_at(1, MessageType::User, WELCOME_MESSAGE)];
        let context = manager.prepare_conversation_context(&quoted, &current, None);
        assert_eq!(context.total_messages, 1);
    }

    #[test]
    fn test_relevant_summaries_attached_without_digest() {
        let manager = manager();
        let memory = MemoryStore {
            previous_summaries: vec![
                stored_summary(&["tokio", "runtime"]),
                stored_summary(&["sourdough"]),
                stored_summary(&["Tokio"]),
                stored_summary(&["runtime"]),
                stored_summary(&["tokio"]),
            ],
            last_updated: Some(base_time()),
            total_sessions: 5,
        };
        let current = message_at(100, MessageType::User, "How is the TOKIO runtime built?");

        let context = manager.prepare_conversation_context(&history(4), &current, Some(&memory));
        let summary = context.summary.expect("relevant summaries");
        assert!(summary.digest.is_none());
        assert_eq!(summary.relevant_summaries.len(), 3);
        assert_eq!(summary.relevant_summaries[0].topics, vec!["tokio", "runtime"]);
        assert_eq!(summary.relevant_summaries[1].topics, vec!["Tokio"]);
        assert_eq!(summary.relevant_summaries[2].topics, vec!["runtime"]);
    }

    #[test]
    fn test_relevant_summaries_merge_with_digest() {
        let manager = manager();
        let memory = MemoryStore {
            previous_summaries: vec![stored_summary(&["lifetimes"])],
            ..MemoryStore::default()
        };
        let current = message_at(100, MessageType::User, "back to lifetimes again");

        let context = manager.prepare_conversation_context(&history(40), &current, Some(&memory));
        let summary = context.summary.unwrap();
        assert!(summary.digest.is_some());
        assert_eq!(summary.relevant_summaries.len(), 1);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totalMessages"], 30);
        assert_eq!(json["relevantSummaries"][0]["topics"][0], "lifetimes");
    }

    #[test]
    fn test_no_matching_memory_leaves_summary_empty() {
        let manager = manager();
        let memory = MemoryStore {
            previous_summaries: vec![stored_summary(&["sourdough"])],
            ..MemoryStore::default()
        };
        let current = message_at(100, MessageType::User, "rust traits");

        let context = manager.prepare_conversation_context(&history(4), &current, Some(&memory));
        assert!(context.summary.is_none());
    }

    #[test]
    fn test_files_become_inline_parts() {
        let manager = manager();
        let mut with_file = message_at(1, MessageType::User, "what is in this image?");
        with_file.files = vec![
            Attachment::new("image/png", "data:image/png;base64,AAAA"),
            Attachment::new("image/png", "data:image/png;base64,"),
            Attachment::new("text/plain", "no-comma-here"),
            Attachment::new("image/jpeg", "data:image/jpeg;base64,@@not base64@@"),
            Attachment {
                mime_type: "image/gif".to_string(),
                data_url: None,
            },
        ];
        let current = message_at(2, MessageType::User, "well?");

        let context = manager.prepare_conversation_context(&[with_file], &current, None);
        assert_eq!(
            context.conversation_history[0].parts,
            vec![
                Part::text("what is in this image?"),
                Part::inline("image/png", "AAAA"),
            ]
        );
    }

    #[test]
    fn test_base64_payload_check() {
        assert!(is_base64_payload("AAAA"));
        assert!(is_base64_payload("aGVsbG8gd29ybGQ="));
        assert!(is_base64_payload("aGk="));
        assert!(is_base64_payload(&"QUJD".repeat(4096)));

        assert!(!is_base64_payload(""));
        assert!(!is_base64_payload("AAA"));
        assert!(!is_base64_payload("AA=AAAAA"));
        assert!(!is_base64_payload("AAAA===="));
        assert!(!is_base64_payload("@@not base64@@"));
        assert!(!is_base64_payload("AAAA AAA"));
    }

    #[test]
    fn test_duplicate_turns_collapsed() {
        let manager = manager();
        let first = message_at(1, MessageType::User, "same words");
        let mut repeat = first.clone();
        repeat.id = 2;
        let current = message_at(3, MessageType::User, "next");

        let context = manager.prepare_conversation_context(&[first, repeat], &current, None);
        assert_eq!(context.context_size, 2);
        assert_eq!(context.conversation_history.len(), 1);
    }

    #[test]
    fn test_update_memory_data_initializes() {
        let manager = manager();
        let before = Utc::now();

        let memory = manager.update_memory_data(None, &[], None);
        assert!(memory.previous_summaries.is_empty());
        assert_eq!(memory.total_sessions, 1);
        assert!(memory.last_updated.unwrap() >= before);
    }

    #[test]
    fn test_update_memory_data_keeps_latest_ten() {
        let manager = manager();
        let mut memory = None;

        for i in 0..12 {
            let topic = format!("topic{}", i);
            let summary = stored_summary(&[topic.as_str()]);
            memory = Some(manager.update_memory_data(memory, &[], Some(&summary)));
        }

        let memory = memory.unwrap();
        assert_eq!(memory.total_sessions, 12);
        assert_eq!(memory.previous_summaries.len(), 10);
        assert_eq!(memory.previous_summaries[0].topics, vec!["topic2"]);
        assert_eq!(memory.previous_summaries[9].topics, vec!["topic11"]);
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let manager = manager();
        assert!(manager.load_memory().await.is_none());

        let memory = manager.update_memory_data(None, &[], Some(&stored_summary(&["serde"])));
        manager.save_memory(&memory).await;

        let loaded = manager.load_memory().await.expect("stored memory");
        assert_eq!(loaded, memory);

        manager.clear_memory().await;
        assert!(manager.load_memory().await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_blob_loads_as_none() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.set("nivi_chat_memory", "{not json").await.unwrap();

        let manager = MemoryManager::new(storage);
        assert!(manager.load_memory().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_summary_skipped_on_load() {
        let storage = Arc::new(InMemoryStorage::new());
        let blob = r#"{
            "previousSummaries": [
                {
                    "totalMessages": 12,
                    "userMessages": 6,
                    "botMessages": 6,
                    "topics": ["lifetimes"],
                    "recentContext": [],
                    "createdAt": "2024-05-31T12:00:00.000Z",
                    "lastMessageTime": null
                },
                {"relevantSummaries": []}
            ],
            "lastUpdated": "2024-05-31T12:05:00.000Z",
            "totalSessions": 3
        }"#;
        storage.set("nivi_chat_memory", blob).await.unwrap();

        let manager = MemoryManager::new(storage);
        let loaded = manager.load_memory().await.expect("store survives one bad summary");
        assert_eq!(loaded.total_sessions, 3);
        assert_eq!(loaded.previous_summaries.len(), 1);
        assert_eq!(loaded.previous_summaries[0].topics, vec!["lifetimes"]);
    }

    #[tokio::test]
    async fn test_failing_storage_degrades_silently() {
        let manager = MemoryManager::new(Arc::new(FailingStorage));
        let memory = manager.update_memory_data(None, &[], None);

        manager.save_memory(&memory).await;
        assert!(manager.load_memory().await.is_none());
        manager.clear_memory().await;
    }

    #[tokio::test]
    async fn test_custom_persistence_key() {
        let storage = Arc::new(InMemoryStorage::new());
        let config = MemoryConfig {
            persistence_key: "custom_key".to_string(),
            ..MemoryConfig::default()
        };
        let manager = MemoryManager::with_config(config, storage.clone());

        manager.save_memory(&MemoryStore::default()).await;
        assert!(storage.get("custom_key").await.unwrap().is_some());
        assert!(storage.get("nivi_chat_memory").await.unwrap().is_none());
    }

    #[test]
    fn test_memory_stats() {
        let empty = memory_stats(None);
        assert_eq!(empty.total_summaries, 0);
        assert_eq!(empty.total_sessions, 0);
        assert!(empty.last_updated.is_none());
        assert_eq!(empty.memory_size, 0);

        let manager = manager();
        let memory = manager.update_memory_data(None, &[], Some(&stored_summary(&["axum"])));
        let stats = memory_stats(Some(&memory));
        assert_eq!(stats.total_summaries, 1);
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.last_updated, memory.last_updated);
        assert_eq!(stats.memory_size, serde_json::to_string(&memory).unwrap().len());
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 50), "short");
        assert_eq!(preview(&"a".repeat(60), 50), format!("{}...", "a".repeat(50)));
    }
}
