//! Conversation Summarization
//!
//! Condenses overflowed history into a digest of topic keywords and trimmed
//! recent snippets, and recalls stored digests whose topics match a new turn.

use crate::config::MemoryConfig;
use crate::memory::keywords::extract_keywords;
use crate::models::{ContextSnippet, ContextSummary, ConversationSummary, Message, MessageType};
use chrono::Utc;
use std::collections::HashSet;
use std::fmt::Write;

/// Build a digest of `messages`
pub fn create_conversation_summary(
    messages: &[Message],
    config: &MemoryConfig,
) -> ConversationSummary {
    let recent_start = messages.len().saturating_sub(config.recent_context_size);
    let recent_context = messages[recent_start..]
        .iter()
        .map(|msg| ContextSnippet {
            message_type: msg.message_type,
            content: truncate_chars(&msg.content, config.snippet_length),
            timestamp: msg.timestamp,
        })
        .collect();

    ConversationSummary {
        total_messages: messages.len(),
        user_messages: count_by_type(messages, MessageType::User),
        bot_messages: count_by_type(messages, MessageType::Bot),
        topics: collect_topics(messages, config),
        recent_context,
        created_at: Utc::now(),
        last_message_time: messages.last().and_then(|msg| msg.timestamp),
    }
}

/// Distinct user-message keywords in first-seen order
fn collect_topics(messages: &[Message], config: &MemoryConfig) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut topics = Vec::with_capacity(config.max_topics);

    let keywords = messages
        .iter()
        .filter(|msg| msg.is_user())
        .flat_map(|msg| extract_keywords(&msg.content));

    for keyword in keywords {
        if topics.len() >= config.max_topics {
            break;
        }
        if keyword.len() >= config.min_topic_length && seen.insert(keyword.clone()) {
            topics.push(keyword);
        }
    }

    topics
}

/// Stored summaries with any topic contained in `content` (case-insensitive)
pub fn find_relevant_summaries(
    previous: &[ConversationSummary],
    content: &str,
    limit: usize,
) -> Vec<ConversationSummary> {
    let content = content.to_lowercase();

    previous
        .iter()
        .filter(|summary| {
            summary
                .topics
                .iter()
                .any(|topic| content.contains(&topic.to_lowercase()))
        })
        .take(limit)
        .cloned()
        .collect()
}

pub fn count_by_type(messages: &[Message], message_type: MessageType) -> usize {
    messages
        .iter()
        .filter(|msg| msg.message_type == message_type)
        .count()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Render a context summary as prompt text for the model
pub fn format_summary_for_prompt(summary: &ContextSummary) -> String {
    let mut text = String::new();

    if let Some(digest) = &summary.digest {
        let _ = writeln!(
            text,
            "Earlier in this conversation ({} messages: {} from the user, {} from you):",
            digest.total_messages, digest.user_messages, digest.bot_messages
        );
        if !digest.topics.is_empty() {
            let _ = writeln!(text, "Topics: {}", digest.topics.join(", "));
        }
        for snippet in &digest.recent_context {
            let speaker = match snippet.message_type {
                MessageType::User => "User",
                MessageType::Bot => "Assistant",
            };
            let _ = writeln!(text, "- {}: {}", speaker, snippet.content);
        }
    }

    if !summary.relevant_summaries.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str("Related topics from previous sessions:\n");
        for previous in &summary.relevant_summaries {
            let when = previous
                .last_message_time
                .unwrap_or(previous.created_at)
                .format("%Y-%m-%d");
            let _ = writeln!(text, "- {}: {}", when, previous.topics.join(", "));
        }
    }

    text
}
