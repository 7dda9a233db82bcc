//! Context Window Selection
//!
//! Picks which prior turns accompany a new message: the recent window is
//! always kept, older turns join only when they score as relevant.

use crate::config::MemoryConfig;
use crate::memory::relevance::message_relevance;
use crate::models::Message;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::hash::Hash;
use tracing::debug;

/// An older message with its relevance to the current turn
#[derive(Debug, Clone, Copy)]
pub struct ScoredMessage<'a> {
    pub message: &'a Message,
    pub relevance: f64,
}

/// Select context for `current` from `messages`, in chronological order.
///
/// Never returns more than `max_context_messages`; when the history is
/// longer than the window, the last `context_window_size` messages are
/// always part of the result.
pub fn select_relevant_context<'a>(
    messages: &'a [Message],
    current: &Message,
    config: &MemoryConfig,
) -> Vec<&'a Message> {
    let window = config.context_window_size;

    if messages.len() <= window {
        return messages.iter().collect();
    }

    let (older, recent) = messages.split_at(messages.len() - window);

    let relevant = rank_older_messages(older, current, config);
    debug!(
        "{} of {} older messages pass relevance threshold {}",
        relevant.len(),
        older.len(),
        config.relevance_threshold
    );

    let mut selected: Vec<&Message> = relevant
        .into_iter()
        .map(|scored| scored.message)
        .chain(recent.iter())
        .collect();

    selected = dedup_by_identity(selected);
    selected.sort_by_key(|m| timestamp_key(m));
    selected
}

/// Score older messages, keep those above threshold, best first
pub fn rank_older_messages<'a>(
    older: &'a [Message],
    current: &Message,
    config: &MemoryConfig,
) -> Vec<ScoredMessage<'a>> {
    let mut scored: Vec<ScoredMessage<'a>> = older
        .iter()
        .map(|message| ScoredMessage {
            message,
            relevance: message_relevance(message, current),
        })
        .filter(|scored| scored.relevance >= config.relevance_threshold)
        .collect();

    scored.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    scored.truncate(config.relevant_slots());
    scored
}

/// Drop repeats of (id, timestamp, content), keeping the first occurrence
pub fn dedup_by_identity(messages: Vec<&Message>) -> Vec<&Message> {
    dedup_by_key(messages, |m| (m.id, m.timestamp, m.content.as_str()))
}

/// Drop repeats of (content, timestamp, type), keeping the first occurrence
pub fn dedup_by_turn(messages: Vec<&Message>) -> Vec<&Message> {
    dedup_by_key(messages, |m| (m.content.as_str(), m.timestamp, m.message_type))
}

fn dedup_by_key<'a, K, F>(messages: Vec<&'a Message>, key: F) -> Vec<&'a Message>
where
    K: Eq + Hash,
    F: Fn(&'a Message) -> K,
{
    let mut seen = HashSet::with_capacity(messages.len());
    messages
        .into_iter()
        .filter(|m| seen.insert(key(*m)))
        .collect()
}

/// Undated messages sort before dated ones; ties keep their order
fn timestamp_key(message: &Message) -> Option<DateTime<Utc>> {
    message.timestamp
}
