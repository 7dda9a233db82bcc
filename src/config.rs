//! Memory configuration
//!
//! Thresholds and limits that drive context selection, summarization and
//! persistence. Passed explicitly into the memory manager so tests can
//! override any of them.

use crate::error::MemoryError;
use crate::Result;
use std::env;
use std::str::FromStr;
use tracing::warn;

/// Configuration for conversation memory management
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum messages included in a model request
    pub max_context_messages: usize,
    /// Ceiling for `summary_threshold`
    pub max_summary_messages: usize,
    /// History length above which older turns are summarized
    pub summary_threshold: usize,
    /// Recent messages always included verbatim
    pub context_window_size: usize,
    /// Minimum relevance score for an older message to be included
    pub relevance_threshold: f64,
    /// Declared ceiling on total memory entries (validated, not enforced)
    pub max_memory_size: usize,
    /// Storage key the memory store is persisted under
    pub persistence_key: String,
    /// Substring identifying the canned welcome greeting
    pub welcome_marker: String,
    /// Previous summaries attached to a single context
    pub max_relevant_summaries: usize,
    /// Summaries retained in the memory store
    pub max_stored_summaries: usize,
    /// Topics kept per summary
    pub max_topics: usize,
    /// Minimum keyword length for a topic
    pub min_topic_length: usize,
    /// Trailing messages captured as summary snippets
    pub recent_context_size: usize,
    /// Characters kept per snippet
    pub snippet_length: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_context_messages: 20,
            max_summary_messages: 50,
            summary_threshold: 30,
            context_window_size: 10,
            relevance_threshold: 0.3,
            max_memory_size: 1000,
            persistence_key: "nivi_chat_memory".to_string(),
            welcome_marker: "Hello! I'm your AI assistant".to_string(),
            max_relevant_summaries: 3,
            max_stored_summaries: 10,
            max_topics: 10,
            min_topic_length: 4,
            recent_context_size: 5,
            snippet_length: 100,
        }
    }
}

impl MemoryConfig {
    /// Build a config from `CHAT_MEMORY_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            max_context_messages: env_or(
                "CHAT_MEMORY_MAX_CONTEXT_MESSAGES",
                defaults.max_context_messages,
            ),
            max_summary_messages: env_or(
                "CHAT_MEMORY_MAX_SUMMARY_MESSAGES",
                defaults.max_summary_messages,
            ),
            summary_threshold: env_or("CHAT_MEMORY_SUMMARY_THRESHOLD", defaults.summary_threshold),
            context_window_size: env_or(
                "CHAT_MEMORY_CONTEXT_WINDOW_SIZE",
                defaults.context_window_size,
            ),
            relevance_threshold: env_or(
                "CHAT_MEMORY_RELEVANCE_THRESHOLD",
                defaults.relevance_threshold,
            ),
            max_memory_size: env_or("CHAT_MEMORY_MAX_MEMORY_SIZE", defaults.max_memory_size),
            persistence_key: env::var("CHAT_MEMORY_PERSISTENCE_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())
                .unwrap_or(defaults.persistence_key),
            welcome_marker: defaults.welcome_marker,
            max_relevant_summaries: env_or(
                "CHAT_MEMORY_MAX_RELEVANT_SUMMARIES",
                defaults.max_relevant_summaries,
            ),
            max_stored_summaries: env_or(
                "CHAT_MEMORY_MAX_STORED_SUMMARIES",
                defaults.max_stored_summaries,
            ),
            max_topics: defaults.max_topics,
            min_topic_length: defaults.min_topic_length,
            recent_context_size: defaults.recent_context_size,
            snippet_length: defaults.snippet_length,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the limits are consistent with each other
    pub fn validate(&self) -> Result<()> {
        if self.context_window_size == 0 {
            return Err(MemoryError::Config(
                "context_window_size must be at least 1".to_string(),
            ));
        }

        if self.context_window_size > self.max_context_messages {
            return Err(MemoryError::Config(format!(
                "context_window_size ({}) exceeds max_context_messages ({})",
                self.context_window_size, self.max_context_messages
            )));
        }

        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(MemoryError::Config(format!(
                "relevance_threshold must be within [0, 1], got {}",
                self.relevance_threshold
            )));
        }

        if self.summary_threshold > self.max_summary_messages {
            return Err(MemoryError::Config(format!(
                "summary_threshold ({}) exceeds max_summary_messages ({})",
                self.summary_threshold, self.max_summary_messages
            )));
        }

        if self.max_stored_summaries > self.max_memory_size {
            return Err(MemoryError::Config(format!(
                "max_stored_summaries ({}) exceeds max_memory_size ({})",
                self.max_stored_summaries, self.max_memory_size
            )));
        }

        Ok(())
    }

    /// Older messages that may join the recent window
    pub fn relevant_slots(&self) -> usize {
        self.max_context_messages
            .saturating_sub(self.context_window_size)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparsable {}={:?}, using default", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}
