//! Conversation Memory System
//!
//! Keyword extraction, relevance scoring, context selection and
//! summarization, plus the persisted cross-session memory store.

pub mod keywords;
pub mod relevance;
pub mod context_selector;
pub mod summarizer;
pub mod manager;
pub mod store;

pub use keywords::extract_keywords;
pub use relevance::{calculate_relevance, content_relevance};
pub use context_selector::select_relevant_context;
pub use summarizer::create_conversation_summary;
pub use manager::{memory_stats, MemoryManager};
pub use store::{build_storage, FileStorage, InMemoryStorage, MemoryStorage, PostgresStorage};
