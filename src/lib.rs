//! Conversation Memory
//!
//! Decides what a chat model sees on each turn:
//! - Always keeps the most recent window of messages
//! - Adds older messages that score as relevant to the new one
//! - Summarizes history once it grows past a threshold
//! - Recalls summaries from earlier sessions whose topics match
//!
//! FLOW:
//! MESSAGES + NEW TURN + STORED MEMORY → CONTEXT → GEMINI REQUEST

pub mod config;
pub mod error;
pub mod gemini;
pub mod memory;
pub mod models;
pub mod session;

pub use error::Result;

// Re-export common types
pub use config::MemoryConfig;
pub use models::*;
pub use memory::MemoryManager;
pub use session::ChatSession;
