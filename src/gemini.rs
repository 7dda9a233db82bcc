//! Gemini request composition
//!
//! Turns a prepared conversation context into a `generateContent` request
//! body. Transport is left to the caller.

use crate::memory::manager::to_history_entry;
use crate::memory::summarizer::format_summary_for_prompt;
use crate::models::{ContextSummary, ConversationContext, HistoryEntry, Message, Part};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub max_output_tokens: i32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }
}

impl GenerateContentRequest {
    /// Compose a request answering `current` with the given context
    pub fn from_context(context: &ConversationContext, current: &Message) -> Self {
        let mut contents = context.conversation_history.clone();

        let current_entry = to_history_entry(current);
        if contents.last() != Some(&current_entry) {
            contents.push(current_entry);
        }

        Self {
            contents,
            system_instruction: context
                .summary
                .as_ref()
                .and_then(build_system_instruction),
            generation_config: GenerationConfig::default(),
        }
    }

    pub fn with_generation_config(mut self, generation_config: GenerationConfig) -> Self {
        self.generation_config = generation_config;
        self
    }
}

/// Summary digest as a system instruction, if it has anything to say
fn build_system_instruction(summary: &ContextSummary) -> Option<SystemInstruction> {
    let text = format_summary_for_prompt(summary);
    if text.trim().is_empty() {
        return None;
    }

    Some(SystemInstruction {
        parts: vec![Part::text(format!(
            "Use this memory of the conversation when it helps answer the user.\n\n{}",
            text
        ))],
    })
}
