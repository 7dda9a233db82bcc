use chat_memory::{
    memory::{build_storage, memory_stats},
    ChatSession, MemoryConfig, MemoryManager, Message,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = MemoryConfig::from_env()?;
    info!(
        "Memory config: window={} max_context={} summary_threshold={}",
        config.context_window_size, config.max_context_messages, config.summary_threshold
    );

    let manager = Arc::new(MemoryManager::with_config(config, build_storage()));

    // Replay a stored chat if a JSON message list is given, else a sample one
    let mut session = match std::env::args().nth(1) {
        Some(path) => {
            let raw = tokio::fs::read_to_string(&path).await?;
            let messages: Vec<Message> = serde_json::from_str(&raw)?;
            info!("Loaded {} messages from {}", messages.len(), path);
            ChatSession::from_messages(manager.clone(), messages)
        }
        None => sample_session(manager.clone()),
    };

    let memory = manager.load_memory().await;

    let Some(turn) = session.prepare_request(memory.as_ref()) else {
        eprintln!("No user message found in conversation");
        return Ok(());
    };

    println!("\n=== GEMINI REQUEST ===");
    println!("{}", serde_json::to_string_pretty(&turn.request)?);

    let memory = session.finish(memory).await;
    let stats = memory_stats(Some(&memory));

    println!("\n=== MEMORY ===");
    println!(
        "Context size: {} of {} messages",
        turn.context.context_size, turn.context.total_messages
    );
    println!("Summaries stored: {}", stats.total_summaries);
    println!("Sessions: {}", stats.total_sessions);
    println!("Memory size: {} bytes", stats.memory_size);

    Ok(())
}

fn sample_session(manager: Arc<MemoryManager>) -> ChatSession {
    let mut session = ChatSession::new(manager);

    session.push_user_message("How does ownership work in Rust?", vec![]);
    session.record_reply(
        "Every value has a single owner; when the owner goes out of scope the value is dropped.",
    );
    session.push_user_message("And what about borrowing?", vec![]);
    session.record_reply(
        "References borrow a value without taking ownership, either shared or mutable.",
    );
    session.push_user_message("Can you explain ownership and borrowing with lifetimes?", vec![]);

    session
}
