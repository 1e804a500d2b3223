// Declare the modules
pub mod api;
pub mod config;
pub mod models;
pub mod retry;
pub mod session;
pub mod store;

pub use api::{build_context, CompletionProvider, Content, GeminiClient, Part};
pub use config::{get_api_key, set_api_key_in_keyring, ChatConfig, DEFAULT_API_KEY_ENV};
pub use models::{Message, Role};
pub use retry::{call_with_backoff, RetryPolicy};
pub use session::{ChatSession, SubmitOutcome, FALLBACK_REPLY, TECHNICAL_ERROR_REPLY};
pub use store::{ConversationObserver, ConversationStore};

use anyhow::Result;
use std::io::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

// Prints assistant replies as they land in the store. The user's own lines
// are already on screen, so only model turns are rendered.
struct TerminalRenderer;

impl ConversationObserver for TerminalRenderer {
    fn message_appended(&self, message: &Message) {
        if message.role == Role::Model {
            println!("Uni-Assist: {}\n", message.text);
        }
    }

    fn store_cleared(&self) {
        println!("(conversation cleared)\n");
    }
}

/// Wires up the session and drives the terminal chat loop.
pub async fn run() -> Result<()> {
    // Initialize logging
    env_logger::init();

    // `uniassist set-key` stores the API key in the OS keyring and exits.
    if std::env::args().nth(1).as_deref() == Some("set-key") {
        return set_key_interactive().await;
    }

    let mut config = ChatConfig::default();
    if std::env::var(DEFAULT_API_KEY_ENV).is_err() {
        // No environment key; fall back to the keyring entry set-key writes.
        config.api_key_ref = Some("keyring".to_string());
    }
    let api_key = get_api_key(&config)?;

    let client = GeminiClient::new(&config, api_key)?;
    let session = ChatSession::new(config, Arc::new(client));
    session.subscribe(Box::new(TerminalRenderer)).await;

    println!("Welcome to Uni-Assist!");
    println!("Ask me anything about your university life—from essay structure to administrative deadlines.");
    println!("Commands: /clear resets the conversation, /quit exits.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break; // stdin closed
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear().await;
                continue;
            }
            input => {
                println!("Uni-Assist is typing...");
                match session.submit(input).await {
                    SubmitOutcome::Replied => {}
                    SubmitOutcome::RejectedEmpty => {}
                    SubmitOutcome::RejectedBusy => {
                        log::warn!("input dropped, the previous turn has not finished");
                    }
                }
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn set_key_interactive() -> Result<()> {
    println!("Paste your Gemini API key and press enter:");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let line = lines.next_line().await?.unwrap_or_default();
    let key = line.trim();
    if key.is_empty() {
        return Err(anyhow::anyhow!("No key provided"));
    }
    set_api_key_in_keyring(key)?;
    println!("API key stored in the system keyring.");
    Ok(())
}
