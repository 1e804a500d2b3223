use crate::api::{build_context, CompletionProvider, Content};
use crate::config::ChatConfig;
use crate::models::{Message, Role};
use crate::retry::call_with_backoff;
use crate::store::{ConversationObserver, ConversationStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Shown as the assistant turn when the API answers 2xx but the response
/// carries no usable text.
pub const FALLBACK_REPLY: &str =
    "I seem to be having trouble understanding that right now. Please try again.";

/// Shown as the assistant turn when every dispatch attempt failed.
pub const TECHNICAL_ERROR_REPLY: &str =
    "Sorry, I encountered a technical error while connecting to the AI.";

/// What `submit` did with the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A full turn ran: the user message and an assistant reply (possibly a
    /// fallback) were both appended.
    Replied,
    /// The input was empty or whitespace; nothing happened.
    RejectedEmpty,
    /// A previous turn is still in flight; nothing happened.
    RejectedBusy,
}

// Drives one chat turn at a time: append the user message, build the
// context window, dispatch with retries, append the reply. Clone is cheap,
// all the fields are shared handles.
#[derive(Clone)]
pub struct ChatSession {
    store: Arc<Mutex<ConversationStore>>,
    provider: Arc<dyn CompletionProvider>,
    config: ChatConfig,
    loading: Arc<AtomicBool>,
    id: Uuid,
}

impl ChatSession {
    pub fn new(config: ChatConfig, provider: Arc<dyn CompletionProvider>) -> Self {
        let id = Uuid::new_v4();
        log::info!("[session {}] started with model {}", id, config.model);
        Self {
            store: Arc::new(Mutex::new(ConversationStore::new())),
            provider,
            config,
            loading: Arc::new(AtomicBool::new(false)),
            id,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether a turn is currently in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn subscribe(&self, observer: Box<dyn ConversationObserver>) {
        self.store.lock().await.subscribe(observer);
    }

    /// A snapshot of the conversation so far.
    pub async fn messages(&self) -> Vec<Message> {
        self.store.lock().await.messages().to_vec()
    }

    /// Runs one full chat turn for `input`.
    ///
    /// Empty input and concurrent submissions are rejected without touching
    /// the conversation. Otherwise the user message is appended immediately,
    /// the request is dispatched with retries, and an assistant message is
    /// appended no matter how the dispatch went: the reply text, a fallback
    /// for contentless responses, or a fixed error notice after the retry
    /// budget is spent.
    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        let text = input.trim();
        if text.is_empty() {
            return SubmitOutcome::RejectedEmpty;
        }

        // Single-flight gate: swap returns the previous value, so `true`
        // means another turn got here first.
        if self.loading.swap(true, Ordering::SeqCst) {
            log::warn!("[session {}] submit rejected, a turn is already in flight", self.id);
            return SubmitOutcome::RejectedBusy;
        }
        let _idle_again = LoadingReset(self.loading.clone());

        // Append the user message and build the request context under one
        // lock so no interleaved mutation can slip between the two.
        let contents = {
            let mut store = self.store.lock().await;
            let message = store.append(Role::User, text);
            let messages = store.messages();
            // The context window covers the history *before* this message.
            let prior = &messages[..messages.len() - 1];
            let mut contents = build_context(prior, self.config.history_window);
            contents.push(Content::user_turn(text));
            log::info!(
                "[session {}] user message {} submitted ({} context entries)",
                self.id,
                message.id,
                contents.len() - 1
            );
            contents
        };

        let reply = match call_with_backoff(&self.config.retry, "Gemini generateContent", || {
            self.provider.generate(&contents, &self.config.system_instruction)
        })
        .await
        {
            Ok(Some(text)) => text,
            Ok(None) => {
                log::warn!(
                    "[session {}] response carried no text, substituting fallback",
                    self.id
                );
                FALLBACK_REPLY.to_string()
            }
            Err(error) => {
                log::error!("[session {}] all dispatch attempts failed: {:?}", self.id, error);
                TECHNICAL_ERROR_REPLY.to_string()
            }
        };

        let mut store = self.store.lock().await;
        let message = store.append(Role::Model, reply);
        log::info!("[session {}] assistant message {} appended", self.id, message.id);
        SubmitOutcome::Replied
    }

    /// Clears the conversation. Rejected while a turn is in flight, since
    /// the pending reply would otherwise land in an emptied conversation.
    pub async fn clear(&self) -> bool {
        if self.is_loading() {
            log::warn!("[session {}] clear rejected, a turn is in flight", self.id);
            return false;
        }
        self.store.lock().await.clear();
        log::info!("[session {}] conversation cleared", self.id);
        true
    }
}

// Clears the loading flag when dropped, the "finally" of a turn.
struct LoadingReset(Arc<AtomicBool>);

impl Drop for LoadingReset {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
