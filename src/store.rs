use crate::models::{Message, Role};
use chrono::Utc;

// Trait for anything that wants to know when the conversation changes (e.g.
// the terminal renderer). Notifications run synchronously while the store is
// borrowed, so an observer must not call back into the session that owns it.
pub trait ConversationObserver: Send + Sync {
    fn message_appended(&self, message: &Message);
    fn store_cleared(&self) {}
}

// In-memory conversation history for a single session. Append-only: messages
// are never edited, deleted or reordered. `clear` starts a fresh conversation
// but keeps the id counter running so ids stay unique for the whole session.
pub struct ConversationStore {
    messages: Vec<Message>,
    next_id: u64,
    observers: Vec<Box<dyn ConversationObserver>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 0,
            observers: Vec::new(),
        }
    }

    // Registers an observer. It sees only mutations made after this call.
    pub fn subscribe(&mut self, observer: Box<dyn ConversationObserver>) {
        self.observers.push(observer);
    }

    /// Appends a message, assigning it the next id, and returns a copy of it.
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> Message {
        let message = Message {
            id: self.next_id,
            role,
            text: text.into(),
            timestamp: Utc::now(),
        };
        self.next_id += 1;
        log::debug!("Appending message {} ({})", message.id, message.role.as_str());
        self.messages.push(message.clone());
        for observer in &self.observers {
            observer.message_appended(&message);
        }
        message
    }

    /// Empties the conversation. The id counter is not reset.
    pub fn clear(&mut self) {
        log::debug!("Clearing {} messages from the conversation", self.messages.len());
        self.messages.clear();
        for observer in &self.observers {
            observer.store_cleared();
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
