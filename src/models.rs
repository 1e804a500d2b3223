use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Who authored a message. Serializes straight to the Gemini wire vocabulary,
// which calls the assistant side "model".
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

// Represents a single message in the conversation. Immutable once created;
// the id is assigned by the ConversationStore at append time and only ever
// increases within a session.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub id: u64,
    pub role: Role,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}
