use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use keyring::Entry;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

/// Environment variable consulted by the default `api_key_ref`.
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

// The persona sent as the systemInstruction on every request.
pub const SYSTEM_INSTRUCTION: &str = "You are 'Uni-Assist', a friendly, knowledgeable, and professional chatbot designed to help university students with academic, administrative, and general campus life problems. Provide concise, encouraging, and helpful responses. Do not use markdown headers (# or ##).";

/// How many prior messages accompany each request for conversational
/// grounding.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

const KEYRING_SERVICE: &str = "uniassist_api_key";
const KEYRING_USER: &str = "gemini";

// Everything the session and the Gemini client need to run. Construct a
// custom one for testing; `Default` carries the deployed values.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub api_base_url: String,
    pub model: String,
    // Where the API key comes from: 'env:MY_API_KEY', 'keyring', or None.
    pub api_key_ref: Option<String>,
    pub system_instruction: String,
    pub history_window: usize,
    pub retry: RetryPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_ref: Some(format!("env:{}", DEFAULT_API_KEY_ENV)),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
            retry: RetryPolicy::default(),
        }
    }
}

// --- API Key Retrieval ---

/// Retrieves the API key for the given configuration.
/// It checks the `api_key_ref` field to determine whether to read from
/// environment variables or the OS keyring.
pub fn get_api_key(config: &ChatConfig) -> Result<String> {
    match config.api_key_ref.as_deref() {
        Some(ref_str) if ref_str.starts_with("env:") => {
            let env_var_name = ref_str.trim_start_matches("env:");
            log::debug!("Retrieving API key from environment variable: {}", env_var_name);
            std::env::var(env_var_name).context(format!(
                "Failed to get API key from environment variable '{}'",
                env_var_name
            ))
        }
        Some(ref_str) if ref_str == "keyring" => {
            log::debug!("Retrieving API key from keyring service: {}", KEYRING_SERVICE);
            let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)
                .context("Failed to create keyring entry")?;
            entry.get_password().context(
                "Failed to get API key from keyring. Run `uniassist set-key` to store one.",
            )
        }
        Some(other) => Err(anyhow::anyhow!("Unsupported api_key_ref format: {}", other)),
        None => Err(anyhow::anyhow!("API key reference not set")),
    }
}

/// Stores an API key in the OS keyring so that `api_key_ref = "keyring"`
/// resolves without any environment variable.
pub fn set_api_key_in_keyring(api_key: &str) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)
        .context("Failed to create keyring entry for setting password")?;
    log::info!("Setting API key in keyring service: {}", KEYRING_SERVICE);
    entry
        .set_password(api_key)
        .context("Failed to set API key in keyring")
}
