use crate::config::ChatConfig;
use crate::models::Message;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// --- Gemini wire types ---

// One conversational turn in the shape the generateContent endpoint expects.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Part {
    pub text: String,
}

impl Content {
    pub fn from_message(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            parts: vec![Part {
                text: message.text.clone(),
            }],
        }
    }

    pub fn user_turn(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// Maps the trailing `window` messages of `history` into the wire shape,
/// oldest first. `history` must already exclude the message currently being
/// sent; the caller appends that outgoing turn after this window.
pub fn build_context(history: &[Message], window: usize) -> Vec<Content> {
    let start = history.len().saturating_sub(window);
    history[start..].iter().map(Content::from_message).collect()
}

// Request body for models/{model}:generateContent.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    system_instruction: SystemInstruction,
}

// The persona prompt; unlike a Content entry it carries no role.
#[derive(Serialize, Debug)]
struct SystemInstruction {
    parts: Vec<Part>,
}

// Response envelope. Only the first candidate's first text part is used;
// everything else the API sends is ignored.
#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize, Debug)]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    // candidates[0].content.parts[0].text, with every step along the path
    // allowed to be missing. An empty string counts as missing too.
    fn first_text(&self) -> Option<String> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .clone()
            .filter(|text| !text.is_empty())
    }
}

// --- Provider trait ---

// Trait defining the interface to the completion endpoint. The orchestrator
// only sees this, so tests can drive it with a scripted implementation.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// One generation call. `Ok(Some(text))` is a usable reply,
    /// `Ok(None)` means the call succeeded but carried no extractable text,
    /// and `Err` is a dispatch failure (network error or non-2xx status).
    async fn generate(
        &self,
        contents: &[Content],
        system_instruction: &str,
    ) -> Result<Option<String>>;
}

// --- Gemini implementation ---

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &ChatConfig, api_key: String) -> Result<Self> {
        // Generation calls can take a while; fail fast on connect but allow a
        // long request timeout.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    // The API key travels as a query parameter, so this URL must never be
    // logged.
    fn request_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

#[async_trait]
impl CompletionProvider for GeminiClient {
    async fn generate(
        &self,
        contents: &[Content],
        system_instruction: &str,
    ) -> Result<Option<String>> {
        let request_body = GenerateContentRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
        };

        log::info!(
            "Sending generateContent request to model {} ({} content entries)",
            self.model,
            contents.len()
        );

        let response = self
            .client
            .post(self.request_url())
            .json(&request_body)
            .send()
            .await
            .context("Failed to send request to the Gemini API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            log::error!("Gemini API request failed with status {}: {}", status, error_body);
            return Err(anyhow::anyhow!(
                "API request failed with status {}: {}",
                status,
                error_body
            ));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to decode the Gemini API response")?;

        Ok(parsed.first_text())
    }
}
