//! Assistant v2 API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response type tag marking a plain-text output item.
pub const TEXT_RESPONSE_TYPE: &str = "text";

/// Body of a message request.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub input: MessageInput,
}

/// User input carried by a message request.
#[derive(Debug, Clone, Serialize)]
pub struct MessageInput {
    pub message_type: &'static str,
    pub text: String,
}

impl MessageRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            input: MessageInput {
                message_type: "text",
                text: text.into(),
            },
        }
    }
}

/// Response to a session-creation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionResponse {
    /// May be missing or empty on a malformed response.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Response to a message request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub output: MessageOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Assistant output for one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageOutput {
    #[serde(default)]
    pub generic: Vec<RuntimeResponseGeneric>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intents: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Value>,
}

/// One tagged output item (text, image, option, pause, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeResponseGeneric {
    pub response_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Fields of the non-text response types, kept for logging.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl RuntimeResponseGeneric {
    pub fn is_text(&self) -> bool {
        self.response_type == TEXT_RESPONSE_TYPE
    }
}

impl MessageResponse {
    /// Plain-text replies in output order; non-text items are skipped.
    pub fn text_replies(&self) -> Vec<String> {
        self.output
            .generic
            .iter()
            .filter(|item| item.is_text())
            .filter_map(|item| item.text.clone())
            .collect()
    }
}

/// Error body returned by the assistant API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(default)]
    pub code: Option<u16>,
}
