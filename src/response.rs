use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::ChatMessage;

/// The accumulated result of one flow invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

impl FlowResponse {
    pub fn new() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Sets `metadata.error` and flips `success` to false.
    pub fn record_error(&mut self, error: impl std::fmt::Display) {
        self.metadata
            .insert("error".to_string(), Value::String(error.to_string()));
        self.success = false;
    }
}
