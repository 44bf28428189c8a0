//! A canned [`Llm`] used by tests and by flows running without a
//! configured backend: it plays back a fixed list of responses in order.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::providers::{Llm, ProviderError};
use crate::types::ChatMessage;

pub struct ScriptedLlm {
    responses: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    fn next_response(&self) -> Option<String> {
        let mut responses = self.responses.lock().expect("scripted llm lock poisoned");
        if responses.is_empty() {
            None
        } else {
            Some(responses.remove(0))
        }
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<ChatMessage, ProviderError> {
        match self.next_response() {
            Some(text) => Ok(ChatMessage::assistant(text)),
            None => Err(ProviderError::ScriptExhausted { backend: "scripted" }),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
