//! Boundary traits for the late-bound resources an operation may reach for:
//! an LLM, an embedding model, a vector store. Concrete network clients are
//! out of scope here; ops depend on these traits and the registry supplies
//! whichever backend a deployment configures (or, in tests, a scripted
//! double from [`scripted`]).

pub mod scripted;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::ChatMessage;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{backend}: {message}")]
    Failed { backend: &'static str, message: String },

    #[error("{backend}: exhausted scripted responses")]
    ScriptExhausted { backend: &'static str },
}

#[async_trait]
pub trait Llm: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatMessage, ProviderError>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, id: &str, embedding: Vec<f32>) -> Result<(), ProviderError>;

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<String>, ProviderError>;

    fn name(&self) -> &'static str;
}
