//! The per-invocation stream queue: a bounded MPSC channel carrying tagged
//! [`StreamChunk`]s, terminated by a `done` sentinel chunk.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// The kind of payload carried by a [`StreamChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Answer,
    Think,
    Tool,
    Usage,
    Error,
}

/// A single record pushed onto a flow's stream queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub flow_id: String,
    pub chunk_type: ChunkKind,
    pub chunk: Value,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl StreamChunk {
    pub fn new(flow_id: impl Into<String>, chunk_type: ChunkKind, chunk: impl Into<Value>) -> Self {
        Self {
            flow_id: flow_id.into(),
            chunk_type,
            chunk: chunk.into(),
            done: false,
            metadata: Map::new(),
        }
    }

    pub fn done(flow_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            chunk_type: ChunkKind::Answer,
            chunk: Value::Null,
            done: true,
            metadata: Map::new(),
        }
    }

    pub fn answer(flow_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(flow_id, ChunkKind::Answer, Value::String(text.into()))
    }

    pub fn error(flow_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(flow_id, ChunkKind::Error, Value::String(text.into()))
    }
}

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// The producer side of a flow's stream queue. Writing after the queue has
/// observed its terminal chunk, or after the consumer has dropped the
/// receiver, is a no-op logged at `warn` rather than an error: a slow or
/// disconnected HTTP client must never make an operation fail.
#[derive(Clone)]
pub struct StreamSender {
    flow_id: String,
    tx: mpsc::Sender<StreamChunk>,
}

impl StreamSender {
    pub fn new(flow_id: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<StreamChunk>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                flow_id: flow_id.into(),
                tx,
            },
            rx,
        )
    }

    pub async fn send(&self, chunk_type: ChunkKind, chunk: impl Into<Value>) {
        self.send_chunk(StreamChunk::new(self.flow_id.clone(), chunk_type, chunk))
            .await;
    }

    pub async fn send_chunk(&self, chunk: StreamChunk) {
        if self.tx.send(chunk).await.is_err() {
            tracing::warn!(flow_id = %self.flow_id, "stream consumer dropped before send");
        }
    }

    pub async fn send_done(&self) {
        self.send_chunk(StreamChunk::done(self.flow_id.clone())).await;
    }

    pub async fn send_error(&self, text: impl std::fmt::Display) {
        self.send_chunk(StreamChunk::error(self.flow_id.clone(), text.to_string()))
            .await;
    }
}
