//! End-to-end: a streaming flow whose root op pushes two answer chunks then
//! fails. The consumer observes exactly `[answer, answer, error, done]`, in
//! that order, with the done chunk always last.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Map;

use flowllm::config::FlowConfig;
use flowllm::context::Ctx;
use flowllm::error::OpError;
use flowllm::registry::{Registry, RegistryKind};
use flowllm::stream::ChunkKind;
use flowllm::worker_pool::WorkerPool;
use flowllm::{Flow, Op, OpBase};

struct TwoChunksThenFailOp {
    base: OpBase,
}

impl TwoChunksThenFailOp {
    fn new() -> Self {
        Self {
            base: OpBase::new("streamer", true),
        }
    }
}

#[async_trait]
impl Op for TwoChunksThenFailOp {
    fn base(&self) -> &OpBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    async fn async_execute(&mut self, context: &Ctx) -> Result<(), OpError> {
        let stream = context.stream.as_ref().expect("stream attached for streaming flow");
        stream.send(ChunkKind::Answer, "first").await;
        stream.send(ChunkKind::Answer, "second").await;
        Err(OpError::Failed {
            op: self.base.name.clone(),
            source: "stream producer failed".into(),
        })
    }
}

#[tokio::test]
async fn queue_ends_with_answer_answer_error_done_in_order() {
    let registry = Registry::new(RegistryKind::Op);
    registry.register("streamer", None, |_| Ok(Box::new(TwoChunksThenFailOp::new()) as Box<dyn Op>));

    let config = FlowConfig {
        name: "stream_flow".to_string(),
        description: String::new(),
        input_schema: Default::default(),
        output_schema: Default::default(),
        stream: true,
        raise_exception: true,
        flow_content: "streamer".to_string(),
    };
    let flow = Arc::new(Flow::new(&config, Arc::new(registry), Arc::new(HashMap::new()), Arc::new(WorkerPool::new(4))));

    let mut receiver = flow.start_stream(Map::new(), None);
    let mut kinds = Vec::new();
    let mut dones = Vec::new();
    while let Some(chunk) = receiver.recv().await {
        dones.push(chunk.done);
        kinds.push(chunk.chunk_type);
        if chunk.done {
            break;
        }
    }

    assert_eq!(kinds, vec![ChunkKind::Answer, ChunkKind::Answer, ChunkKind::Error, ChunkKind::Answer]);
    assert_eq!(dones, vec![false, false, false, true]);
    assert!(*dones.last().unwrap());
}
