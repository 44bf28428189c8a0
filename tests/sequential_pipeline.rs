//! End-to-end: a three-op sequential pipeline built through the registry and
//! the expression compiler, run through a real `Flow`. The last child to
//! write the response answer wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Map;
use std::any::Any;

use flowllm::config::FlowConfig;
use flowllm::context::Ctx;
use flowllm::error::OpError;
use flowllm::registry::{Registry, RegistryKind};
use flowllm::worker_pool::WorkerPool;
use flowllm::{Flow, Op, OpBase};

/// Writes its own name into the response answer; the pipeline's final
/// answer is therefore whichever of these ran last.
struct NameOp {
    base: OpBase,
}

impl NameOp {
    fn new(name: &str) -> Self {
        Self {
            base: OpBase::new(name, false),
        }
    }
}

#[async_trait]
impl Op for NameOp {
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

    fn execute(&mut self, context: &Ctx) -> Result<(), OpError> {
        context.set_answer(self.base.name.clone());
        Ok(())
    }
}

fn registry() -> Arc<Registry<Box<dyn Op>>> {
    let registry = Registry::new(RegistryKind::Op);
    for name in ["op1", "op2", "op3"] {
        let owned = name.to_string();
        registry.register(name, None, move |_| Ok(Box::new(NameOp::new(&owned)) as Box<dyn Op>));
    }
    Arc::new(registry)
}

#[tokio::test]
async fn last_op_in_sequence_wins_the_answer() {
    let config = FlowConfig {
        name: "pipeline".to_string(),
        description: String::new(),
        input_schema: Default::default(),
        output_schema: Default::default(),
        stream: false,
        raise_exception: true,
        flow_content: "op1 >> op2 >> op3".to_string(),
    };
    let flow = Flow::new(&config, registry(), Arc::new(HashMap::new()), Arc::new(WorkerPool::new(4)));

    let response = flow.async_call(Map::new(), None).await.unwrap();

    assert!(response.success);
    assert!(response.metadata.get("error").is_none());
    assert_eq!(response.answer, "op3");
}
