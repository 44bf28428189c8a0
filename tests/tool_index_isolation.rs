//! End-to-end: two copies of the same tool op, distinguished only by
//! `tool_index`, run in parallel against one shared context. Each writes
//! `result`, and the suffixing rule keeps the two writes from colliding.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use flowllm::context::{Ctx, FlowContext};
use flowllm::error::OpError;
use flowllm::op::tool::ToolBinding;
use flowllm::worker_pool::WorkerPool;
use flowllm::{Op, OpBase, ParallelOp, ParamAttrs, ToolCall};

struct IndexedTool {
    base: OpBase,
    tool: ToolCall,
    binding: ToolBinding,
    value: &'static str,
}

impl IndexedTool {
    fn new(tool_index: usize, value: &'static str) -> Self {
        let mut base = OpBase::new("indexed_tool_op", false);
        base.tool_index = tool_index;
        Self {
            base,
            tool: ToolCall::new("indexed_tool_op").with_output("result", ParamAttrs::new("str")),
            binding: ToolBinding::new(),
            value,
        }
    }
}

#[async_trait]
impl Op for IndexedTool {
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

    fn tool_call(&self) -> Option<ToolCall> {
        Some(self.tool.clone())
    }

    fn execute(&mut self, _context: &Ctx) -> Result<(), OpError> {
        self.binding.set_result("result", self.value);
        Ok(())
    }

    fn after_execute(&mut self, context: &Ctx) -> Result<(), OpError> {
        self.binding.bind_outputs(&self.tool, self.base.tool_index, &HashMap::new(), false, context);
        Ok(())
    }
}

#[tokio::test]
async fn parallel_copies_write_distinct_suffixed_keys() {
    let mut par = ParallelOp::new(vec![
        Box::new(IndexedTool::new(0, "from-zero")),
        Box::new(IndexedTool::new(1, "from-one")),
    ]);
    let pool = Arc::new(WorkerPool::new(2));
    let context = FlowContext::new("f1").with_worker_pool(pool).into_shared();
    let context_for_assertions = context.clone();

    tokio::task::spawn_blocking(move || par.call(&context))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(context_for_assertions.get_str("result"), Some("from-zero".to_string()));
    assert_eq!(context_for_assertions.get_str("result.1"), Some("from-one".to_string()));
}
