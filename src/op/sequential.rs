//! The `>>` composite: run children one after another against the same
//! context, stopping at the first failure.

use async_trait::async_trait;
use std::any::Any;

use crate::context::Ctx;
use crate::error::OpError;
use crate::op::{Op, OpBase};
use crate::tool_call::ToolCall;

pub struct SequentialOp {
    pub base: OpBase,
}

impl SequentialOp {
    pub fn new(ops: Vec<Box<dyn Op>>) -> Self {
        let async_mode = ops.first().map(|op| op.async_mode()).unwrap_or(false);
        let mut base = OpBase::new("sequential_op", async_mode);
        base.ops = ops;
        Self { base }
    }
}

#[async_trait]
impl Op for SequentialOp {
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
        for child in &mut self.base.ops {
            child.call(context)?;
        }
        Ok(())
    }

    async fn async_execute(&mut self, context: &Ctx) -> Result<(), OpError> {
        for child in &mut self.base.ops {
            child.async_call(context).await?;
        }
        Ok(())
    }

    /// A sequential composite advertises its first child's tool call: it is
    /// usually built as "bind inputs, then run the rest" and the first
    /// child is the one a caller addresses the whole chain through.
    fn tool_call(&self) -> Option<ToolCall> {
        self.base.ops.first().and_then(|child| child.tool_call())
    }

    /// `<<` is reserved for leaf tool ops; a sequential chain's children are
    /// joined with `>>` only.
    fn attach(&mut self, _other: Box<dyn Op>) -> Result<(), OpError> {
        Err(OpError::AttachUnsupported {
            op: self.base.name.clone(),
        })
    }
}
