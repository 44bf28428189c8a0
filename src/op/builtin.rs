//! Small leaf operations used by tests and as minimal building blocks for
//! hand-written flows; nothing here is tool-capable.

use async_trait::async_trait;
use std::any::Any;

use crate::context::Ctx;
use crate::error::OpError;
use crate::op::{Op, OpBase, RetryPolicy};
use crate::registry::Registry;

/// Register the handful of ops that ship with the engine itself, available
/// under their short names without any configuration.
pub fn register_defaults(registry: &Registry<Box<dyn Op>>) {
    registry.register("echo_op", None, |_| Ok(Box::new(EchoOp::new("echo_op", false)) as Box<dyn Op>));
}

/// Writes `"{name}_result" = "echo"` into the context and otherwise does
/// nothing; used to exercise the `>>`/`|` composition algebra without
/// pulling in a real operation.
pub struct EchoOp {
    base: OpBase,
}

impl EchoOp {
    pub fn new(name: impl Into<String>, async_mode: bool) -> Self {
        Self {
            base: OpBase::new(name, async_mode),
        }
    }
}

#[async_trait]
impl Op for EchoOp {
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
        context.set(format!("{}_result", self.base.name), "echo");
        Ok(())
    }

    async fn async_execute(&mut self, context: &Ctx) -> Result<(), OpError> {
        context.set(format!("{}_result", self.base.name), "echo");
        Ok(())
    }
}

/// Always fails its `execute` step; used to exercise the retry loop and its
/// fallback to `default_execute` when `raise_on_exhaust` is false.
pub struct AlwaysFailOp {
    base: OpBase,
}

impl AlwaysFailOp {
    pub fn new(name: impl Into<String>, max_retries: u32) -> Self {
        Self {
            base: OpBase::new(name, false).with_retry(RetryPolicy {
                max_retries,
                raise_on_exhaust: false,
            }),
        }
    }
}

#[async_trait]
impl Op for AlwaysFailOp {
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

    fn execute(&mut self, _context: &Ctx) -> Result<(), OpError> {
        Err(OpError::Failed {
            op: self.base.name.clone(),
            source: "intentional failure".into(),
        })
    }

    fn default_execute(&mut self, context: &Ctx) -> Result<(), OpError> {
        context.set(
            format!("{}_result", self.base.name),
            format!("{} execution failed!", self.base.name),
        );
        Ok(())
    }
}
