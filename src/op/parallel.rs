//! The `|` composite: fan every child out against the *same* context and
//! wait for all of them, failing on the first error.
//!
//! Sync children are submitted one at a time to the context's
//! [`crate::worker_pool::WorkerPool`], so a parallel composite running in
//! sync mode never exceeds the pool's worker bound; async children are each
//! `tokio::spawn`ed as a cooperative task. Either way results are collected
//! in submission order (FIFO join), never in completion order, and the
//! first child error aborts every sibling still outstanding instead of
//! waiting for them to finish.

use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::context::Ctx;
use crate::error::OpError;
use crate::op::{block_on_bridging, Op, OpBase};

pub struct ParallelOp {
    pub base: OpBase,
    /// Deadline for the whole fan-out; `None` means wait indefinitely.
    pub timeout: Option<Duration>,
}

impl ParallelOp {
    pub fn new(ops: Vec<Box<dyn Op>>) -> Self {
        let async_mode = ops.first().map(|op| op.async_mode()).unwrap_or(false);
        let mut base = OpBase::new("parallel_op", async_mode);
        base.ops = ops;
        Self { base, timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Op for ParallelOp {
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

    /// Sync fan-out: each child is submitted to the context's worker pool
    /// one at a time, so submission itself is gated by the pool's cap; the
    /// first child error aborts every sibling still outstanding.
    fn execute(&mut self, context: &Ctx) -> Result<(), OpError> {
        let pool = context
            .worker_pool
            .clone()
            .expect("ParallelOp sync execute requires a worker pool attached to the context");
        let children = std::mem::take(&mut self.base.ops);
        let name = self.base.name.clone();
        let timeout = self.timeout;
        let context = context.clone();

        let (restored, result) = block_on_bridging(async move {
            let mut handles = Vec::with_capacity(children.len());
            for mut child in children {
                let context = context.clone();
                let handle = pool
                    .spawn_task(move || {
                        let result = child.call(&context);
                        (child, result)
                    })
                    .await;
                handles.push(handle);
            }
            join_children(handles, &name, timeout).await
        });

        self.base.ops = restored;
        result
    }

    /// Async fan-out: every child is spawned as a cooperative task; the
    /// first child error (or panic/join failure) aborts every sibling still
    /// outstanding instead of waiting for them to finish, and an optional
    /// deadline aborts the whole batch on expiry.
    async fn async_execute(&mut self, context: &Ctx) -> Result<(), OpError> {
        let children = std::mem::take(&mut self.base.ops);
        let mut handles = Vec::with_capacity(children.len());
        for mut child in children {
            let context = context.clone();
            handles.push(tokio::spawn(async move {
                let result = child.async_call(&context).await;
                (child, result)
            }));
        }

        let name = self.base.name.clone();
        let (restored, result) = join_children(handles, &name, self.timeout).await;
        self.base.ops = restored;
        result
    }

    fn attach(&mut self, _other: Box<dyn Op>) -> Result<(), OpError> {
        Err(OpError::AttachUnsupported {
            op: self.base.name.clone(),
        })
    }
}

/// Join a batch of spawned children in submission order, honoring an
/// optional deadline: a timeout aborts every child still outstanding and
/// reports [`OpError::Timeout`]; otherwise the first child error aborts
/// every child still outstanding and propagates. Successfully joined
/// children (including ones that themselves errored) are returned so the
/// caller can restore them into `base.ops`.
async fn join_children(
    mut handles: Vec<JoinHandle<(Box<dyn Op>, Result<(), OpError>)>>,
    task_name: &str,
    timeout: Option<Duration>,
) -> (Vec<Box<dyn Op>>, Result<(), OpError>) {
    let started = tokio::time::Instant::now();
    let mut restored = Vec::with_capacity(handles.len());
    let mut index = 0;

    while index < handles.len() {
        let outcome = match timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(started.elapsed());
                match tokio::time::timeout(remaining, &mut handles[index]).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        for sibling in &handles[index..] {
                            sibling.abort();
                        }
                        return (
                            restored,
                            Err(OpError::Timeout {
                                task: task_name.to_string(),
                                elapsed: started.elapsed(),
                            }),
                        );
                    }
                }
            }
            None => (&mut handles[index]).await,
        };

        match outcome {
            Ok((child, Ok(()))) => {
                restored.push(child);
                index += 1;
            }
            Ok((child, Err(error))) => {
                restored.push(child);
                for sibling in &handles[index + 1..] {
                    sibling.abort();
                }
                return (restored, Err(error));
            }
            Err(join_error) => {
                for sibling in &handles[index + 1..] {
                    sibling.abort();
                }
                return (
                    restored,
                    Err(OpError::Join {
                        task: task_name.to_string(),
                        source: Box::new(join_error),
                    }),
                );
            }
        }
    }

    (restored, Ok(()))
}
