//! A named, top-level composition of operations plus the runtime policy
//! wrapped around it: retries live on individual ops, but streaming and
//! error-capture policy live here.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::{FlowConfig, OpConfig, ServiceConfig};
use crate::context::FlowContext;
use crate::error::FlowError;
use crate::op::Op;
use crate::parser;
use crate::registry::Registry;
use crate::response::FlowResponse;
use crate::stream::{StreamChunk, StreamSender, DEFAULT_QUEUE_CAPACITY};
use crate::tool_call::ToolCall;
use crate::worker_pool::WorkerPool;

/// A flow's root operation tree is rebuilt on every call (see
/// [`Flow::build_root`]) so that mutable state living inside the tree (a
/// `ParallelOp`'s children, a tool op's scratch bindings) never leaks
/// across invocations. Only the compiled textual source is cached.
pub struct Flow {
    pub name: String,
    pub description: String,
    pub stream: bool,
    pub raise_exception: bool,
    content: String,
    registry: Arc<Registry<Box<dyn Op>>>,
    op_configs: Arc<HashMap<String, OpConfig>>,
    worker_pool: Arc<WorkerPool>,
}

impl Flow {
    pub fn new(
        config: &FlowConfig,
        registry: Arc<Registry<Box<dyn Op>>>,
        op_configs: Arc<HashMap<String, OpConfig>>,
        worker_pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            stream: config.stream,
            raise_exception: config.raise_exception,
            content: config.flow_content.clone(),
            registry,
            op_configs,
            worker_pool,
        }
    }

    fn build_root(&self) -> Result<Box<dyn Op>, FlowError> {
        Ok(parser::compile(&self.content, &self.registry, &self.op_configs)?)
    }

    /// A flow advertises a [`ToolCall`] by delegating to its root op, when
    /// the root declares one.
    pub fn tool_call(&self) -> Option<ToolCall> {
        self.build_root().ok().and_then(|root| root.tool_call())
    }

    /// Run the flow to completion and return its response. Honors
    /// `raise_exception`: a `false` policy captures the failure into the
    /// response instead of propagating it.
    pub async fn async_call(
        &self,
        request: Map<String, Value>,
        service_config: Option<Arc<ServiceConfig>>,
    ) -> Result<FlowResponse, FlowError> {
        let mut root = self.build_root()?;
        let context = {
            let mut ctx = FlowContext::new(uuid_like_id(&self.name))
                .with_request(request)
                .with_worker_pool(self.worker_pool.clone());
            if let Some(config) = service_config {
                ctx = ctx.with_service_config(config);
            }
            ctx.into_shared()
        };

        tracing::info!(flow = %self.name, "flow call starting");

        let outcome = if root.async_mode() {
            root.async_call(&context).await
        } else {
            let pool = self.worker_pool.clone();
            let context_for_job = context.clone();
            pool.run_one(move || root.call(&context_for_job))
                .await
        };

        match outcome {
            Ok(()) => Ok(context.response_snapshot()),
            Err(error) if !self.raise_exception => {
                context.record_error(&error);
                Ok(context.response_snapshot())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// The blocking counterpart of [`Flow::async_call`]. When the root is
    /// async, spins up a short-lived single-threaded runtime to drive it;
    /// callers must not invoke this from inside an already-running tokio
    /// runtime.
    pub fn call(
        &self,
        request: Map<String, Value>,
        service_config: Option<Arc<ServiceConfig>>,
    ) -> Result<FlowResponse, FlowError> {
        let mut root = self.build_root()?;
        let context = {
            let mut ctx = FlowContext::new(uuid_like_id(&self.name))
                .with_request(request)
                .with_worker_pool(self.worker_pool.clone());
            if let Some(config) = service_config {
                ctx = ctx.with_service_config(config);
            }
            ctx.into_shared()
        };

        let outcome = if root.async_mode() {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to start bridging runtime");
            runtime.block_on(root.async_call(&context))
        } else {
            root.call(&context)
        };

        match outcome {
            Ok(()) => Ok(context.response_snapshot()),
            Err(error) if !self.raise_exception => {
                context.record_error(&error);
                Ok(context.response_snapshot())
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Run the flow with its stream queue attached, returning the receiver
    /// immediately; the flow executes in a spawned task and pushes chunks
    /// as they are produced, finishing with a terminal `done` chunk.
    pub fn start_stream(
        self: &Arc<Self>,
        request: Map<String, Value>,
        service_config: Option<Arc<ServiceConfig>>,
    ) -> tokio::sync::mpsc::Receiver<StreamChunk> {
        let flow_id = uuid_like_id(&self.name);
        let (sender, receiver) = StreamSender::new(flow_id.clone(), DEFAULT_QUEUE_CAPACITY);
        let flow = self.clone();

        tokio::spawn(async move {
            let mut root = match flow.build_root() {
                Ok(root) => root,
                Err(error) => {
                    sender.send_error(error).await;
                    sender.send_done().await;
                    return;
                }
            };

            let context = {
                let mut ctx = FlowContext::new(flow_id)
                    .with_request(request)
                    .with_stream(sender.clone())
                    .with_worker_pool(flow.worker_pool.clone());
                if let Some(config) = service_config {
                    ctx = ctx.with_service_config(config);
                }
                ctx.into_shared()
            };

            let outcome = if root.async_mode() {
                root.async_call(&context).await
            } else {
                let context_for_job = context.clone();
                flow.worker_pool.run_one(move || root.call(&context_for_job)).await
            };

            if let Err(error) = outcome {
                if flow.raise_exception {
                    sender.send_error(&error).await;
                } else {
                    context.record_error(&error);
                    sender.send_error(&error).await;
                }
            } else {
                let answer = context.response_snapshot().answer;
                if !answer.is_empty() {
                    sender.send(crate::stream::ChunkKind::Answer, answer).await;
                }
            }
            sender.send_done().await;
        });

        receiver
    }
}

/// A call id derived from the flow's name plus a process-wide counter.
fn uuid_like_id(flow_name: &str) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{flow_name}-{n:x}")
}
