pub mod config;
pub mod context;
pub mod error;
pub mod flow;
pub mod op;
pub mod parser;
pub mod providers;
pub mod registry;
pub mod response;
pub mod service;
pub mod service_context;
pub mod stream;
pub mod tool_call;
pub mod types;
pub mod worker_pool;

pub use context::{Ctx, FlowContext};
pub use error::{ExpressionError, FlowError, OpError, ParseError, RegistryError, ServiceError};
pub use flow::Flow;
pub use op::{Op, OpBase, ParallelOp, RetryPolicy, SequentialOp};
pub use registry::{Registry, RegistryKind};
pub use response::FlowResponse;
pub use service_context::ServiceContext;
pub use stream::{ChunkKind, StreamChunk, StreamSender};
pub use tool_call::{ParamAttrs, Schema, ToolCall};
pub use types::{ChatMessage, MessageRole};
