//! Service adapters: ways a deployment exposes registered flows to the
//! outside world. Adapters implement no flow logic of their own.

pub mod http;

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::service_context::ServiceContext;

/// Exposes every registered tool-capable flow as a callable function:
/// invoking it runs the flow and returns just its `answer`, the way an
/// LLM's tool-calling loop expects a single string result back.
pub struct ToolInvocationAdapter {
    context: Arc<ServiceContext>,
}

impl ToolInvocationAdapter {
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self { context }
    }

    /// The descriptors every tool-capable flow advertises, in the
    /// provider-neutral function-call shape.
    pub fn catalogue(&self) -> Vec<Value> {
        self.context
            .flows()
            .filter_map(|(_, flow)| flow.tool_call())
            .map(|tool| tool.to_function_descriptor())
            .collect()
    }

    pub async fn invoke(&self, flow_name: &str, params: Map<String, Value>) -> Result<String, ServiceError> {
        let flow = self
            .context
            .flow(flow_name)
            .ok_or_else(|| ServiceError::Config(format!("flow '{flow_name}' not found")))?;
        let response = flow.async_call(params, Some(self.context.config.clone())).await?;
        Ok(response.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlowConfig, ServiceConfig};

    #[tokio::test]
    async fn invoke_runs_the_flow_and_returns_its_answer() {
        let mut config = ServiceConfig::default();
        config.flow_engine.flows.push(FlowConfig {
            name: "echo_flow".to_string(),
            description: String::new(),
            input_schema: Default::default(),
            output_schema: Default::default(),
            stream: false,
            raise_exception: true,
            flow_content: "echo_op".to_string(),
        });
        let context = Arc::new(ServiceContext::build(config).unwrap());
        let adapter = ToolInvocationAdapter::new(context);

        let result = adapter.invoke("echo_flow", Map::new()).await.unwrap();
        assert_eq!(result, "");
    }
}
