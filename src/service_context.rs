//! The process-wide singleton tying configuration, registries, the worker
//! pool, and instantiated flows together.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::flow::Flow;
use crate::op::Op;
use crate::providers::{EmbeddingModel, Llm, VectorStore};
use crate::registry::{Registry, RegistryKind};
use crate::worker_pool::WorkerPool;

static INSTANCE: OnceCell<Arc<ServiceContext>> = OnceCell::new();

/// Owns every shared, read-only-after-init resource a flow might reach for:
/// the seven typed registries, the worker pool, and the flows instantiated
/// from configuration. A second call to [`ServiceContext::install`] is a
/// no-op; [`ServiceContext::get`] returns whichever instance was installed
/// first.
pub struct ServiceContext {
    pub id: String,
    pub config: Arc<ServiceConfig>,
    pub llm: Registry<Arc<dyn Llm>>,
    pub embedding_model: Registry<Arc<dyn EmbeddingModel>>,
    pub vector_store: Registry<Arc<dyn VectorStore>>,
    pub op: Arc<Registry<Box<dyn Op>>>,
    pub flow: Registry<Box<dyn Op>>,
    pub service: Registry<Box<dyn Op>>,
    pub token_counter: Registry<Box<dyn Op>>,
    pub worker_pool: Arc<WorkerPool>,
    flows: HashMap<String, Arc<Flow>>,
}

impl ServiceContext {
    /// Build a fresh context from `config`. Flows declared under
    /// `config.flow_engine.flows` are compiled eagerly so a misconfigured
    /// flow is a boot-time error, not a first-request surprise.
    pub fn build(config: ServiceConfig) -> Result<Self, ServiceError> {
        let config = Arc::new(config);
        let worker_pool = Arc::new(WorkerPool::new(config.thread_pool_max_workers));
        let op_registry = Arc::new(Registry::new(RegistryKind::Op));
        crate::op::builtin::register_defaults(&op_registry);

        let op_configs = Arc::new(config.op.clone());

        let mut flows = HashMap::new();
        for flow_config in &config.flow_engine.flows {
            let flow = Flow::new(flow_config, op_registry.clone(), op_configs.clone(), worker_pool.clone());
            flows.insert(flow_config.name.clone(), Arc::new(flow));
        }

        Ok(Self {
            id: format!("flowllm-{}", std::process::id()),
            config,
            llm: Registry::new(RegistryKind::Llm),
            embedding_model: Registry::new(RegistryKind::EmbeddingModel),
            vector_store: Registry::new(RegistryKind::VectorStore),
            op: op_registry,
            flow: Registry::new(RegistryKind::Flow),
            service: Registry::new(RegistryKind::Service),
            token_counter: Registry::new(RegistryKind::TokenCounter),
            worker_pool,
            flows,
        })
    }

    /// Install `self` as the process-wide singleton. Returns the instance
    /// that actually won the race (this one, unless another caller beat it).
    pub fn install(self) -> Arc<ServiceContext> {
        let arc = Arc::new(self);
        match INSTANCE.set(arc.clone()) {
            Ok(()) => arc,
            Err(_) => INSTANCE.get().expect("just failed to set, so it's occupied").clone(),
        }
    }

    pub fn get() -> Option<Arc<ServiceContext>> {
        INSTANCE.get().cloned()
    }

    pub fn flows(&self) -> impl Iterator<Item = (&String, &Arc<Flow>)> {
        self.flows.iter()
    }

    pub fn flow(&self, name: &str) -> Option<Arc<Flow>> {
        self.flows.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_compiles_every_configured_flow() {
        let mut config = ServiceConfig::default();
        config.flow_engine.flows.push(crate::config::FlowConfig {
            name: "echo_flow".to_string(),
            description: String::new(),
            input_schema: Default::default(),
            output_schema: Default::default(),
            stream: false,
            raise_exception: true,
            flow_content: "echo_op".to_string(),
        });

        let context = ServiceContext::build(config).unwrap();
        assert!(context.flow("echo_flow").is_some());
    }
}
