//! Per-invocation scratchpad threaded through every operation in a flow.
//!
//! Parallel children run concurrently against the *same* context (see
//! `crate::op::parallel::ParallelOp`), so the slot map and response
//! accumulator use interior mutability rather than requiring an exclusive
//! `&mut` borrow. A context is always shared as `Arc<FlowContext>`
//! (aliased as [`Ctx`]) so it can be moved into spawned tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::config::ServiceConfig;
use crate::response::FlowResponse;
use crate::stream::StreamSender;
use crate::types::ChatMessage;
use crate::worker_pool::WorkerPool;

pub type Ctx = Arc<FlowContext>;

/// A handful of context keys carry first-class meaning to the runtime and
/// are exposed as typed fields (`response`, `stream`, `service_config`)
/// rather than living in the free-form slot map: `request`, `language`, and
/// every other op-defined key are read and written through
/// [`FlowContext::get`]/[`FlowContext::set`].
pub struct FlowContext {
    pub id: String,
    pub stream: Option<StreamSender>,
    pub service_config: Option<Arc<ServiceConfig>>,
    pub worker_pool: Option<Arc<WorkerPool>>,
    response: Mutex<FlowResponse>,
    data: Mutex<HashMap<String, Value>>,
}

impl FlowContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stream: None,
            service_config: None,
            worker_pool: None,
            response: Mutex::new(FlowResponse::new()),
            data: Mutex::new(HashMap::new()),
        }
    }

    pub fn into_shared(self) -> Ctx {
        Arc::new(self)
    }

    pub fn with_stream(mut self, stream: StreamSender) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_service_config(mut self, config: Arc<ServiceConfig>) -> Self {
        self.service_config = Some(config);
        self
    }

    /// Attach the pool `submit_task` and a sync `ParallelOp`'s fan-out
    /// dispatch blocking children onto.
    pub fn with_worker_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.worker_pool = Some(pool);
        self
    }

    /// Seed the context with the caller's request parameters: each field is
    /// projected onto a top-level slot (so `context.get("query")` works for
    /// input binding) and the whole object is additionally kept under the
    /// reserved `request` key.
    pub fn with_request(self, request: Map<String, Value>) -> Self {
        {
            let mut data = self.data.lock().expect("context lock poisoned");
            for (key, value) in request.iter() {
                data.insert(key.clone(), value.clone());
            }
            data.insert("request".to_string(), Value::Object(request));
        }
        self
    }

    pub fn with_language(self, language: impl Into<String>) -> Self {
        self.data
            .lock()
            .expect("context lock poisoned")
            .insert("language".to_string(), Value::String(language.into()));
        self
    }

    pub fn language(&self) -> Option<String> {
        self.data
            .lock()
            .expect("context lock poisoned")
            .get("language")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().expect("context lock poisoned").get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|value| value.as_str().map(str::to_string))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().expect("context lock poisoned").contains_key(key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.data
            .lock()
            .expect("context lock poisoned")
            .insert(key.into(), value.into());
    }

    pub fn set_answer(&self, answer: impl Into<String>) {
        self.response.lock().expect("context lock poisoned").answer = answer.into();
    }

    pub fn push_message(&self, message: ChatMessage) {
        self.response
            .lock()
            .expect("context lock poisoned")
            .push_message(message);
    }

    pub fn record_error(&self, error: impl std::fmt::Display) {
        self.response.lock().expect("context lock poisoned").record_error(error);
    }

    pub fn response_snapshot(&self) -> FlowResponse {
        self.response.lock().expect("context lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_fields_are_projected_as_top_level_slots() {
        let mut request = Map::new();
        request.insert("query".to_string(), Value::String("hello".into()));
        let context = FlowContext::new("f1").with_request(request);

        assert_eq!(context.get_str("query"), Some("hello".to_string()));
        assert_eq!(context.get("request").unwrap()["query"], "hello");
    }

    #[test]
    fn set_overwrites_in_place() {
        let context = FlowContext::new("f1");
        context.set("answer", "first");
        context.set("answer", "second");
        assert_eq!(context.get_str("answer"), Some("second".to_string()));
    }

    #[test]
    fn concurrent_writers_observe_each_others_keys() {
        let context = Arc::new(FlowContext::new("f1"));
        let mut handles = Vec::new();
        for i in 0..8 {
            let context = context.clone();
            handles.push(std::thread::spawn(move || {
                context.set(format!("k{i}"), i as i64);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        for i in 0..8 {
            assert_eq!(context.get(&format!("k{i}")), Some(Value::from(i as i64)));
        }
    }
}
