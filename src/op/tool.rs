//! The input/output binding protocol shared by every tool-capable operation.
//!
//! A tool op's `before_execute` reads its declared inputs out of the
//! context, its body writes outputs into an in-memory scratch map, and
//! `after_execute` writes them back. [`ToolBinding`] is the reusable glue;
//! concrete tool ops embed one and drive it from their `Op` impl.

use std::collections::HashMap;

use serde_json::Value;

use crate::context::Ctx;
use crate::error::OpError;
use crate::tool_call::ToolCall;

/// Compute the context key a tool-schema parameter binds to: an optional
/// rename, then a `.{tool_index}` suffix for every instance past the first.
pub fn bind_context_key(param_name: &str, rename: Option<&str>, tool_index: usize) -> String {
    let base = rename.unwrap_or(param_name);
    if tool_index == 0 {
        base.to_string()
    } else {
        format!("{base}.{tool_index}")
    }
}

/// Per-call scratch state for a tool op: the bound inputs and the outputs
/// accumulated by the op body before they are written back to the context.
#[derive(Default)]
pub struct ToolBinding {
    pub inputs: HashMap<String, Value>,
    pub outputs: HashMap<String, Value>,
}

impl ToolBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(Value::as_str)
    }

    pub fn set_result(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.outputs.insert(key.into(), value.into());
    }

    /// Read every declared input out of `context`, applying the schema's
    /// rename map (keyed by parameter name) and the op's `tool_index`
    /// suffix. Fails on the first missing required input.
    pub fn bind_inputs(
        &mut self,
        tool: &ToolCall,
        op_name: &str,
        tool_index: usize,
        renames: &HashMap<String, String>,
        context: &Ctx,
    ) -> Result<(), OpError> {
        self.inputs.clear();
        for (name, attrs) in &tool.input_schema {
            let rename = renames.get(name).map(String::as_str);
            let key = bind_context_key(name, rename, tool_index);
            match context.get(&key) {
                Some(value) => {
                    self.inputs.insert(name.clone(), value);
                }
                None if attrs.required => {
                    return Err(OpError::MissingInput {
                        op: op_name.to_string(),
                        key,
                    });
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Write every produced output back into `context` under its bound key,
    /// and, when `save_answer` is set, copy the single output (or a
    /// JSON-encoded object of all of them) into the response answer.
    pub fn bind_outputs(
        &self,
        tool: &ToolCall,
        tool_index: usize,
        renames: &HashMap<String, String>,
        save_answer: bool,
        context: &Ctx,
    ) {
        for (name, value) in &self.outputs {
            let rename = renames.get(name).map(String::as_str);
            let key = bind_context_key(name, rename, tool_index);
            context.set(key, value.clone());
        }

        if save_answer {
            let answer = match tool.single_output_key() {
                Some(key) => self
                    .outputs
                    .get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        self.outputs
                            .get(key)
                            .map(|v| v.to_string())
                            .unwrap_or_default()
                    }),
                None => serde_json::to_string(&self.outputs).unwrap_or_default(),
            };
            context.set_answer(answer);
        }
    }

    /// The `default_execute` fallback: fill every declared output with the
    /// op's standard failure text.
    pub fn fill_failure(&mut self, tool: &ToolCall, op_name: &str) {
        for name in tool.output_schema.keys() {
            self.outputs
                .insert(name.clone(), Value::String(format!("{op_name} execution failed!")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FlowContext;
    use crate::tool_call::ParamAttrs;

    fn search_tool() -> ToolCall {
        ToolCall::new("search_op")
            .with_input("query", ParamAttrs::new("str"))
            .default_single_output("search")
    }

    #[test]
    fn missing_required_input_fails() {
        let tool = search_tool();
        let context = FlowContext::new("f1").into_shared();
        let mut binding = ToolBinding::new();
        let err = binding
            .bind_inputs(&tool, "search_op", 0, &HashMap::new(), &context)
            .unwrap_err();
        assert!(matches!(err, OpError::MissingInput { .. }));
    }

    #[test]
    fn tool_index_suffixes_bound_keys() {
        let tool = search_tool();
        let context = FlowContext::new("f1").into_shared();
        context.set("query.1", "second");

        let mut binding = ToolBinding::new();
        binding
            .bind_inputs(&tool, "search_op", 1, &HashMap::new(), &context)
            .unwrap();
        assert_eq!(binding.input_str("query"), Some("second"));
    }

    #[test]
    fn save_answer_copies_single_output() {
        let tool = search_tool();
        let context = FlowContext::new("f1").into_shared();
        let mut binding = ToolBinding::new();
        binding.set_result("search_result", "hits");
        binding.bind_outputs(&tool, 0, &HashMap::new(), true, &context);

        assert_eq!(context.get_str("search_result"), Some("hits".to_string()));
        assert_eq!(context.response_snapshot().answer, "hits");
    }
}
