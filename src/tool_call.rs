//! Declarative input/output typing for tool-capable operations.
//!
//! An operation that binds context slots to named, typed parameters
//! advertises a [`ToolCall`]: an ordered input schema, an ordered output
//! schema, and enough metadata to serialise itself into a provider-neutral
//! function descriptor (the `{type:"function", function:{...}}` shape every
//! LLM tool-calling API expects).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Attributes of a single named parameter on a [`ToolCall`]'s input or
/// output schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamAttrs {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ParamAttrs {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: String::new(),
            required: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

pub type Schema = IndexMap<String, ParamAttrs>;

/// The tool-call descriptor a tool-capable operation advertises.
///
/// `index` disambiguates multiple instances of the same tool sharing one
/// context: any context key a non-zero-indexed instance reads or writes is
/// suffixed with `.{index}` (see `crate::op::tool::bind_context_key`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Schema,
    #[serde(default)]
    pub output_schema: Schema,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: 0,
            description: String::new(),
            input_schema: Schema::new(),
            output_schema: Schema::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, attrs: ParamAttrs) -> Self {
        self.input_schema.insert(name.into(), attrs);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, attrs: ParamAttrs) -> Self {
        self.output_schema.insert(name.into(), attrs);
        self
    }

    /// Default the output schema to a single `{short_name}_result` string
    /// slot, the way an unspecified tool op's output is defaulted.
    pub fn default_single_output(mut self, short_name: &str) -> Self {
        if self.output_schema.is_empty() {
            self.output_schema.insert(
                format!("{short_name}_result"),
                ParamAttrs::new("str")
                    .with_description(&format!("The execution result of the {short_name}")),
            );
        }
        self
    }

    /// The output schema's single key name, if there is exactly one output.
    pub fn single_output_key(&self) -> Option<&str> {
        if self.output_schema.len() == 1 {
            self.output_schema.keys().next().map(String::as_str)
        } else {
            None
        }
    }

    /// Serialise to the provider-neutral `{type:"function", function:{...}}`
    /// descriptor shape.
    pub fn to_function_descriptor(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for (name, attrs) in &self.input_schema {
            properties.insert(
                name.clone(),
                json!({ "type": attrs.kind, "description": attrs.description }),
            );
            if attrs.required {
                required.push(name.clone());
            }
        }

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }

    /// A flattened `{name: description}` projection, used by the
    /// tool-invocation adapter's catalogue listing and round-tripped in
    /// tests to check the schema survives (de)serialisation.
    pub fn simple_input_dump(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input_schema,
            "output_schema": self.output_schema,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_marks_required_inputs() {
        let tool = ToolCall::new("search")
            .with_description("search the web")
            .with_input("query", ParamAttrs::new("str").with_description("search text"))
            .with_input("limit", ParamAttrs::new("int").optional());

        let descriptor = tool.to_function_descriptor();
        let required = descriptor["function"]["parameters"]["required"]
            .as_array()
            .unwrap();
        assert_eq!(required, &vec![Value::String("query".into())]);
    }

    #[test]
    fn default_single_output_only_fills_when_empty() {
        let tool = ToolCall::new("search_op").default_single_output("search");
        assert_eq!(tool.single_output_key(), Some("search_result"));

        let tool = ToolCall::new("search_op")
            .with_output("hits", ParamAttrs::new("str"))
            .default_single_output("search");
        assert_eq!(tool.single_output_key(), Some("hits"));
    }

    #[test]
    fn simple_input_dump_round_trips() {
        let tool = ToolCall::new("search").with_input("query", ParamAttrs::new("str"));
        let dumped = tool.simple_input_dump();
        assert_eq!(dumped["name"], "search");
        assert_eq!(dumped["input_schema"]["query"]["type"], "str");
    }
}
