//! Configuration layer: the on-disk [`ServiceConfig`] document, CLI
//! dotted-path overrides, and `.env` discovery.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ServiceError;
use crate::tool_call::Schema;

fn default_backend() -> String {
    "http".to_string()
}

fn default_thread_pool_workers() -> usize {
    16
}

/// Per-operation configuration: which backend (registry entry) to
/// instantiate, its retry policy, and its late-bound resource keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpConfig {
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub language: String,
    #[serde(default = "default_true")]
    pub raise_exception: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_key")]
    pub llm: String,
    #[serde(default = "default_llm_key")]
    pub embedding_model: String,
    #[serde(default = "default_llm_key")]
    pub vector_store: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    1
}

fn default_llm_key() -> String {
    "default".to_string()
}

impl Default for OpConfig {
    fn default() -> Self {
        Self {
            backend: String::new(),
            language: String::new(),
            raise_exception: true,
            max_retries: 1,
            llm: default_llm_key(),
            embedding_model: default_llm_key(),
            vector_store: default_llm_key(),
            params: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingModelConfig {
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub embedding_model: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// The declarative shape of one registered flow: its tool-call schema and
/// the operator-expression source text compiled into its root operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Schema,
    #[serde(default)]
    pub output_schema: Schema,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_true")]
    pub raise_exception: bool,
    pub flow_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEngineConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub flows: Vec<FlowConfig>,
}

impl Default for FlowEngineConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            params: Map::new(),
            flows: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_keep_alive() -> u64 {
    600
}

fn default_concurrency_limit() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive")]
    pub timeout_keep_alive_secs: u64,
    #[serde(default = "default_concurrency_limit")]
    pub limit_concurrency: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_keep_alive_secs: default_keep_alive(),
            limit_concurrency: default_concurrency_limit(),
        }
    }
}

/// The process-wide configuration document: YAML on disk, overridable by
/// dotted `key=value` CLI arguments, itself layered over these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub language: String,
    #[serde(default = "default_thread_pool_workers")]
    pub thread_pool_max_workers: usize,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub flow_engine: FlowEngineConfig,
    #[serde(default)]
    pub op: std::collections::HashMap<String, OpConfig>,
    #[serde(default)]
    pub llm: std::collections::HashMap<String, LlmConfig>,
    #[serde(default)]
    pub embedding_model: std::collections::HashMap<String, EmbeddingModelConfig>,
    #[serde(default)]
    pub vector_store: std::collections::HashMap<String, VectorStoreConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            language: String::new(),
            thread_pool_max_workers: default_thread_pool_workers(),
            http: HttpConfig::default(),
            flow_engine: FlowEngineConfig::default(),
            op: Default::default(),
            llm: Default::default(),
            embedding_model: Default::default(),
            vector_store: Default::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ServiceError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn op_config(&self, name: &str) -> OpConfig {
        self.op.get(name).cloned().unwrap_or_default()
    }

    /// Apply `key.path=value` overrides (as collected from the CLI) on top
    /// of this document. Values are parsed as YAML scalars first (so
    /// `true`, `16`, `3.0` land as their native types) and fall back to
    /// plain strings.
    pub fn apply_overrides(&mut self, overrides: &[String]) -> Result<(), ServiceError> {
        let mut value = serde_yaml::to_value(&*self)?;
        for entry in overrides {
            let (path, raw) = entry.split_once('=').ok_or_else(|| {
                ServiceError::Config(format!("override '{entry}' is not in key=value form"))
            })?;
            let parsed: serde_yaml::Value =
                serde_yaml::from_str(raw).unwrap_or_else(|_| serde_yaml::Value::String(raw.to_string()));
            set_dotted(&mut value, path, parsed)?;
        }
        *self = serde_yaml::from_value(value)?;
        Ok(())
    }
}

fn set_dotted(root: &mut serde_yaml::Value, path: &str, new_value: serde_yaml::Value) -> Result<(), ServiceError> {
    let mut cursor = root;
    let parts: Vec<&str> = path.split('.').collect();
    for part in &parts[..parts.len() - 1] {
        if !cursor.is_mapping() {
            *cursor = serde_yaml::Value::Mapping(Default::default());
        }
        let mapping = cursor.as_mapping_mut().expect("just ensured mapping");
        cursor = mapping
            .entry(serde_yaml::Value::String(part.to_string()))
            .or_insert_with(|| serde_yaml::Value::Mapping(Default::default()));
    }
    let last = parts
        .last()
        .ok_or_else(|| ServiceError::Config("empty override key".to_string()))?;
    if !cursor.is_mapping() {
        *cursor = serde_yaml::Value::Mapping(Default::default());
    }
    cursor
        .as_mapping_mut()
        .expect("just ensured mapping")
        .insert(serde_yaml::Value::String(last.to_string()), new_value);
    Ok(())
}

/// Walk up to five parent directories from `start` looking for a `.env`
/// file, the way the process locates one once at startup.
pub fn locate_dotenv(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start.to_path_buf());
    for _ in 0..=5 {
        let candidate = dir.as_ref()?.join(".env");
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.and_then(|d| d.parent().map(Path::to_path_buf));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.thread_pool_max_workers, 16);
        assert_eq!(config.http.port, 8001);
        assert_eq!(config.backend, "http");
    }

    #[test]
    fn dotted_override_sets_nested_field() {
        let mut config = ServiceConfig::default();
        config
            .apply_overrides(&["thread_pool_max_workers=4".to_string(), "http.port=9100".to_string()])
            .unwrap();
        assert_eq!(config.thread_pool_max_workers, 4);
        assert_eq!(config.http.port, 9100);
    }

    #[test]
    fn locate_dotenv_walks_up_parents() {
        let dir = std::env::temp_dir().join(format!("flowllm-dotenv-test-{}", std::process::id()));
        let nested = dir.join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.join(".env"), "FOO=bar").unwrap();

        let found = locate_dotenv(&nested);
        assert_eq!(found, Some(dir.join(".env")));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
