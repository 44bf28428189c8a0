//! Name -> constructor maps, one per registry kind. Registries never evict;
//! re-registering a name logs a warning and overwrites the previous entry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use crate::error::RegistryError;

/// The closed set of registry kinds the engine exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryKind {
    Llm,
    EmbeddingModel,
    VectorStore,
    Op,
    Flow,
    Service,
    TokenCounter,
}

impl RegistryKind {
    pub fn label(&self) -> &'static str {
        match self {
            RegistryKind::Llm => "llm",
            RegistryKind::EmbeddingModel => "embedding_model",
            RegistryKind::VectorStore => "vector_store",
            RegistryKind::Op => "op",
            RegistryKind::Flow => "flow",
            RegistryKind::Service => "service",
            RegistryKind::TokenCounter => "token_counter",
        }
    }
}

type Factory<T> = Arc<dyn Fn(&Map<String, Value>) -> Result<T, RegistryError> + Send + Sync>;

struct Entry<T> {
    app_scope: Option<String>,
    factory: Factory<T>,
}

/// A name -> constructor map for one [`RegistryKind`]. Generic over the
/// value a successful build produces (`Box<dyn Op>` for the op registry,
/// `Arc<dyn Llm>` for the LLM registry, and so on).
pub struct Registry<T> {
    kind: RegistryKind,
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T> Registry<T> {
    pub fn new(kind: RegistryKind) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a constructor under `name`. `app_scope`, when set, means the
    /// entry is only visible when it matches the process's `APP_NAME`
    /// environment variable; an empty scope is always visible.
    pub fn register<F>(&self, name: impl Into<String>, app_scope: Option<String>, factory: F)
    where
        F: Fn(&Map<String, Value>) -> Result<T, RegistryError> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.contains_key(&name) {
            tracing::warn!(kind = self.kind.label(), name = %name, "overwriting existing registry entry");
        }
        entries.insert(
            name,
            Entry {
                app_scope,
                factory: Arc::new(factory),
            },
        );
    }

    fn visible_names(&self, entries: &HashMap<String, Entry<T>>) -> Vec<String> {
        let app_name = std::env::var("APP_NAME").ok();
        entries
            .iter()
            .filter(|(_, entry)| match &entry.app_scope {
                None => true,
                Some(scope) => Some(scope.as_str()) == app_name.as_deref(),
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn lookup(&self, name: &str) -> Result<Factory<T>, RegistryError> {
        let entries = self.entries.read().expect("registry lock poisoned");
        let app_name = std::env::var("APP_NAME").ok();
        match entries.get(name) {
            Some(entry)
                if entry.app_scope.is_none() || entry.app_scope.as_deref() == app_name.as_deref() =>
            {
                Ok(entry.factory.clone())
            }
            _ => {
                let mut supported = self.visible_names(&entries);
                supported.sort();
                let suggestion = suggest(name, &supported);
                Err(RegistryError::NotFound {
                    kind: self.kind.label(),
                    name: name.to_string(),
                    supported,
                    suggestion,
                })
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_ok()
    }

    /// Build a fresh instance by looking up `name` and invoking its
    /// constructor with `params`.
    pub fn build(&self, name: &str, params: &Map<String, Value>) -> Result<T, RegistryError> {
        let factory = self.lookup(name)?;
        factory(params)
    }
}

fn suggest(name: &str, supported: &[String]) -> String {
    let closest = supported
        .iter()
        .map(|candidate| (candidate, strsim::levenshtein(name, candidate)))
        .min_by_key(|(_, distance)| *distance);

    match closest {
        Some((candidate, distance)) if distance <= 3 && !supported.is_empty() => {
            format!(" (did you mean '{candidate}'?)")
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_invokes_registered_factory() {
        let registry: Registry<i32> = Registry::new(RegistryKind::Op);
        registry.register("answer", None, |_| Ok(42));
        assert_eq!(registry.build("answer", &Map::new()).unwrap(), 42);
    }

    #[test]
    fn missing_name_reports_supported_and_suggestion() {
        let registry: Registry<i32> = Registry::new(RegistryKind::Op);
        registry.register("search_op", None, |_| Ok(1));
        let err = registry.build("serach_op", &Map::new()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("search_op"));
        assert!(message.contains("did you mean"));
    }

    #[test]
    fn app_scoped_entry_hidden_without_matching_app_name() {
        std::env::remove_var("APP_NAME");
        let registry: Registry<i32> = Registry::new(RegistryKind::Op);
        registry.register("scoped", Some("billing".to_string()), |_| Ok(7));
        assert!(registry.build("scoped", &Map::new()).is_err());
    }

    #[test]
    fn re_registering_overwrites() {
        let registry: Registry<i32> = Registry::new(RegistryKind::Op);
        registry.register("x", None, |_| Ok(1));
        registry.register("x", None, |_| Ok(2));
        assert_eq!(registry.build("x", &Map::new()).unwrap(), 2);
    }
}
