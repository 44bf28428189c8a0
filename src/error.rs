use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error raised by a [`crate::registry::Registry`] lookup or registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind}: '{name}' not found; supported={supported:?}{suggestion}")]
    NotFound {
        kind: &'static str,
        name: String,
        supported: Vec<String>,
        suggestion: String,
    },

    #[error("{kind}: constructor for '{name}' failed: {source}")]
    ConstructorFailed {
        kind: &'static str,
        name: String,
        #[source]
        source: BoxError,
    },
}

/// Error raised while tokenizing or parsing the operator expression language.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected token '{0}' at position {1}")]
    UnexpectedToken(String, usize),

    #[error("expected identifier or '(' at position {0}")]
    ExpectedPrimary(usize),

    #[error("expected ')' at position {0}")]
    ExpectedCloseParen(usize),

    #[error("expected an expression after '=' in assignment '{0}'")]
    ExpectedAssignmentValue(String),

    #[error("empty expression")]
    Empty,

    #[error("a program needs a final expression line")]
    MissingFinalExpression,
}

/// Error raised while running a single operation.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("{op}: missing required input '{key}'")]
    MissingInput { op: String, key: String },

    #[error("{op}: composing with '{other}' mixes sync and async operations")]
    ModeMismatch { op: String, other: String },

    #[error("{op}: `<<` is not supported")]
    AttachUnsupported { op: String },

    #[error("{op}: execution failed: {source}")]
    Failed { op: String, #[source] source: BoxError },

    #[error("{task}: sub-task join failed: {source}")]
    Join { task: String, #[source] source: BoxError },

    #[error("{task}: timed out after {elapsed:?}")]
    Timeout { task: String, elapsed: Duration },

    #[error("operation '{0}' is not tool-capable")]
    NotToolCapable(String),
}

/// Error raised by the expression-to-operation-tree compiler.
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("operation '{0}' is not registered for this expression")]
    UnknownOperation(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Op(#[from] OpError),
}

/// Error raised by a [`crate::flow::Flow`] invocation.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Op(#[from] OpError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("flow '{0}' not found")]
    NotFound(String),
}

/// Error raised at the service boundary (config, HTTP adapter, tool adapter).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
