//! Error types for graph construction and resolution.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised while building a graph or resolving against one.
///
/// Structural variants (`NoActions`, `DuplicateAction`, `ActionNotFound`,
/// `RedundantTransition`) only ever come out of `GraphBuilder::build`. The rest
/// are runtime failures reported by the resolution API.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The graph has no actions at all.
    #[error("at least one action required")]
    NoActions,

    /// Two actions were registered under the same name.
    #[error("duplicated action name: {name}")]
    DuplicateAction { name: String },

    /// A transition references an action that was never declared.
    #[error("{name} not found (transition {from} -> {to})")]
    ActionNotFound {
        name: String,
        from: String,
        to: String,
    },

    /// A transition follows a default transition from the same source.
    #[error("redundant transition {from} -> {to}: {from} already has a default transition")]
    RedundantTransition { from: String, to: String },

    /// The requested entrypoint is not an action of this graph.
    #[error("entrypoint not found: {name}")]
    EntrypointNotFound { name: String },

    /// The current action is unknown to this graph.
    #[error("current action not found: {name}")]
    UnknownCurrentAction { name: String },

    /// None of the transitions out of the current action matched the state.
    #[error("no satisfying transition from {from}")]
    NoSatisfyingTransition { from: String },

    /// No action carries the requested tag.
    #[error("tag not found: {tag}")]
    TagNotFound { tag: String },

    /// A transition condition failed to evaluate.
    #[error("condition error: {0}")]
    Condition(#[from] ConditionError),
}

/// Errors raised when compiling or evaluating a condition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    /// The expression source is not valid.
    #[error("invalid expression {expr:?} at offset {offset}: {message}")]
    Parse {
        expr: String,
        offset: usize,
        message: String,
    },

    /// The expression references a key absent from the state.
    #[error("state key not found: {key}")]
    MissingKey { key: String },

    /// An operator was applied to operands it does not support.
    #[error("type mismatch: cannot apply {op} to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Arithmetic produced a value outside the representable number range.
    #[error("numeric overflow in {op}")]
    Overflow { op: &'static str },
}

/// Errors raised by an action's `run` or `update`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    /// A field the action reads is absent from the state.
    #[error("state field not found: {field}")]
    MissingField { field: String },

    /// A declared runtime input was not supplied.
    #[error("missing runtime input: {input}")]
    MissingInput { input: String },

    /// The state holds a value of the wrong shape for the operation.
    #[error("invalid value for {key}: expected {expected}")]
    InvalidValue { key: String, expected: &'static str },

    /// The action failed for its own reasons.
    #[error("action failed: {0}")]
    Failed(String),
}

/// Errors raised when loading a graph description.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the description file failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON description could not be parsed.
    #[error("invalid json description: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML description could not be parsed.
    #[error("invalid toml description: {0}")]
    Toml(#[from] toml::de::Error),

    /// The file extension does not name a supported format.
    #[error("unsupported description format: {} (expected .json or .toml)", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// A transition condition string failed to compile.
    #[error("transition {from} -> {to}: {source}")]
    Condition {
        from: String,
        to: String,
        #[source]
        source: ConditionError,
    },

    /// The described graph is structurally invalid.
    #[error(transparent)]
    Graph(#[from] GraphError),
}
