use thiserror::Error;

/// Errors that can occur during pipeline descriptor validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A circular dependency was detected in the node graph.
    #[error("cyclic dependency detected involving nodes: {}", .members.join(", "))]
    CyclicDependency {
        /// Nodes that could not be scheduled because they sit on a cycle.
        members: Vec<String>,
    },
    /// A node references a dependency that doesn't exist.
    #[error("node '{node_id}' depends on '{missing_dependency}' which does not exist")]
    UnresolvedDependency {
        node_id: String,
        missing_dependency: String,
    },
    /// Two nodes share the same id.
    #[error("duplicate node id: '{node_id}'")]
    DuplicateNodeId { node_id: String },
    /// The `pipeline` section does not match the declared `execution_mode`.
    #[error("execution_mode is '{mode}' but the pipeline section is shaped for '{found}'")]
    ModeMismatch {
        mode: &'static str,
        found: &'static str,
    },
    /// The pipeline declares no steps or nodes.
    #[error("pipeline '{pipeline}' declares no steps")]
    EmptyPipeline { pipeline: String },
    /// `max_concurrency` must be at least 1.
    #[error("max_concurrency must be >= 1, got {value}")]
    InvalidConcurrency { value: usize },
}

/// Configuration-level failures: these abort a run before any step executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown processor '{name}'; known processors: [{}]", .known.join(", "))]
    UnknownProcessor { name: String, known: Vec<String> },

    #[error("invalid parameters for processor '{processor}': {message}")]
    InvalidParams {
        processor: &'static str,
        message: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to read pipeline config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse pipeline config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
