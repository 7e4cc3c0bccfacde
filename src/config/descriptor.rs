use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default bound on simultaneously-running processor executions in one run.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// A validated pipeline configuration, loaded from a JSON file.
///
/// # Example
/// ```json
/// {
///   "name": "scan_ocr",
///   "description": "Grayscale + binarize, then OCR",
///   "execution_mode": "linear",
///   "max_concurrency": 4,
///   "pipeline": [
///     { "name": "image_preprocessor",
///       "params": { "steps": [ { "name": "to_grayscale" } ] } },
///     { "name": "ocr_processor" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    pub name: String,
    pub description: String,
    pub execution_mode: ExecutionMode,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    pub pipeline: PipelineSpec,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

/// How the pipeline's steps are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Ordered list of steps with fan-out; runs in the caller's context.
    Linear,
    /// Directed acyclic graph executed in topological levels; deferred to a
    /// background job.
    Dag,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Linear => "linear",
            ExecutionMode::Dag => "dag",
        }
    }
}

/// The `pipeline` section: a step list (linear) or a node set (dag).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineSpec {
    Linear(Vec<StepConfig>),
    Dag(DagSpec),
}

/// One step of a linear pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Node set of a DAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagSpec {
    pub nodes: Vec<NodeConfig>,
}

/// One node of a DAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub processor: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}
