mod dependency_graph;
mod descriptor;
mod loader;
mod validation;

pub use dependency_graph::DependencyGraph;
pub use descriptor::{
    DagSpec, ExecutionMode, NodeConfig, PipelineDescriptor, PipelineSpec, StepConfig,
    DEFAULT_MAX_CONCURRENCY,
};
pub use loader::PipelineRegistry;
pub use validation::validate_descriptor;
