//! Pipeline execution: instrumentation wrapper, linear and DAG executors,
//! result aggregation, and the `ProcessingPipeline` front door.

pub mod aggregate;
pub mod dag;
pub mod instrument;
pub mod linear;
pub mod pipeline;


pub use aggregate::aggregate_results;
pub use dag::DagExecutor;
pub use instrument::{run_instrumented, RunContext, StepContext};
pub use linear::LinearExecutor;
pub use pipeline::ProcessingPipeline;
