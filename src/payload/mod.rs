mod payload;
mod result;

pub use payload::{DocumentPayload, PayloadKey};
pub use result::{
    AggregatedDocument, DocumentProcessingResult, JobState, PageResults, Propagation,
    StepMetadata, StepResult, StepStatus, ORCHESTRATOR_NAME,
};
