use thiserror::Error;

use crate::errors::ConfigError;

/// Failures from the object store used to persist the raw upload.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors surfaced at the dispatcher boundary before a run starts.
///
/// Everything after that boundary is converted to data: either failure
/// `StepResult`s or a failed `DocumentProcessingResult`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("pipeline '{0}' not found")]
    UnknownPipeline(String),

    #[error("no job with id '{0}'")]
    UnknownJob(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to persist upload: {0}")]
    Storage(#[from] StorageError),
}
