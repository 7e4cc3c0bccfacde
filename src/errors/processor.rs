use thiserror::Error;

/// Failures raised inside a processor's `execute`.
///
/// These never escape the engine: the instrumentation wrapper converts every
/// variant into a failure `StepResult` for the branch that raised it.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("base64 decode failed: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("request to backend service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend service returned an unusable response: {0}")]
    BadResponse(String),

    #[error("pdf rendering failed: {0}")]
    Render(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
