pub mod engine;
pub mod jobs;
pub mod processor;

/// Emits this message as a `tracing` event with structured fields.
pub trait StructuredLog {
    fn log(&self);
}
