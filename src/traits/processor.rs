use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::{ConfigError, ProcessorError};
use crate::payload::{DocumentPayload, StepResult};

/// A named, configurable pipeline step.
///
/// Processors validate their configuration at construction (the factory
/// surfaces that as a `ConfigError` before any step runs) and must not
/// mutate the payload they are handed. `execute` is never called directly
/// by executors: every invocation goes through the instrumentation wrapper,
/// which owns timing, timeout, cancellation, and failure capture.
#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Wall-clock budget for one invocation. `None` means unbounded
    /// (CPU-only processors); network-backed processors override this.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn execute(&self, payload: &DocumentPayload) -> Result<StepResult, ProcessorError>;
}

impl fmt::Debug for dyn Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor").field("name", &self.name()).finish()
    }
}

/// Handle for building processors by name.
///
/// This is the only surface executors and composite processors see; it
/// exposes `create` and nothing else, so a composite sub-pipeline can build
/// its inner processors without a reference cycle back to the full factory.
pub trait ProcessorBuilder: Send + Sync {
    fn create(
        &self,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<Arc<dyn Processor>, ConfigError>;
}
