//! Message types for individual processor executions.

use std::fmt::{Display, Formatter};

use crate::observability::messages::StructuredLog;

/// A wrapped processor execution began.
pub struct StepStarted<'a> {
    pub processor: &'a str,
    pub step_id: &'a str,
}

impl Display for StepStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "step '{}' ({}) started", self.step_id, self.processor)
    }
}

impl StructuredLog for StepStarted<'_> {
    fn log(&self) {
        tracing::info!(processor = self.processor, step_id = self.step_id, "{}", self);
    }
}

/// A wrapped processor execution completed with a result.
pub struct StepFinished<'a> {
    pub processor: &'a str,
    pub step_id: &'a str,
    pub status: &'a str,
    pub duration_ms: u64,
}

impl Display for StepFinished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "step '{}' ({}) finished: status={} duration={}ms",
            self.step_id, self.processor, self.status, self.duration_ms
        )
    }
}

impl StructuredLog for StepFinished<'_> {
    fn log(&self) {
        tracing::info!(
            processor = self.processor,
            step_id = self.step_id,
            status = self.status,
            duration_ms = self.duration_ms,
            "{}", self
        );
    }
}

/// A processor raised an error; the wrapper converted it to a failure result.
pub struct StepFailed<'a> {
    pub processor: &'a str,
    pub step_id: &'a str,
    pub error: &'a str,
    pub duration_ms: u64,
}

impl Display for StepFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "step '{}' ({}) failed after {}ms: {}",
            self.step_id, self.processor, self.duration_ms, self.error
        )
    }
}

impl StructuredLog for StepFailed<'_> {
    fn log(&self) {
        tracing::error!(
            processor = self.processor,
            step_id = self.step_id,
            error = self.error,
            duration_ms = self.duration_ms,
            "{}", self
        );
    }
}

/// A processor exceeded its wall-clock budget.
pub struct StepTimedOut<'a> {
    pub processor: &'a str,
    pub step_id: &'a str,
    pub limit_ms: u64,
}

impl Display for StepTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "step '{}' ({}) timed out after {}ms",
            self.step_id, self.processor, self.limit_ms
        )
    }
}

impl StructuredLog for StepTimedOut<'_> {
    fn log(&self) {
        tracing::error!(
            processor = self.processor,
            step_id = self.step_id,
            limit_ms = self.limit_ms,
            "{}", self
        );
    }
}

/// An instrumented image sub-step completed.
pub struct SubStepCompleted<'a> {
    pub op: &'a str,
    pub duration_ms: u64,
    pub input_hash: &'a str,
    pub output_hash: &'a str,
}

impl Display for SubStepCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "sub-step '{}' completed in {}ms ({} -> {})",
            self.op, self.duration_ms, self.input_hash, self.output_hash
        )
    }
}

impl StructuredLog for SubStepCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            op = self.op,
            duration_ms = self.duration_ms,
            input_hash = self.input_hash,
            output_hash = self.output_hash,
            "{}", self
        );
    }
}
