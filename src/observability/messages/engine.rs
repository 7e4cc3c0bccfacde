//! Message types for pipeline and executor lifecycle events.

use std::fmt::{Display, Formatter};

use crate::observability::messages::StructuredLog;

/// A pipeline run started.
pub struct PipelineStarted<'a> {
    pub pipeline: &'a str,
    pub job_id: &'a str,
    pub mode: &'a str,
}

impl Display for PipelineStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "pipeline '{}' started: job_id={} mode={}",
            self.pipeline, self.job_id, self.mode
        )
    }
}

impl StructuredLog for PipelineStarted<'_> {
    fn log(&self) {
        tracing::info!(
            pipeline = self.pipeline,
            job_id = self.job_id,
            mode = self.mode,
            "{}", self
        );
    }
}

/// A pipeline run finished (in either terminal state).
pub struct PipelineFinished<'a> {
    pub pipeline: &'a str,
    pub job_id: &'a str,
    pub status: &'a str,
    pub duration_ms: u64,
}

impl Display for PipelineFinished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "pipeline '{}' finished: status={} duration={}ms",
            self.pipeline, self.status, self.duration_ms
        )
    }
}

impl StructuredLog for PipelineFinished<'_> {
    fn log(&self) {
        tracing::info!(
            pipeline = self.pipeline,
            job_id = self.job_id,
            status = self.status,
            duration_ms = self.duration_ms,
            "{}", self
        );
    }
}

/// A linear step is about to launch over its current payload set.
pub struct StepBatchStarted<'a> {
    pub step: usize,
    pub processor: &'a str,
    pub payload_count: usize,
}

impl Display for StepBatchStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "step {} ({}) started over {} payload(s)",
            self.step, self.processor, self.payload_count
        )
    }
}

impl StructuredLog for StepBatchStarted<'_> {
    fn log(&self) {
        tracing::info!(
            step = self.step,
            processor = self.processor,
            payload_count = self.payload_count,
            "{}", self
        );
    }
}

/// A step fanned out into child payloads.
pub struct FanOutDetected<'a> {
    pub processor: &'a str,
    pub children: usize,
}

impl Display for FanOutDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "processor '{}' fanned out into {} child payload(s)",
            self.processor, self.children
        )
    }
}

impl StructuredLog for FanOutDetected<'_> {
    fn log(&self) {
        tracing::info!(processor = self.processor, children = self.children, "{}", self);
    }
}

/// More than one fan-out appeared in a single step; only the first counts.
pub struct ExtraFanOutIgnored<'a> {
    pub processor: &'a str,
}

impl Display for ExtraFanOutIgnored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "ignoring additional fan-out from processor '{}': only the first fan-out in a step is honored",
            self.processor
        )
    }
}

impl StructuredLog for ExtraFanOutIgnored<'_> {
    fn log(&self) {
        tracing::warn!(processor = self.processor, "{}", self);
    }
}

/// The payload set emptied before the last step.
pub struct RunTerminatedEarly {
    pub after_step: usize,
}

impl Display for RunTerminatedEarly {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "no further payloads to process after step {}; terminating run early",
            self.after_step
        )
    }
}

impl StructuredLog for RunTerminatedEarly {
    fn log(&self) {
        tracing::info!(after_step = self.after_step, "{}", self);
    }
}

/// A DAG node was skipped because a dependency yielded no payloads.
pub struct NodeSkipped<'a> {
    pub node_id: &'a str,
    pub dependency: &'a str,
}

impl Display for NodeSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "skipping node '{}': dependency '{}' produced no payloads",
            self.node_id, self.dependency
        )
    }
}

impl StructuredLog for NodeSkipped<'_> {
    fn log(&self) {
        tracing::warn!(node_id = self.node_id, dependency = self.dependency, "{}", self);
    }
}

/// Not every configured DAG node executed.
pub struct DagIncomplete {
    pub executed: usize,
    pub total: usize,
}

impl Display for DagIncomplete {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "DAG execution incomplete: {} of {} nodes executed",
            self.executed, self.total
        )
    }
}

impl StructuredLog for DagIncomplete {
    fn log(&self) {
        tracing::error!(executed = self.executed, total = self.total, "{}", self);
    }
}
