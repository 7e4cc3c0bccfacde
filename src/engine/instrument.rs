use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

use crate::jobs::{StatusHub, StepEvent};
use crate::observability::messages::processor::{
    StepFailed, StepFinished, StepStarted, StepTimedOut,
};
use crate::observability::messages::StructuredLog;
use crate::payload::{DocumentPayload, StepResult};
use crate::traits::Processor;

/// Shared context for one pipeline run.
#[derive(Clone)]
pub struct RunContext {
    pub job_id: String,
    pub hub: Option<Arc<StatusHub>>,
    pub cancel: CancellationToken,
    /// Bounds simultaneously-running processor executions; the only mutable
    /// shared object on the run's hot path.
    pub semaphore: Arc<Semaphore>,
}

impl RunContext {
    pub fn new(
        job_id: impl Into<String>,
        hub: Option<Arc<StatusHub>>,
        cancel: CancellationToken,
        max_concurrency: usize,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            hub,
            cancel,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub fn step(&self, step_id: String) -> StepContext {
        StepContext {
            step_id,
            job_id: self.job_id.clone(),
            hub: self.hub.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Context for one wrapped processor invocation.
pub struct StepContext {
    pub step_id: String,
    pub job_id: String,
    pub hub: Option<Arc<StatusHub>>,
    pub cancel: CancellationToken,
}

impl StepContext {
    /// Context for invocations outside a run's scheduling scope, e.g. the
    /// inner steps of a composite processor. Cancellation still propagates:
    /// dropping the composite's future drops its inner futures.
    pub fn detached(step_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            job_id: job_id.into(),
            hub: None,
            cancel: CancellationToken::new(),
        }
    }
}

enum Outcome {
    Done(Result<StepResult, crate::errors::ProcessorError>),
    TimedOut(Duration),
    Cancelled,
}

/// The single dispatch point for processor executions.
///
/// Binds the invocation context into a tracing span, races `execute`
/// against cancellation and the processor's declared timeout, converts
/// every error into a failure `StepResult`, stamps timing and lineage
/// metadata, and publishes a step event when a status hub is attached.
/// This is the only place failures are materialized; nothing a processor
/// raises propagates past it.
pub async fn run_instrumented(
    processor: &dyn Processor,
    payload: &DocumentPayload,
    ctx: &StepContext,
) -> StepResult {
    let span = tracing::info_span!(
        "step",
        processor = processor.name(),
        job_id = %ctx.job_id,
        step_id = %ctx.step_id,
        page_number = ?payload.page_number,
        parent_document_id = ?payload.parent_document_id,
    );
    run_inner(processor, payload, ctx).instrument(span).await
}

async fn run_inner(
    processor: &dyn Processor,
    payload: &DocumentPayload,
    ctx: &StepContext,
) -> StepResult {
    let name = processor.name();
    StepStarted {
        processor: name,
        step_id: &ctx.step_id,
    }
    .log();

    let started = Instant::now();
    let outcome = match processor.timeout() {
        Some(limit) => tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Outcome::Cancelled,
            result = tokio::time::timeout(limit, processor.execute(payload)) => match result {
                Ok(inner) => Outcome::Done(inner),
                Err(_) => Outcome::TimedOut(limit),
            },
        },
        None => tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Outcome::Cancelled,
            inner = processor.execute(payload) => Outcome::Done(inner),
        },
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    let mut result = match outcome {
        Outcome::Done(Ok(result)) => {
            StepFinished {
                processor: name,
                step_id: &ctx.step_id,
                status: result.status.as_str(),
                duration_ms,
            }
            .log();
            result
        }
        Outcome::Done(Err(error)) => {
            let message = format!("an unexpected error occurred in {name}: {error}");
            StepFailed {
                processor: name,
                step_id: &ctx.step_id,
                error: &message,
                duration_ms,
            }
            .log();
            StepResult::failure(name, message)
        }
        Outcome::TimedOut(limit) => {
            StepTimedOut {
                processor: name,
                step_id: &ctx.step_id,
                limit_ms: limit.as_millis() as u64,
            }
            .log();
            StepResult::failure(name, format!("timed out after {}ms", limit.as_millis()))
        }
        Outcome::Cancelled => StepResult::failure(name, "cancelled"),
    };

    result.metadata.page_number = payload.page_number;
    result.metadata.parent_document_id = payload.parent_document_id.clone();
    result.metadata.execution_time_ms = Some(duration_ms);

    if let Some(hub) = &ctx.hub {
        hub.publish_step(
            &ctx.job_id,
            StepEvent {
                step_id: ctx.step_id.clone(),
                processor: result.processor_name.clone(),
                status: result.status,
            },
        )
        .await;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProcessorError;
    use crate::payload::StepStatus;
    use async_trait::async_trait;

    struct Panicky;

    #[async_trait]
    impl Processor for Panicky {
        fn name(&self) -> &'static str {
            "panicky"
        }

        async fn execute(&self, _: &DocumentPayload) -> Result<StepResult, ProcessorError> {
            Err(ProcessorError::InvalidInput("boom".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl Processor for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_millis(20))
        }

        async fn execute(&self, _: &DocumentPayload) -> Result<StepResult, ProcessorError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(StepResult::success("slow"))
        }
    }

    fn payload() -> DocumentPayload {
        let mut p = DocumentPayload::root("job-1", "f.png", vec![1], "doc");
        p.page_number = Some(7);
        p.parent_document_id = Some("parent".to_string());
        p
    }

    #[tokio::test]
    async fn errors_become_failure_results_with_context() {
        let ctx = StepContext::detached("0_root", "job-1");
        let result = run_instrumented(&Panicky, &payload(), &ctx).await;

        assert_eq!(result.status, StepStatus::Failure);
        assert!(result.error_message.unwrap().contains("boom"));
        assert_eq!(result.metadata.page_number, Some(7));
        assert_eq!(result.metadata.parent_document_id.as_deref(), Some("parent"));
        assert!(result.metadata.execution_time_ms.is_some());
    }

    #[tokio::test]
    async fn timeout_is_a_failure() {
        let ctx = StepContext::detached("0_root", "job-1");
        let result = run_instrumented(&Slow, &payload(), &ctx).await;

        assert_eq!(result.status, StepStatus::Failure);
        assert!(result.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_yields_a_cancelled_failure() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = StepContext {
            step_id: "0_root".to_string(),
            job_id: "job-1".to_string(),
            hub: None,
            cancel: token,
        };

        let result = run_instrumented(&Slow, &payload(), &ctx).await;
        assert_eq!(result.status, StepStatus::Failure);
        assert_eq!(result.error_message.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn step_events_are_published_when_a_hub_is_attached() {
        let hub = Arc::new(StatusHub::new());
        let mut rx = hub.subscribe_steps("job-1").await;
        let ctx = StepContext {
            step_id: "0_root".to_string(),
            job_id: "job-1".to_string(),
            hub: Some(hub.clone()),
            cancel: CancellationToken::new(),
        };

        let _ = run_instrumented(&Panicky, &payload(), &ctx).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.step_id, "0_root");
        assert_eq!(event.processor, "panicky");
        assert_eq!(event.status, StepStatus::Failure);
    }
}
