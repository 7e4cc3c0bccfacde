use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::{validate_descriptor, ExecutionMode, PipelineDescriptor, PipelineSpec};
use crate::engine::aggregate::aggregate_results;
use crate::engine::dag::DagExecutor;
use crate::engine::instrument::RunContext;
use crate::engine::linear::LinearExecutor;
use crate::errors::ConfigError;
use crate::jobs::StatusHub;
use crate::observability::messages::engine::{PipelineFinished, PipelineStarted};
use crate::observability::messages::StructuredLog;
use crate::payload::{DocumentPayload, DocumentProcessingResult, JobState, StepStatus};
use crate::traits::ProcessorBuilder;

/// Front door for one pipeline run.
///
/// Owns the execution-mode dispatch, result aggregation, and run-level
/// status. A run consumes exactly one root payload and produces exactly one
/// `DocumentProcessingResult`; no error escapes `run` as anything other
/// than a failed result.
#[derive(Debug)]
pub struct ProcessingPipeline {
    descriptor: PipelineDescriptor,
}

impl ProcessingPipeline {
    /// Validates the descriptor; an invalid one never reaches execution.
    pub fn new(descriptor: PipelineDescriptor) -> Result<Self, ConfigError> {
        validate_descriptor(&descriptor).map_err(|errors| {
            ConfigError::Validation(errors.into_iter().next().expect("non-empty error list"))
        })?;
        Ok(Self { descriptor })
    }

    pub fn descriptor(&self) -> &PipelineDescriptor {
        &self.descriptor
    }

    pub async fn run(
        &self,
        builder: &dyn ProcessorBuilder,
        payload: DocumentPayload,
        hub: Option<Arc<StatusHub>>,
        cancel: CancellationToken,
    ) -> DocumentProcessingResult {
        let job_id = payload.job_id.clone();
        let document_id = payload.document_id.clone();

        PipelineStarted {
            pipeline: &self.descriptor.name,
            job_id: &job_id,
            mode: self.descriptor.execution_mode.as_str(),
        }
        .log();
        let started = Instant::now();

        let ctx = RunContext::new(
            job_id.clone(),
            hub,
            cancel.clone(),
            self.descriptor.max_concurrency,
        );

        let outcome = match (&self.descriptor.execution_mode, &self.descriptor.pipeline) {
            (ExecutionMode::Linear, PipelineSpec::Linear(steps)) => {
                LinearExecutor::execute(steps, builder, payload, &ctx).await
            }
            (ExecutionMode::Dag, PipelineSpec::Dag(dag)) => {
                DagExecutor::execute(dag, builder, payload, &ctx).await
            }
            // Ruled out by construction-time validation.
            _ => Err(ConfigError::Validation(
                crate::errors::ValidationError::ModeMismatch {
                    mode: self.descriptor.execution_mode.as_str(),
                    found: match &self.descriptor.pipeline {
                        PipelineSpec::Linear(_) => "linear",
                        PipelineSpec::Dag(_) => "dag",
                    },
                },
            )),
        };

        let mut final_result = match outcome {
            Ok(results) => {
                let aggregated = aggregate_results(&results, &document_id);
                let status = if aggregated.status == StepStatus::Failure {
                    JobState::Failed
                } else {
                    JobState::Success
                };
                DocumentProcessingResult {
                    job_id: job_id.clone(),
                    status,
                    error_message: aggregated.error_message.clone(),
                    results,
                    final_output: Some(aggregated),
                }
            }
            Err(error) => DocumentProcessingResult {
                job_id: job_id.clone(),
                status: JobState::Failed,
                error_message: Some(format!("pipeline execution failed: {error}")),
                results: Vec::new(),
                final_output: None,
            },
        };

        // Completed results are preserved, but a cancelled run is failed.
        if cancel.is_cancelled() {
            final_result.status = JobState::Failed;
            final_result.error_message = Some("cancelled".to_string());
        }

        PipelineFinished {
            pipeline: &self.descriptor.name,
            job_id: &job_id,
            status: final_result.status.as_str(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .log();

        final_result
    }
}
