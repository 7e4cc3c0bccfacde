use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::{ExecutionMode, PipelineRegistry};
use crate::engine::ProcessingPipeline;
use crate::errors::DispatchError;
use crate::jobs::StatusHub;
use crate::observability::messages::jobs::{JobCancelled, JobStateChanged, UploadStored};
use crate::observability::messages::StructuredLog;
use crate::payload::{DocumentPayload, DocumentProcessingResult, JobState};
use crate::ports::ObjectStore;
use crate::traits::ProcessorBuilder;

/// Engine input: one document, one named pipeline, one correlation id.
///
/// The correlation id doubles as the job id for deferred runs.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub pipeline_name: String,
    pub file_bytes: Vec<u8>,
    pub file_name: String,
    pub correlation_id: String,
}

/// What the dispatcher hands back: linear pipelines complete inline, DAG
/// pipelines are deferred behind a job id.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Box<DocumentProcessingResult>),
    Deferred { job_id: String },
}

/// Snapshot answer for a status query.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DocumentProcessingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct JobEntry {
    state: JobState,
    result: Option<DocumentProcessingResult>,
    error: Option<String>,
    cancel: CancellationToken,
}

/// Chooses in-process vs. background execution and tracks deferred jobs.
///
/// The raw upload is persisted to the object store before the run starts;
/// the resulting URL is logged but never returned. Job state follows
/// `in_progress -> (success | failed)`; terminal entries are cached and
/// idempotent to query.
pub struct JobDispatcher {
    registry: Arc<PipelineRegistry>,
    factory: Arc<dyn ProcessorBuilder>,
    store: Arc<dyn ObjectStore>,
    hub: Arc<StatusHub>,
    jobs: Arc<Mutex<HashMap<String, JobEntry>>>,
}

impl JobDispatcher {
    pub fn new(
        registry: Arc<PipelineRegistry>,
        factory: Arc<dyn ProcessorBuilder>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            registry,
            factory,
            store,
            hub: Arc::new(StatusHub::new()),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The pub/sub fabric carrying `job:<id>` status transitions.
    pub fn hub(&self) -> Arc<StatusHub> {
        Arc::clone(&self.hub)
    }

    /// Subscribe to the status transitions of one job.
    pub async fn subscribe(&self, job_id: &str) -> broadcast::Receiver<JobState> {
        self.hub.subscribe_job(job_id).await
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, DispatchError> {
        let descriptor = self
            .registry
            .get(&request.pipeline_name)
            .ok_or_else(|| DispatchError::UnknownPipeline(request.pipeline_name.clone()))?
            .clone();

        let job_id = request.correlation_id.clone();
        let document_id = format!("{:x}", md5::compute(&request.file_bytes));

        let key = format!("documents/{}_{}", document_id, request.file_name);
        let url = self
            .store
            .put(&key, &request.file_bytes, "application/octet-stream")
            .await?;
        UploadStored {
            job_id: &job_id,
            url: &url,
        }
        .log();

        // Descriptor validation happens here, before any step runs.
        let pipeline = ProcessingPipeline::new(descriptor.clone())?;

        let payload = DocumentPayload::root(
            job_id.clone(),
            request.file_name.clone(),
            request.file_bytes,
            document_id,
        );

        match descriptor.execution_mode {
            ExecutionMode::Linear => {
                self.transition(&job_id, JobState::InProgress).await;
                let result = pipeline
                    .run(
                        self.factory.as_ref(),
                        payload,
                        Some(self.hub()),
                        CancellationToken::new(),
                    )
                    .await;
                self.transition(&job_id, result.status).await;
                Ok(RunOutcome::Completed(Box::new(result)))
            }
            ExecutionMode::Dag => {
                let cancel = CancellationToken::new();
                {
                    let mut jobs = self.jobs.lock().await;
                    jobs.insert(
                        job_id.clone(),
                        JobEntry {
                            state: JobState::InProgress,
                            result: None,
                            error: None,
                            cancel: cancel.clone(),
                        },
                    );
                }
                self.transition(&job_id, JobState::InProgress).await;

                let factory = Arc::clone(&self.factory);
                let hub = self.hub();
                let jobs = Arc::clone(&self.jobs);
                let task_job_id = job_id.clone();
                let status_hub = self.hub();
                tokio::spawn(async move {
                    let result = pipeline
                        .run(factory.as_ref(), payload, Some(hub), cancel)
                        .await;

                    let state = result.status;
                    {
                        let mut jobs = jobs.lock().await;
                        if let Some(entry) = jobs.get_mut(&task_job_id) {
                            entry.state = state;
                            entry.error = result.error_message.clone();
                            entry.result = Some(result);
                        }
                    }
                    JobStateChanged {
                        job_id: &task_job_id,
                        state: state.as_str(),
                    }
                    .log();
                    status_hub.publish_job(&task_job_id, state).await;
                });

                Ok(RunOutcome::Deferred { job_id })
            }
        }
    }

    async fn transition(&self, job_id: &str, state: JobState) {
        JobStateChanged {
            job_id,
            state: state.as_str(),
        }
        .log();
        self.hub.publish_job(job_id, state).await;
    }

    /// Current state of a deferred job. Terminal answers are stable.
    pub async fn status(&self, job_id: &str) -> Result<JobStatusReport, DispatchError> {
        let jobs = self.jobs.lock().await;
        let entry = jobs
            .get(job_id)
            .ok_or_else(|| DispatchError::UnknownJob(job_id.to_string()))?;
        Ok(JobStatusReport {
            status: entry.state,
            result: entry.result.clone(),
            error: entry.error.clone(),
        })
    }

    /// Request cooperative cancellation of a deferred job. Idempotent; a
    /// job already in a terminal state is left untouched.
    pub async fn cancel(&self, job_id: &str) -> Result<(), DispatchError> {
        let jobs = self.jobs.lock().await;
        let entry = jobs
            .get(job_id)
            .ok_or_else(|| DispatchError::UnknownJob(job_id.to_string()))?;
        if !entry.state.is_terminal() {
            JobCancelled { job_id }.log();
            entry.cancel.cancel();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{MemoryObjectStore, StubOcrEngine, StubPdfRenderer, StubVlmClient};
    use crate::errors::{ConfigError, ProcessorError};
    use crate::payload::StepResult;
    use crate::processors::ProcessorFactory;
    use crate::traits::Processor;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::io::Cursor;
    use std::time::Duration;

    const LINEAR_PIPELINE: &str = r#"{
        "name": "scan",
        "description": "grayscale then ocr",
        "execution_mode": "linear",
        "pipeline": [
            { "name": "image_preprocessor", "params": { "steps": [ { "name": "to_grayscale" } ] } },
            { "name": "ocr_processor" }
        ]
    }"#;

    const DAG_PIPELINE: &str = r#"{
        "name": "analyze",
        "description": "single ocr node",
        "execution_mode": "dag",
        "pipeline": { "nodes": [
            { "id": "ocr", "processor": "ocr_processor" }
        ] }
    }"#;

    const SLEEPY_PIPELINE: &str = r#"{
        "name": "sleepy",
        "description": "single slow node",
        "execution_mode": "dag",
        "pipeline": { "nodes": [
            { "id": "nap", "processor": "sleepy" }
        ] }
    }"#;

    fn registry(files: &[(&str, &str)]) -> Arc<PipelineRegistry> {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let registry = PipelineRegistry::load_dir(dir.path()).unwrap();
        Arc::new(registry)
    }

    fn stub_factory() -> Arc<ProcessorFactory> {
        Arc::new(ProcessorFactory::new(
            Arc::new(StubPdfRenderer::new(2)),
            Arc::new(StubOcrEngine::new("text")),
            Arc::new(StubVlmClient::new("analysis", "report")),
        ))
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            2,
            2,
            image::Luma([255u8]),
        ));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn request(pipeline: &str, job: &str) -> RunRequest {
        RunRequest {
            pipeline_name: pipeline.to_string(),
            file_bytes: png_bytes(),
            file_name: "scan.png".to_string(),
            correlation_id: job.to_string(),
        }
    }

    #[tokio::test]
    async fn linear_runs_inline_and_persists_the_upload() {
        let store = Arc::new(MemoryObjectStore::new());
        let dispatcher = JobDispatcher::new(
            registry(&[("scan.json", LINEAR_PIPELINE)]),
            stub_factory(),
            store.clone(),
        );

        let outcome = dispatcher.run(request("scan", "job-lin")).await.unwrap();
        let result = match outcome {
            RunOutcome::Completed(result) => result,
            RunOutcome::Deferred { .. } => panic!("linear pipelines run inline"),
        };

        assert_eq!(result.status, JobState::Success);
        assert_eq!(result.results.len(), 2);

        let document_id = format!("{:x}", md5::compute(png_bytes()));
        assert!(store.contains(&format!("documents/{document_id}_scan.png")));
    }

    #[tokio::test]
    async fn dag_defers_and_publishes_one_message_per_transition() {
        let dispatcher = JobDispatcher::new(
            registry(&[("analyze.json", DAG_PIPELINE)]),
            stub_factory(),
            Arc::new(MemoryObjectStore::new()),
        );

        // The correlation id doubles as the job id, so subscribing before
        // dispatch observes every transition.
        let mut updates = dispatcher.subscribe("job-dag").await;

        let outcome = dispatcher.run(request("analyze", "job-dag")).await.unwrap();
        let job_id = match outcome {
            RunOutcome::Deferred { job_id } => job_id,
            RunOutcome::Completed(_) => panic!("dag pipelines are deferred"),
        };
        assert_eq!(job_id, "job-dag");

        let first = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, JobState::InProgress);
        assert_eq!(second, JobState::Success);
        assert!(second.is_terminal());

        let report = dispatcher.status("job-dag").await.unwrap();
        assert_eq!(report.status, JobState::Success);
        let result = report.result.unwrap();
        assert_eq!(result.results.len(), 1);
        assert!(report.error.is_none());

        // Terminal answers are stable.
        let again = dispatcher.status("job-dag").await.unwrap();
        assert_eq!(again.status, JobState::Success);
    }

    #[tokio::test]
    async fn unknown_pipeline_is_a_dispatch_error() {
        let dispatcher = JobDispatcher::new(
            registry(&[("scan.json", LINEAR_PIPELINE)]),
            stub_factory(),
            Arc::new(MemoryObjectStore::new()),
        );

        let error = dispatcher.run(request("ghost", "job-x")).await.unwrap_err();
        assert!(matches!(error, DispatchError::UnknownPipeline(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn unknown_job_is_a_dispatch_error() {
        let dispatcher = JobDispatcher::new(
            registry(&[("scan.json", LINEAR_PIPELINE)]),
            stub_factory(),
            Arc::new(MemoryObjectStore::new()),
        );

        assert!(matches!(
            dispatcher.status("missing").await.unwrap_err(),
            DispatchError::UnknownJob(_)
        ));
        assert!(matches!(
            dispatcher.cancel("missing").await.unwrap_err(),
            DispatchError::UnknownJob(_)
        ));
    }

    struct SleepyProcessor;

    #[async_trait]
    impl Processor for SleepyProcessor {
        fn name(&self) -> &'static str {
            "sleepy"
        }

        async fn execute(&self, _: &DocumentPayload) -> Result<StepResult, ProcessorError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(StepResult::success("sleepy"))
        }
    }

    struct SleepyBuilder;

    impl ProcessorBuilder for SleepyBuilder {
        fn create(
            &self,
            _name: &str,
            _params: &Map<String, Value>,
        ) -> Result<Arc<dyn Processor>, ConfigError> {
            Ok(Arc::new(SleepyProcessor))
        }
    }

    #[tokio::test]
    async fn cancelling_a_deferred_job_fails_it_promptly() {
        let dispatcher = JobDispatcher::new(
            registry(&[("sleepy.json", SLEEPY_PIPELINE)]),
            Arc::new(SleepyBuilder),
            Arc::new(MemoryObjectStore::new()),
        );

        let mut updates = dispatcher.subscribe("job-cancel").await;
        dispatcher.run(request("sleepy", "job-cancel")).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, JobState::InProgress);

        dispatcher.cancel("job-cancel").await.unwrap();

        let terminal = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(terminal, JobState::Failed);

        let report = dispatcher.status("job-cancel").await.unwrap();
        assert_eq!(report.status, JobState::Failed);
        assert_eq!(report.error.as_deref(), Some("cancelled"));
    }
}
