use std::env;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use docuflow::backends::stub::{StubOcrEngine, StubPdfRenderer, StubVlmClient};
use docuflow::backends::FsObjectStore;
use docuflow::config::PipelineRegistry;
use docuflow::jobs::{JobDispatcher, RunOutcome, RunRequest};
use docuflow::payload::JobState;
use docuflow::processors::ProcessorFactory;

/// Demo driver: load a pipeline directory, run one pipeline over one file,
/// and print the aggregated result. External collaborators are wired with
/// the in-process stubs so the demo runs without a pdfium install or live
/// OCR/VLM backends.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(error) = run().await {
        eprintln!("error: {error:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: {} <pipeline-dir> <pipeline-name> <input-file>", args[0]);
        eprintln!("Example: {} pipelines scan_ocr ./scan.png", args[0]);
        process::exit(1);
    }
    let (pipeline_dir, pipeline_name, input_file) = (&args[1], &args[2], &args[3]);

    let registry = PipelineRegistry::load_dir(pipeline_dir)
        .with_context(|| format!("loading pipeline configs from {pipeline_dir}"))?;
    println!("Loaded pipelines: {:?}", registry.names());

    let factory = ProcessorFactory::new(
        Arc::new(StubPdfRenderer::new(3)),
        Arc::new(StubOcrEngine::new("")),
        Arc::new(StubVlmClient::new("a scanned document page", "document")),
    );
    let store = FsObjectStore::new(env::temp_dir().join("docuflow-objects"));
    let dispatcher = JobDispatcher::new(Arc::new(registry), Arc::new(factory), Arc::new(store));

    let file_bytes = tokio::fs::read(input_file)
        .await
        .with_context(|| format!("reading {input_file}"))?;
    let file_name = std::path::Path::new(input_file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input_file.clone());

    let correlation_id = format!("cli-{}", process::id());
    // The correlation id doubles as the job id, so we can attach to the
    // status stream before dispatching and never miss a transition.
    let mut updates = dispatcher.subscribe(&correlation_id).await;

    let request = RunRequest {
        pipeline_name: pipeline_name.clone(),
        file_bytes,
        file_name,
        correlation_id,
    };

    match dispatcher.run(request).await? {
        RunOutcome::Completed(result) => {
            println!("Run finished: {}", result.status.as_str());
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        RunOutcome::Deferred { job_id } => {
            println!("Deferred as job {job_id}; waiting for completion...");
            while let Ok(state) = updates.recv().await {
                println!("  status: {}", state.as_str());
                if state.is_terminal() {
                    break;
                }
            }
            let report = dispatcher.status(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status == JobState::Failed {
                process::exit(2);
            }
        }
    }

    Ok(())
}
