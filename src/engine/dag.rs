use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{DagSpec, DependencyGraph, NodeConfig};
use crate::engine::instrument::{run_instrumented, RunContext};
use crate::errors::ConfigError;
use crate::observability::messages::engine::{DagIncomplete, NodeSkipped};
use crate::observability::messages::StructuredLog;
use crate::payload::{DocumentPayload, Propagation, StepResult, ORCHESTRATOR_NAME};
use crate::traits::{Processor, ProcessorBuilder};

/// Sentinel key holding the root payload before any node has run.
const INITIAL_STEP: &str = "_initial_";

/// Executes a DAG of nodes in topological levels.
///
/// Levels come from Kahn's algorithm with lexical ordering inside each
/// level, so execution order is deterministic for identical configs. All
/// nodes of one level run concurrently under the run's semaphore; level
/// L+1 starts only after every node in level L has produced results. A node
/// whose declared dependency yielded zero payloads is skipped and recorded
/// as such; if that leaves configured nodes unexecuted, a synthetic
/// orchestrator failure marks the run as failed.
pub struct DagExecutor;

impl DagExecutor {
    pub async fn execute(
        dag: &DagSpec,
        builder: &dyn ProcessorBuilder,
        root: DocumentPayload,
        ctx: &RunContext,
    ) -> Result<Vec<StepResult>, ConfigError> {
        let levels = DependencyGraph::from_nodes(&dag.nodes)
            .kahn_levels()
            .map_err(ConfigError::Validation)?;

        let nodes_by_id: HashMap<&str, &NodeConfig> = dag
            .nodes
            .iter()
            .map(|node| (node.id.as_str(), node))
            .collect();

        // Build every processor up front: configuration errors must abort
        // the run before the first node executes.
        let mut processors: HashMap<String, Arc<dyn Processor>> = HashMap::new();
        for node in &dag.nodes {
            processors.insert(node.id.clone(), builder.create(&node.processor, &node.params)?);
        }

        let mut payloads_by_step: HashMap<String, Vec<DocumentPayload>> =
            HashMap::from([(INITIAL_STEP.to_string(), vec![root])]);
        let mut executed: HashSet<String> = HashSet::new();
        let mut all_results: Vec<StepResult> = Vec::new();

        for level in &levels {
            let mut handles: Vec<(String, DocumentPayload, JoinHandle<StepResult>)> = Vec::new();

            for node_id in level {
                let node = nodes_by_id[node_id.as_str()];

                let mut input_payloads: Vec<DocumentPayload> = Vec::new();
                let mut missing_dependency: Option<&str> = None;
                if node.dependencies.is_empty() {
                    input_payloads.extend(payloads_by_step[INITIAL_STEP].iter().cloned());
                } else {
                    for dependency in &node.dependencies {
                        match payloads_by_step
                            .get(dependency.as_str())
                            .filter(|payloads| !payloads.is_empty())
                        {
                            Some(payloads) => input_payloads.extend(payloads.iter().cloned()),
                            None => {
                                missing_dependency = Some(dependency);
                                break;
                            }
                        }
                    }
                }

                if let Some(dependency) = missing_dependency {
                    NodeSkipped {
                        node_id,
                        dependency,
                    }
                    .log();
                    all_results.push(StepResult::skipped(&node.processor));
                    continue;
                }

                executed.insert(node_id.clone());
                let processor = Arc::clone(&processors[node_id.as_str()]);
                for (payload_index, payload) in input_payloads.into_iter().enumerate() {
                    let processor = Arc::clone(&processor);
                    let step_ctx = ctx.step(format!("{node_id}_{payload_index}"));
                    let semaphore = Arc::clone(&ctx.semaphore);
                    let task_payload = payload.clone();
                    let handle = tokio::spawn(async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .expect("run semaphore closed");
                        run_instrumented(processor.as_ref(), &task_payload, &step_ctx).await
                    });
                    handles.push((node_id.clone(), payload, handle));
                }
            }

            for (node_id, input_payload, handle) in handles {
                let mut result = match handle.await {
                    Ok(result) => result,
                    Err(join_error) => StepResult::failure(
                        &nodes_by_id[node_id.as_str()].processor,
                        format!("worker task failed: {join_error}"),
                    ),
                };
                let propagation = std::mem::take(&mut result.propagation);
                all_results.push(result.clone());

                if !result.is_success() {
                    continue;
                }
                match propagation {
                    Propagation::FanOut { payloads } => {
                        payloads_by_step.entry(node_id).or_default().extend(payloads);
                    }
                    Propagation::Continue { image } => {
                        let next = input_payload.propagate(image, result);
                        payloads_by_step.entry(node_id).or_default().push(next);
                    }
                    Propagation::Terminal => {}
                }
            }
        }

        if executed.len() != dag.nodes.len() {
            DagIncomplete {
                executed: executed.len(),
                total: dag.nodes.len(),
            }
            .log();
            all_results.push(StepResult::failure(
                ORCHESTRATOR_NAME,
                "DAG execution incomplete: not all nodes were executed",
            ));
        }

        Ok(all_results)
    }
}
