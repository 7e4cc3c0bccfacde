use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::StepConfig;
use crate::engine::instrument::{run_instrumented, RunContext};
use crate::errors::ConfigError;
use crate::observability::messages::engine::{
    ExtraFanOutIgnored, FanOutDetected, RunTerminatedEarly, StepBatchStarted,
};
use crate::observability::messages::StructuredLog;
use crate::payload::{DocumentPayload, PayloadKey, Propagation, StepResult};
use crate::traits::{Processor, ProcessorBuilder};

/// Executes an ordered list of steps with fan-out support.
///
/// Step N+1 starts only after every payload of step N has completed. When a
/// step fans out, subsequent steps run once per child payload; otherwise
/// each successful result carrying replacement image bytes propagates 1:1
/// to the next step. Branches whose result failed or produced no bytes are
/// dropped, and the run terminates early once no payloads remain.
pub struct LinearExecutor;

impl LinearExecutor {
    pub async fn execute(
        steps: &[StepConfig],
        builder: &dyn ProcessorBuilder,
        root: DocumentPayload,
        ctx: &RunContext,
    ) -> Result<Vec<StepResult>, ConfigError> {
        // Build every processor up front: configuration errors must abort
        // the run before the first step executes.
        let processors: Vec<Arc<dyn Processor>> = steps
            .iter()
            .map(|step| builder.create(&step.name, &step.params))
            .collect::<Result<_, _>>()?;

        let mut payloads: BTreeMap<PayloadKey, DocumentPayload> =
            BTreeMap::from([(PayloadKey::Root, root)]);
        let mut synthetic_counter = 0u32;
        let mut all_results = Vec::new();

        for (step_index, processor) in processors.iter().enumerate() {
            StepBatchStarted {
                step: step_index,
                processor: processor.name(),
                payload_count: payloads.len(),
            }
            .log();

            // Launch order is deterministic: BTreeMap iterates keys in order.
            let mut handles = Vec::with_capacity(payloads.len());
            for (key, payload) in &payloads {
                let processor = Arc::clone(processor);
                let payload = payload.clone();
                let step_ctx = ctx.step(format!("{step_index}_{key}"));
                let semaphore = Arc::clone(&ctx.semaphore);
                handles.push((
                    *key,
                    tokio::spawn(async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .expect("run semaphore closed");
                        run_instrumented(processor.as_ref(), &payload, &step_ctx).await
                    }),
                ));
            }

            let mut step_results: Vec<(PayloadKey, StepResult)> = Vec::with_capacity(handles.len());
            for (key, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(join_error) => StepResult::failure(
                        processor.name(),
                        format!("worker task failed: {join_error}"),
                    ),
                };
                step_results.push((key, result));
            }
            all_results.extend(step_results.iter().map(|(_, r)| r.for_history()));

            // Only the first non-empty fan-out in a step is honored.
            let mut fan_out: Option<Vec<DocumentPayload>> = None;
            for (_, result) in &step_results {
                if !result.is_success() {
                    continue;
                }
                if let Propagation::FanOut { payloads: children } = &result.propagation {
                    if children.is_empty() {
                        continue;
                    }
                    if fan_out.is_none() {
                        FanOutDetected {
                            processor: &result.processor_name,
                            children: children.len(),
                        }
                        .log();
                        fan_out = Some(children.clone());
                    } else {
                        ExtraFanOutIgnored {
                            processor: &result.processor_name,
                        }
                        .log();
                    }
                }
            }

            if let Some(children) = fan_out {
                payloads = BTreeMap::new();
                for child in children {
                    let key = match child.page_number {
                        Some(page) => PayloadKey::Page(page),
                        None => {
                            let key = PayloadKey::Synthetic(synthetic_counter);
                            synthetic_counter += 1;
                            key
                        }
                    };
                    payloads.insert(key, child);
                }
            } else if step_index + 1 < processors.len() {
                let mut next = BTreeMap::new();
                for (key, result) in &step_results {
                    if !result.is_success() {
                        continue;
                    }
                    if let Propagation::Continue { image } = &result.propagation {
                        let input = payloads
                            .get(key)
                            .expect("step result key maps to an input payload");
                        next.insert(*key, input.propagate(image.clone(), result.for_history()));
                    }
                }
                payloads = next;
            }

            if payloads.is_empty() && step_index + 1 < processors.len() {
                RunTerminatedEarly {
                    after_step: step_index,
                }
                .log();
                break;
            }
        }

        Ok(all_results)
    }
}
