use std::collections::BTreeMap;

use crate::payload::{AggregatedDocument, PageResults, StepResult, StepStatus, ORCHESTRATOR_NAME};

/// Fold a flat result list into the document-centric output tree.
///
/// Successful results with a `page_number` land under their page, keyed by
/// the processor name stripped of any `_processor` suffix; the rest land in
/// `document_level_results`. Failed and skipped results are left out of the
/// tree (they remain in the run's flat result list), except the synthetic
/// orchestrator failure, which flips the aggregate status to failure.
///
/// When one processor produces two successful results for the same page the
/// later one wins; pages are sorted ascending. The fold is pure: running it
/// twice over the same input yields an equal tree.
pub fn aggregate_results(results: &[StepResult], document_id: &str) -> AggregatedDocument {
    let mut out = AggregatedDocument {
        document_id: document_id.to_string(),
        status: StepStatus::Success,
        error_message: None,
        pages: Vec::new(),
        document_level_results: BTreeMap::new(),
    };

    let mut pages: BTreeMap<u32, PageResults> = BTreeMap::new();

    for result in results {
        if result.processor_name == ORCHESTRATOR_NAME && result.status == StepStatus::Failure {
            out.status = StepStatus::Failure;
            out.error_message = result.error_message.clone();
            // The final status is now failure, but other results still count.
        }
        if result.status != StepStatus::Success {
            continue;
        }

        let Some(structured) = &result.structured_results else {
            continue;
        };
        let key = result
            .processor_name
            .strip_suffix("_processor")
            .unwrap_or(&result.processor_name);

        match result.metadata.page_number {
            Some(page_number) => {
                pages
                    .entry(page_number)
                    .or_insert_with(|| PageResults {
                        page_number,
                        results: BTreeMap::new(),
                    })
                    .results
                    .insert(format!("{key}_result"), structured.clone());
            }
            None => {
                out.document_level_results
                    .insert(format!("{key}_result"), structured.clone());
            }
        }
    }

    out.pages = pages.into_values().collect();
    out
}
