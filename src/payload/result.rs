use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::DocumentPayload;

/// Processor name used for synthetic engine-level failure results.
pub const ORCHESTRATOR_NAME: &str = "pipeline_orchestrator";

/// Outcome status of a single processor execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Failure => "failure",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// Run / job state as reported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    InProgress,
    Success,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Success | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::InProgress => "in_progress",
            JobState::Success => "success",
            JobState::Failed => "failed",
        }
    }
}

/// Flow control emitted by a processor alongside its result.
///
/// This is the typed rendering of the reserved `image_data` /
/// `document_payloads` shapes: `Continue` replaces the current payload's
/// bytes (1:1), `FanOut` spawns one downstream branch per child payload,
/// `Terminal` produces no downstream payload.
#[derive(Debug, Clone, Default)]
pub enum Propagation {
    #[default]
    Terminal,
    Continue {
        image: Vec<u8>,
    },
    FanOut {
        payloads: Vec<DocumentPayload>,
    },
}

/// Execution context stamped onto every result by the instrumentation
/// wrapper. `page_number` and `parent_document_id` mirror the input
/// payload's lineage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

/// The result of a single processor execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub processor_name: String,
    pub status: StepStatus,
    /// Short human-readable summary, for logs and UIs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Machine-readable product of the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: StepMetadata,
    /// Flow control for the executors; not part of the serialized result.
    #[serde(skip)]
    pub propagation: Propagation,
}

impl StepResult {
    pub fn success(processor_name: impl Into<String>) -> Self {
        Self {
            processor_name: processor_name.into(),
            status: StepStatus::Success,
            output: None,
            structured_results: None,
            error_message: None,
            metadata: StepMetadata::default(),
            propagation: Propagation::Terminal,
        }
    }

    pub fn failure(processor_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            processor_name: processor_name.into(),
            status: StepStatus::Failure,
            output: None,
            structured_results: None,
            error_message: Some(error.into()),
            metadata: StepMetadata::default(),
            propagation: Propagation::Terminal,
        }
    }

    pub fn skipped(processor_name: impl Into<String>) -> Self {
        Self {
            processor_name: processor_name.into(),
            status: StepStatus::Skipped,
            output: None,
            structured_results: None,
            error_message: None,
            metadata: StepMetadata::default(),
            propagation: Propagation::Terminal,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_structured(mut self, structured: Value) -> Self {
        self.structured_results = Some(structured);
        self
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Copy suitable for a payload's result history: fan-out child payloads
    /// would otherwise be dragged along in every descendant.
    pub fn for_history(&self) -> Self {
        let mut copy = self.clone();
        copy.propagation = Propagation::Terminal;
        copy
    }
}

/// Per-page slice of the aggregated output. Serializes flat, e.g.
/// `{"page_number": 3, "ocr_result": {...}, "vlm_result": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResults {
    pub page_number: u32,
    #[serde(flatten)]
    pub results: BTreeMap<String, Value>,
}

/// Document-centric tree produced by the result aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedDocument {
    pub document_id: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub pages: Vec<PageResults>,
    pub document_level_results: BTreeMap<String, Value>,
}

/// Final output of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProcessingResult {
    pub job_id: String,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub results: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<AggregatedDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_result_serializes_without_propagation() {
        let result = StepResult::success("ocr_processor")
            .with_structured(json!({"text": "hello"}))
            .with_propagation(Propagation::Continue { image: vec![1] });

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["processor_name"], "ocr_processor");
        assert_eq!(value["status"], "success");
        assert_eq!(value["structured_results"]["text"], "hello");
        assert!(value.get("propagation").is_none());
        assert!(value.get("error_message").is_none());
    }

    #[test]
    fn history_copy_drops_fan_out_payloads() {
        let child = DocumentPayload::root("j", "f", vec![], "d");
        let result = StepResult::success("pdf_extractor").with_propagation(Propagation::FanOut {
            payloads: vec![child],
        });

        let trimmed = result.for_history();
        assert!(matches!(trimmed.propagation, Propagation::Terminal));
        assert_eq!(trimmed.processor_name, "pdf_extractor");
    }

    #[test]
    fn page_results_flatten_processor_keys() {
        let mut results = BTreeMap::new();
        results.insert("ocr_result".to_string(), json!({"text": "hi"}));
        let page = PageResults {
            page_number: 2,
            results,
        };

        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["page_number"], 2);
        assert_eq!(value["ocr_result"]["text"], "hi");
    }
}
