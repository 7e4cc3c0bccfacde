use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::engine::instrument::{run_instrumented, StepContext};
use crate::errors::{ConfigError, ProcessorError};
use crate::payload::{DocumentPayload, Propagation, StepResult};
use crate::processors::{image_preprocessor, ocr, pdf_extractor, vlm};
use crate::traits::{Processor, ProcessorBuilder};

pub const NAME: &str = "enhanced_pdf";

/// Composite sub-pipeline: render pages, preprocess each, then run OCR and
/// VLM analysis per page and emit one document-level `pages` summary.
///
/// Inner processors are built through the `ProcessorBuilder` handle at
/// construction time, so an invalid inner config fails the run before any
/// step executes. Inner invocations go through the same instrumentation
/// wrapper as top-level steps.
pub struct EnhancedPdfProcessor {
    extractor: Arc<dyn Processor>,
    preprocessor: Arc<dyn Processor>,
    ocr: Arc<dyn Processor>,
    vlm: Arc<dyn Processor>,
}

impl EnhancedPdfProcessor {
    pub fn new(
        params: &Map<String, Value>,
        builder: Arc<dyn ProcessorBuilder>,
    ) -> Result<Self, ConfigError> {
        let section = |key: &str| -> Map<String, Value> {
            params
                .get(key)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        // The preprocessor requires a step list; default to grayscale when
        // the composite config leaves it out.
        let mut preprocessor_params = section(image_preprocessor::NAME);
        preprocessor_params
            .entry("steps".to_string())
            .or_insert_with(|| json!([{ "name": "to_grayscale" }]));

        Ok(Self {
            extractor: builder.create(pdf_extractor::NAME, &section(pdf_extractor::NAME))?,
            preprocessor: builder.create(image_preprocessor::NAME, &preprocessor_params)?,
            ocr: builder.create(ocr::NAME, &section(ocr::NAME))?,
            vlm: builder.create(vlm::NAME, &section(vlm::NAME))?,
        })
    }

    fn inner_context(&self, payload: &DocumentPayload, inner: &str) -> StepContext {
        StepContext::detached(format!("{NAME}/{inner}"), payload.job_id.clone())
    }
}

#[async_trait]
impl Processor for EnhancedPdfProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn execute(&self, payload: &DocumentPayload) -> Result<StepResult, ProcessorError> {
        let extraction = run_instrumented(
            self.extractor.as_ref(),
            payload,
            &self.inner_context(payload, "extract"),
        )
        .await;
        if !extraction.is_success() {
            return Ok(StepResult::failure(
                NAME,
                format!(
                    "pdf extraction failed: {}",
                    extraction.error_message.as_deref().unwrap_or("unknown error")
                ),
            ));
        }

        let children = match extraction.propagation {
            Propagation::FanOut { payloads } => payloads,
            _ => Vec::new(),
        };

        let mut pages = Vec::with_capacity(children.len());
        for child in children {
            let preprocessed = run_instrumented(
                self.preprocessor.as_ref(),
                &child,
                &self.inner_context(&child, "preprocess"),
            )
            .await;
            let analyzed = match (&preprocessed.propagation, preprocessed.is_success()) {
                (Propagation::Continue { image }, true) => {
                    child.propagate(image.clone(), preprocessed.for_history())
                }
                _ => {
                    tracing::warn!(
                        page = ?child.page_number,
                        "preprocessing failed for page, skipping analysis"
                    );
                    continue;
                }
            };

            let ocr_context = self.inner_context(&analyzed, "ocr");
            let vlm_context = self.inner_context(&analyzed, "vlm");
            let (ocr_result, vlm_result) = tokio::join!(
                run_instrumented(self.ocr.as_ref(), &analyzed, &ocr_context),
                run_instrumented(self.vlm.as_ref(), &analyzed, &vlm_context),
            );

            let render = |result: StepResult| -> Value {
                if result.is_success() {
                    result.structured_results.unwrap_or(Value::Null)
                } else {
                    json!({ "error": result.error_message })
                }
            };

            pages.push(json!({
                "page_number": analyzed.page_number,
                "ocr_result": render(ocr_result),
                "vlm_result": render(vlm_result),
            }));
        }

        let page_count = pages.len();
        Ok(StepResult::success(NAME)
            .with_output(format!("Analyzed {page_count} page(s)."))
            .with_structured(json!({ "pages": pages })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{StubOcrEngine, StubPdfRenderer, StubVlmClient};
    use crate::processors::ProcessorFactory;

    fn factory(pages: u32) -> Arc<ProcessorFactory> {
        Arc::new(ProcessorFactory::new(
            Arc::new(StubPdfRenderer::new(pages)),
            Arc::new(StubOcrEngine::new("page text")),
            Arc::new(StubVlmClient::new("a scanned page", "report")),
        ))
    }

    #[tokio::test]
    async fn analyzes_every_extracted_page() {
        let factory = factory(2);
        let composite = EnhancedPdfProcessor::new(&Map::new(), factory).unwrap();
        let payload = DocumentPayload::root("job", "doc.pdf", b"%PDF-1.4".to_vec(), "doc");

        let result = composite.execute(&payload).await.unwrap();
        assert!(result.is_success());

        let structured = result.structured_results.unwrap();
        let pages = structured["pages"].as_array().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0]["page_number"], 1);
        assert_eq!(pages[0]["ocr_result"]["text"], "page text");
        assert_eq!(pages[1]["vlm_result"]["analysis"], "a scanned page");
    }

    #[tokio::test]
    async fn non_pdf_input_fails_the_composite() {
        let factory = factory(2);
        let composite = EnhancedPdfProcessor::new(&Map::new(), factory).unwrap();
        let payload = DocumentPayload::root("job", "doc.txt", b"plain text".to_vec(), "doc");

        let result = composite.execute(&payload).await.unwrap();
        assert!(!result.is_success());
        assert!(result.error_message.unwrap().contains("pdf extraction failed"));
    }

    #[test]
    fn invalid_inner_config_fails_construction() {
        let factory = factory(1);
        let mut params = Map::new();
        params.insert(
            pdf_extractor::NAME.to_string(),
            json!({ "page_range": "not-a-range" }),
        );
        assert!(EnhancedPdfProcessor::new(&params, factory).is_err());
    }
}
