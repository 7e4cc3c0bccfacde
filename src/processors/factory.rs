use std::sync::Arc;

use serde_json::{Map, Value};

use crate::errors::ConfigError;
use crate::ports::{OcrEngine, PdfRenderer, VlmClient};
use crate::processors::classifier::DocumentClassifierProcessor;
use crate::processors::composite::EnhancedPdfProcessor;
use crate::processors::image_preprocessor::ImagePreprocessingProcessor;
use crate::processors::ocr::OcrProcessor;
use crate::processors::pdf_extractor::PdfExtractorProcessor;
use crate::processors::sentiment::SentimentAnalyzerProcessor;
use crate::processors::vlm::VlmProcessor;
use crate::processors::{
    classifier, composite, image_preprocessor, ocr, pdf_extractor, sentiment, vlm,
};
use crate::traits::{Processor, ProcessorBuilder};

/// Names resolvable by the factory, in registry order.
pub const KNOWN_PROCESSORS: &[&str] = &[
    pdf_extractor::NAME,
    image_preprocessor::NAME,
    ocr::NAME,
    vlm::NAME,
    classifier::NAME,
    sentiment::NAME,
    composite::NAME,
];

/// Resolves processor names into instances, wiring in the external
/// collaborator adapters each kind needs.
///
/// This is the only place with name-coupled logic: the VLM and classifier
/// get the `VlmClient`, OCR gets the `OcrEngine`, the PDF extractor gets
/// the `PdfRenderer`, and the composite gets a builder handle back into the
/// factory. Construction is also where processor configs are validated, so
/// a bad config fails the run before any step executes.
#[derive(Clone)]
pub struct ProcessorFactory {
    renderer: Arc<dyn PdfRenderer>,
    ocr_engine: Arc<dyn OcrEngine>,
    vlm_client: Arc<dyn VlmClient>,
}

impl ProcessorFactory {
    pub fn new(
        renderer: Arc<dyn PdfRenderer>,
        ocr_engine: Arc<dyn OcrEngine>,
        vlm_client: Arc<dyn VlmClient>,
    ) -> Self {
        Self {
            renderer,
            ocr_engine,
            vlm_client,
        }
    }
}

impl ProcessorBuilder for ProcessorFactory {
    fn create(
        &self,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<Arc<dyn Processor>, ConfigError> {
        let processor: Arc<dyn Processor> = match name {
            pdf_extractor::NAME => Arc::new(PdfExtractorProcessor::new(
                params,
                self.renderer.clone(),
            )?),
            image_preprocessor::NAME => Arc::new(ImagePreprocessingProcessor::new(params)?),
            ocr::NAME => Arc::new(OcrProcessor::new(params, self.ocr_engine.clone())?),
            vlm::NAME => Arc::new(VlmProcessor::new(params, self.vlm_client.clone())?),
            classifier::NAME => Arc::new(DocumentClassifierProcessor::new(
                params,
                self.vlm_client.clone(),
            )?),
            sentiment::NAME => Arc::new(SentimentAnalyzerProcessor::new(params)?),
            composite::NAME => Arc::new(EnhancedPdfProcessor::new(
                params,
                Arc::new(self.clone()) as Arc<dyn ProcessorBuilder>,
            )?),
            _ => {
                return Err(ConfigError::UnknownProcessor {
                    name: name.to_string(),
                    known: KNOWN_PROCESSORS.iter().map(|n| n.to_string()).collect(),
                })
            }
        };
        Ok(processor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{StubOcrEngine, StubPdfRenderer, StubVlmClient};
    use serde_json::json;

    fn factory() -> ProcessorFactory {
        ProcessorFactory::new(
            Arc::new(StubPdfRenderer::new(1)),
            Arc::new(StubOcrEngine::new("")),
            Arc::new(StubVlmClient::new("", "")),
        )
    }

    #[test]
    fn creates_every_known_processor_with_minimal_config() {
        let factory = factory();
        for name in KNOWN_PROCESSORS {
            let params = match *name {
                image_preprocessor::NAME => match json!({ "steps": [] }) {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                },
                classifier::NAME => match json!({ "document_types": ["invoice"] }) {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                },
                _ => Map::new(),
            };
            let processor = factory.create(name, &params).unwrap();
            assert_eq!(processor.name(), *name);
        }
    }

    #[test]
    fn unknown_name_lists_known_processors() {
        let err = factory().create("tokenizer", &Map::new()).unwrap_err();
        match err {
            ConfigError::UnknownProcessor { name, known } => {
                assert_eq!(name, "tokenizer");
                assert_eq!(known.len(), KNOWN_PROCESSORS.len());
            }
            other => panic!("expected unknown-processor error, got {other}"),
        }
    }

    #[test]
    fn invalid_params_surface_as_config_errors() {
        let params = match json!({ "resolution": 0 }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(factory().create(pdf_extractor::NAME, &params).is_err());
    }
}
