use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::errors::{ConfigError, ProcessorError};
use crate::payload::{DocumentPayload, StepResult};
use crate::ports::{OcrEngine, OcrOptions};
use crate::traits::Processor;

pub const NAME: &str = "ocr_processor";

#[derive(Debug, Clone, Deserialize)]
struct OcrConfig {
    #[serde(default = "default_language")]
    language: String,
    #[serde(default = "default_dpi")]
    dpi: u32,
    #[serde(default = "default_psm")]
    page_segmentation_mode: u8,
    #[serde(default = "default_oem")]
    ocr_engine_mode: u8,
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_dpi() -> u32 {
    300
}

fn default_psm() -> u8 {
    3
}

fn default_oem() -> u8 {
    3
}

/// Extracts text from an image payload through the `OcrEngine` port.
pub struct OcrProcessor {
    options: OcrOptions,
    engine: Arc<dyn OcrEngine>,
}

impl OcrProcessor {
    pub fn new(params: &Map<String, Value>, engine: Arc<dyn OcrEngine>) -> Result<Self, ConfigError> {
        let config: OcrConfig = serde_json::from_value(Value::Object(params.clone())).map_err(
            |e| ConfigError::InvalidParams {
                processor: NAME,
                message: e.to_string(),
            },
        )?;
        if config.dpi == 0 {
            return Err(ConfigError::InvalidParams {
                processor: NAME,
                message: "'dpi' must be a positive integer".to_string(),
            });
        }
        if config.page_segmentation_mode > 13 {
            return Err(ConfigError::InvalidParams {
                processor: NAME,
                message: "'page_segmentation_mode' must be between 0 and 13".to_string(),
            });
        }
        if config.ocr_engine_mode > 3 {
            return Err(ConfigError::InvalidParams {
                processor: NAME,
                message: "'ocr_engine_mode' must be between 0 and 3".to_string(),
            });
        }
        Ok(Self {
            options: OcrOptions {
                language: config.language,
                dpi: config.dpi,
                page_segmentation_mode: config.page_segmentation_mode,
                ocr_engine_mode: config.ocr_engine_mode,
            },
            engine,
        })
    }
}

#[async_trait]
impl Processor for OcrProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn execute(&self, payload: &DocumentPayload) -> Result<StepResult, ProcessorError> {
        // OCR only accepts raster images; reject anything whose sniffed MIME
        // type is not image/*.
        let mime = match image::guess_format(&payload.file_content) {
            Ok(format) => format.to_mime_type(),
            Err(_) => {
                return Ok(StepResult::failure(
                    NAME,
                    "ocr accepts image input only, but the payload content is not a recognizable image",
                ))
            }
        };
        if !mime.starts_with("image/") {
            return Ok(StepResult::failure(
                NAME,
                format!("ocr accepts image input only, but received {mime}"),
            ));
        }

        tracing::info!(language = %self.options.language, dpi = self.options.dpi, "ocr started");
        let text = self
            .engine
            .recognize(&payload.file_content, &self.options)
            .await?;
        tracing::info!(text_length = text.len(), "ocr finished");

        let summary: String = if text.chars().count() > 80 {
            format!("{}...", text.chars().take(80).collect::<String>())
        } else {
            text.clone()
        };

        Ok(StepResult::success(NAME)
            .with_output(summary.trim().to_string())
            .with_structured(json!({ "text": text })))
    }
}
