use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::errors::{ConfigError, ProcessorError};
use crate::payload::{DocumentPayload, Propagation, StepResult};
use crate::ports::{PageFormat, PdfRenderer};
use crate::traits::Processor;

pub const NAME: &str = "pdf_extractor";

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone, Deserialize)]
struct PdfExtractorConfig {
    #[serde(default = "default_resolution")]
    resolution: u32,
    #[serde(default = "default_format")]
    image_format: PageFormat,
    #[serde(default)]
    page_range: Option<String>,
}

fn default_resolution() -> u32 {
    300
}

fn default_format() -> PageFormat {
    PageFormat::Png
}

/// Selected token of a page-range expression: `3` or `2-5`.
#[derive(Debug, Clone, Copy, PartialEq)]
enum RangeToken {
    Single(u32),
    Span(u32, u32),
}

/// Parse a page range expression like `"1,3-5,10"`.
///
/// Syntax is checked here; bounds against the actual page count are checked
/// at execution time once the document has been opened.
fn parse_page_range(expr: &str) -> Result<Vec<RangeToken>, String> {
    let mut tokens = Vec::new();
    for part in expr.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .map_err(|_| format!("invalid page range format: '{part}'; use numbers or 'start-end'"))?;
            let end: u32 = end
                .trim()
                .parse()
                .map_err(|_| format!("invalid page range format: '{part}'; use numbers or 'start-end'"))?;
            if start < 1 || start > end {
                return Err(format!("invalid page range: '{part}'; start must be >= 1 and <= end"));
            }
            tokens.push(RangeToken::Span(start, end));
        } else {
            let page: u32 = part
                .parse()
                .map_err(|_| format!("invalid page number format: '{part}'; must be a number"))?;
            if page < 1 {
                return Err(format!("invalid page number: {page}; pages are 1-based"));
            }
            tokens.push(RangeToken::Single(page));
        }
    }
    Ok(tokens)
}

/// Resolve parsed tokens against the document's page count.
fn resolve_pages(tokens: &[RangeToken], max_pages: u32) -> Result<BTreeSet<u32>, String> {
    let mut pages = BTreeSet::new();
    for token in tokens {
        match *token {
            RangeToken::Single(page) => {
                if page > max_pages {
                    return Err(format!(
                        "invalid page number: {page}; page must be within 1-{max_pages}"
                    ));
                }
                pages.insert(page);
            }
            RangeToken::Span(start, end) => {
                if end > max_pages {
                    return Err(format!(
                        "invalid page range: {start}-{end}; pages must be within 1-{max_pages}"
                    ));
                }
                pages.extend(start..=end);
            }
        }
    }
    Ok(pages)
}

/// Fans one PDF payload out into one child payload per selected page.
///
/// Rasterization is delegated to the `PdfRenderer` port; this processor owns
/// input validation, page selection, and child lineage.
pub struct PdfExtractorProcessor {
    config: PdfExtractorConfig,
    range_tokens: Option<Vec<RangeToken>>,
    renderer: Arc<dyn PdfRenderer>,
}

impl PdfExtractorProcessor {
    pub fn new(
        params: &Map<String, Value>,
        renderer: Arc<dyn PdfRenderer>,
    ) -> Result<Self, ConfigError> {
        let config: PdfExtractorConfig = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| ConfigError::InvalidParams {
                processor: NAME,
                message: e.to_string(),
            })?;
        if config.resolution == 0 {
            return Err(ConfigError::InvalidParams {
                processor: NAME,
                message: "'resolution' must be a positive integer".to_string(),
            });
        }
        let range_tokens = match &config.page_range {
            Some(expr) => Some(parse_page_range(expr).map_err(|message| {
                ConfigError::InvalidParams {
                    processor: NAME,
                    message,
                }
            })?),
            None => None,
        };
        Ok(Self {
            config,
            range_tokens,
            renderer,
        })
    }
}

#[async_trait]
impl Processor for PdfExtractorProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn execute(&self, payload: &DocumentPayload) -> Result<StepResult, ProcessorError> {
        if payload.file_content.is_empty() {
            return Ok(StepResult::failure(
                NAME,
                "input payload must contain file content for PDF processing",
            ));
        }
        if !payload.file_content.starts_with(PDF_MAGIC) {
            return Ok(StepResult::failure(NAME, "input is not a PDF document"));
        }

        let page_count = self.renderer.page_count(&payload.file_content).await?;

        let selected = match &self.range_tokens {
            None => (1..=page_count).collect::<BTreeSet<u32>>(),
            Some(tokens) => match resolve_pages(tokens, page_count) {
                Ok(pages) => pages,
                Err(message) => return Ok(StepResult::failure(NAME, message)),
            },
        };

        if selected.is_empty() {
            tracing::info!(page_count, "no pages selected for extraction");
            return Ok(StepResult::success(NAME)
                .with_output("No pages selected for extraction.")
                .with_structured(json!({ "page_count": page_count, "pages_extracted": 0 }))
                .with_propagation(Propagation::FanOut { payloads: vec![] }));
        }

        let extension = self.config.image_format.extension();
        let mut children = Vec::with_capacity(selected.len());
        for page in selected {
            let raster = self
                .renderer
                .render_page(
                    &payload.file_content,
                    page,
                    self.config.resolution,
                    self.config.image_format,
                )
                .await?;
            children.push(DocumentPayload {
                job_id: payload.job_id.clone(),
                file_name: format!("{}_page_{}.{}", payload.file_name, page, extension),
                file_content: raster,
                document_id: payload.document_id.clone(),
                parent_document_id: Some(payload.document_id.clone()),
                page_number: Some(page),
                results: Vec::new(),
            });
        }

        let extracted = children.len();
        tracing::info!(pages_extracted = extracted, page_count, "pdf extraction finished");

        Ok(StepResult::success(NAME)
            .with_output(format!("Extracted {extracted} pages from PDF."))
            .with_structured(json!({ "page_count": page_count, "pages_extracted": extracted }))
            .with_propagation(Propagation::FanOut { payloads: children }))
    }
}
