//! Seams to external collaborators.
//!
//! PDF rasterization, OCR decoding, vision-language inference, and object
//! storage are external capabilities: the engine only depends on these
//! traits and the factory wires concrete adapters in at startup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{ProcessorError, StorageError};

/// Output encoding for rendered PDF pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PageFormat {
    Png,
    Jpeg,
    Tiff,
}

impl PageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PageFormat::Png => "png",
            PageFormat::Jpeg => "jpeg",
            PageFormat::Tiff => "tiff",
        }
    }

    pub fn as_image_format(self) -> image::ImageFormat {
        match self {
            PageFormat::Png => image::ImageFormat::Png,
            PageFormat::Jpeg => image::ImageFormat::Jpeg,
            PageFormat::Tiff => image::ImageFormat::Tiff,
        }
    }
}

/// Rasterizes PDF pages into images.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn page_count(&self, pdf: &[u8]) -> Result<u32, ProcessorError>;

    /// Render one page (1-based) at the given resolution.
    async fn render_page(
        &self,
        pdf: &[u8],
        page: u32,
        resolution: u32,
        format: PageFormat,
    ) -> Result<Vec<u8>, ProcessorError>;
}

/// Tesseract-style recognition options, forwarded verbatim to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct OcrOptions {
    pub language: String,
    pub dpi: u32,
    pub page_segmentation_mode: u8,
    pub ocr_engine_mode: u8,
}

/// Decodes the text content of an image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8], options: &OcrOptions) -> Result<String, ProcessorError>;
}

/// A chat-style VLM invocation with an image attachment.
#[derive(Debug, Clone)]
pub struct VlmChatRequest {
    pub model: String,
    pub prompt: String,
    pub image_b64: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A bare-completion VLM invocation with an image attachment.
#[derive(Debug, Clone)]
pub struct VlmGenerateRequest {
    pub model: String,
    pub prompt: String,
    pub image_b64: String,
}

/// Vision-language model endpoint.
#[async_trait]
pub trait VlmClient: Send + Sync {
    async fn chat(&self, request: &VlmChatRequest) -> Result<String, ProcessorError>;

    async fn generate(&self, request: &VlmGenerateRequest) -> Result<String, ProcessorError>;
}

/// Byte sink for the raw uploaded file; returns a URL for the stored object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError>;
}
