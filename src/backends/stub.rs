//! In-process stand-ins for the external collaborators.
//!
//! Used by the test suite and the demo binary: deterministic, no network,
//! no native libraries. Real deployments inject pdfium/poppler-backed
//! rendering and live HTTP backends through the same ports.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};

use crate::errors::{ProcessorError, StorageError};
use crate::ports::{
    ObjectStore, OcrEngine, OcrOptions, PageFormat, PdfRenderer, VlmChatRequest, VlmClient,
    VlmGenerateRequest,
};

/// Renders every page of any PDF as a uniform light-gray raster.
pub struct StubPdfRenderer {
    pages: u32,
}

impl StubPdfRenderer {
    pub fn new(pages: u32) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl PdfRenderer for StubPdfRenderer {
    async fn page_count(&self, _pdf: &[u8]) -> Result<u32, ProcessorError> {
        Ok(self.pages)
    }

    async fn render_page(
        &self,
        _pdf: &[u8],
        page: u32,
        _resolution: u32,
        format: PageFormat,
    ) -> Result<Vec<u8>, ProcessorError> {
        if page < 1 || page > self.pages {
            return Err(ProcessorError::Render(format!(
                "page {} out of range 1-{}",
                page, self.pages
            )));
        }
        // Shade varies per page so downstream steps see distinct bytes.
        let shade = 255u8.saturating_sub((page % 8) as u8);
        let raster = GrayImage::from_pixel(32, 32, Luma([shade]));
        let mut buffer = Vec::new();
        DynamicImage::ImageLuma8(raster)
            .write_to(&mut Cursor::new(&mut buffer), format.as_image_format())?;
        Ok(buffer)
    }
}

/// Returns a fixed transcription for every image.
pub struct StubOcrEngine {
    text: String,
}

impl StubOcrEngine {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl OcrEngine for StubOcrEngine {
    async fn recognize(
        &self,
        _image: &[u8],
        _options: &OcrOptions,
    ) -> Result<String, ProcessorError> {
        Ok(self.text.clone())
    }
}

/// Returns fixed answers for chat and generate calls.
pub struct StubVlmClient {
    chat_answer: String,
    generate_answer: String,
}

impl StubVlmClient {
    pub fn new(chat_answer: impl Into<String>, generate_answer: impl Into<String>) -> Self {
        Self {
            chat_answer: chat_answer.into(),
            generate_answer: generate_answer.into(),
        }
    }
}

#[async_trait]
impl VlmClient for StubVlmClient {
    async fn chat(&self, _request: &VlmChatRequest) -> Result<String, ProcessorError> {
        Ok(self.chat_answer.clone())
    }

    async fn generate(&self, _request: &VlmGenerateRequest) -> Result<String, ProcessorError> {
        Ok(self.generate_answer.clone())
    }
}

/// Keeps stored objects in a map; useful for asserting on persisted keys.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().expect("store poisoned").contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().expect("store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.objects
            .lock()
            .expect("store poisoned")
            .insert(key.to_string(), bytes.to_vec());
        Ok(format!("memory://{key}"))
    }
}
