use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::json;

use crate::errors::ProcessorError;
use crate::ports::{OcrEngine, OcrOptions};

/// `OcrEngine` backed by a tesseract-server-style HTTP endpoint.
///
/// The image travels base64-encoded; recognition options are forwarded so
/// the backend can build its own engine configuration.
pub struct HttpOcrClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpOcrClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl OcrEngine for HttpOcrClient {
    async fn recognize(
        &self,
        image: &[u8],
        options: &OcrOptions,
    ) -> Result<String, ProcessorError> {
        let body = json!({
            "image": STANDARD.encode(image),
            "language": options.language,
            "dpi": options.dpi,
            "page_segmentation_mode": options.page_segmentation_mode,
            "ocr_engine_mode": options.ocr_engine_mode,
        });

        let response = self
            .http
            .post(format!("{}/ocr", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload: serde_json::Value = response.json().await?;
        payload["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProcessorError::BadResponse("ocr response carried no text".to_string()))
    }
}
