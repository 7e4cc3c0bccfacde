use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::errors::{ConfigError, ProcessorError};
use crate::payload::{DocumentPayload, StepResult};
use crate::ports::{VlmChatRequest, VlmClient};
use crate::traits::Processor;

pub const NAME: &str = "vlm_processor";

#[derive(Debug, Clone, Deserialize)]
struct VlmConfig {
    #[serde(default = "default_prompt")]
    prompt: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

fn default_prompt() -> String {
    "What is in this image?".to_string()
}

fn default_model() -> String {
    "qwen2.5vl:3b".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_seconds() -> u64 {
    // Large vision models can take a long time on big pages.
    30 * 60
}

/// Sends the image to a vision-language endpoint with a configured prompt.
pub struct VlmProcessor {
    config: VlmConfig,
    client: Arc<dyn VlmClient>,
}

impl VlmProcessor {
    pub fn new(params: &Map<String, Value>, client: Arc<dyn VlmClient>) -> Result<Self, ConfigError> {
        let config: VlmConfig = serde_json::from_value(Value::Object(params.clone())).map_err(
            |e| ConfigError::InvalidParams {
                processor: NAME,
                message: e.to_string(),
            },
        )?;
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(ConfigError::InvalidParams {
                processor: NAME,
                message: "'temperature' must be between 0.0 and 2.0".to_string(),
            });
        }
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Processor for VlmProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.config.timeout_seconds))
    }

    async fn execute(&self, payload: &DocumentPayload) -> Result<StepResult, ProcessorError> {
        if payload.file_content.is_empty() {
            return Ok(StepResult::failure(NAME, "image data is required for VLM analysis"));
        }

        let request = VlmChatRequest {
            model: self.config.model.clone(),
            prompt: self.config.prompt.clone(),
            image_b64: STANDARD.encode(&payload.file_content),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let analysis = self.client.chat(&request).await?;
        let summary: String = analysis.chars().take(80).collect();

        Ok(StepResult::success(NAME)
            .with_output(summary.trim().to_string())
            .with_structured(json!({ "analysis": analysis })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::StubVlmClient;

    fn processor(params: Value) -> Result<VlmProcessor, ConfigError> {
        let params = match params {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        };
        VlmProcessor::new(
            &params,
            Arc::new(StubVlmClient::new("an invoice", "invoice")),
        )
    }

    #[test]
    fn default_timeout_is_thirty_minutes() {
        let p = processor(json!({})).unwrap();
        assert_eq!(p.timeout(), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        assert!(processor(json!({ "temperature": 3.5 })).is_err());
    }

    #[tokio::test]
    async fn analysis_lands_in_structured_results() {
        let p = processor(json!({ "prompt": "Describe the page" })).unwrap();
        let payload = DocumentPayload::root("job", "page.png", vec![1, 2, 3], "doc");

        let result = p.execute(&payload).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.structured_results.unwrap()["analysis"], "an invoice");
    }

    #[tokio::test]
    async fn empty_payload_fails() {
        let p = processor(json!({})).unwrap();
        let payload = DocumentPayload::root("job", "page.png", vec![], "doc");
        let result = p.execute(&payload).await.unwrap();
        assert!(!result.is_success());
    }
}
