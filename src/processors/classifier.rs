use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::errors::{ConfigError, ProcessorError};
use crate::payload::{DocumentPayload, StepResult};
use crate::ports::{VlmClient, VlmGenerateRequest};
use crate::traits::Processor;

pub const NAME: &str = "classifier";

#[derive(Debug, Clone, Deserialize)]
struct ClassifierConfig {
    document_types: Vec<String>,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

fn default_model() -> String {
    "llava:latest".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

/// Classifies the document into one of a configured closed set of types.
///
/// The answer comes from the VLM's bare-completion endpoint; anything
/// outside the configured set is a step failure.
pub struct DocumentClassifierProcessor {
    config: ClassifierConfig,
    client: Arc<dyn VlmClient>,
}

impl DocumentClassifierProcessor {
    pub fn new(params: &Map<String, Value>, client: Arc<dyn VlmClient>) -> Result<Self, ConfigError> {
        let config: ClassifierConfig = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| ConfigError::InvalidParams {
                processor: NAME,
                message: e.to_string(),
            })?;
        if config.document_types.is_empty() {
            return Err(ConfigError::InvalidParams {
                processor: NAME,
                message: "'document_types' must be a non-empty list".to_string(),
            });
        }
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Processor for DocumentClassifierProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.config.timeout_seconds))
    }

    async fn execute(&self, payload: &DocumentPayload) -> Result<StepResult, ProcessorError> {
        let prompt = format!(
            "What type of document is this? Choose from the following options: {}. Respond with only one word.",
            self.config.document_types.join(", ")
        );

        let request = VlmGenerateRequest {
            model: self.config.model.clone(),
            prompt,
            image_b64: STANDARD.encode(&payload.file_content),
        };

        let answer = self.client.generate(&request).await?;
        let document_type = answer.trim().to_lowercase();

        let known = self
            .config
            .document_types
            .iter()
            .any(|t| t.to_lowercase() == document_type);
        if !known {
            tracing::warn!(classified_type = %document_type, "classification outside the configured set");
            return Ok(StepResult::failure(
                NAME,
                format!(
                    "model classified the document as '{document_type}', which is not in the list of allowed types"
                ),
            ));
        }

        Ok(StepResult::success(NAME)
            .with_output(document_type.clone())
            .with_structured(json!({ "document_type": document_type })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::StubVlmClient;

    fn processor(answer: &str, params: Value) -> Result<DocumentClassifierProcessor, ConfigError> {
        let params = match params {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        };
        DocumentClassifierProcessor::new(&params, Arc::new(StubVlmClient::new("", answer)))
    }

    #[test]
    fn document_types_are_required() {
        assert!(processor("invoice", json!({})).is_err());
        assert!(processor("invoice", json!({ "document_types": [] })).is_err());
    }

    #[test]
    fn default_timeout_is_one_minute() {
        let p = processor("invoice", json!({ "document_types": ["invoice"] })).unwrap();
        assert_eq!(p.timeout(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn answer_in_the_set_succeeds() {
        let p = processor(" Invoice \n", json!({ "document_types": ["invoice", "receipt"] })).unwrap();
        let payload = DocumentPayload::root("job", "page.png", vec![1], "doc");

        let result = p.execute(&payload).await.unwrap();
        assert!(result.is_success());
        assert_eq!(
            result.structured_results.unwrap()["document_type"],
            "invoice"
        );
    }

    #[tokio::test]
    async fn answer_outside_the_set_fails() {
        let p = processor("novel", json!({ "document_types": ["invoice", "receipt"] })).unwrap();
        let payload = DocumentPayload::root("job", "page.png", vec![1], "doc");

        let result = p.execute(&payload).await.unwrap();
        assert!(!result.is_success());
        assert!(result.error_message.unwrap().contains("'novel'"));
    }
}
