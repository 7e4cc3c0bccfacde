use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::errors::{ConfigError, ProcessorError};
use crate::payload::{DocumentPayload, StepResult};
use crate::traits::Processor;

pub const NAME: &str = "sentiment";

#[derive(Debug, Clone, Deserialize)]
struct SentimentConfig {
    #[serde(default = "default_positive_words")]
    positive_words: Vec<String>,
    #[serde(default = "default_negative_words")]
    negative_words: Vec<String>,
}

fn default_positive_words() -> Vec<String> {
    ["good", "great", "excellent", "positive", "awesome"]
        .map(String::from)
        .to_vec()
}

fn default_negative_words() -> Vec<String> {
    ["bad", "poor", "terrible", "negative", "awful"]
        .map(String::from)
        .to_vec()
}

/// Lexicon-based sentiment scorer over the payload's extracted text.
///
/// The text comes from the most recent `{ "text": ... }` structured result
/// on the payload's lineage (usually OCR), falling back to the payload
/// bytes interpreted as UTF-8.
pub struct SentimentAnalyzerProcessor {
    positive_words: HashSet<String>,
    negative_words: HashSet<String>,
}

impl SentimentAnalyzerProcessor {
    pub fn new(params: &Map<String, Value>) -> Result<Self, ConfigError> {
        let config: SentimentConfig = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| ConfigError::InvalidParams {
                processor: NAME,
                message: e.to_string(),
            })?;
        Ok(Self {
            positive_words: config.positive_words.into_iter().collect(),
            negative_words: config.negative_words.into_iter().collect(),
        })
    }

    fn text_of(payload: &DocumentPayload) -> Option<String> {
        let from_history = payload.results.iter().rev().find_map(|result| {
            result
                .structured_results
                .as_ref()
                .and_then(|s| s.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        from_history.or_else(|| String::from_utf8(payload.file_content.clone()).ok())
    }
}

#[async_trait]
impl Processor for SentimentAnalyzerProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn execute(&self, payload: &DocumentPayload) -> Result<StepResult, ProcessorError> {
        let Some(text) = Self::text_of(payload) else {
            return Ok(StepResult::failure(
                NAME,
                "text content is required for sentiment analysis",
            ));
        };

        let mut score: i64 = 0;
        for word in text.to_lowercase().split_whitespace() {
            if self.positive_words.contains(word) {
                score += 1;
            } else if self.negative_words.contains(word) {
                score -= 1;
            }
        }

        let sentiment = match score {
            s if s > 0 => "positive",
            s if s < 0 => "negative",
            _ => "neutral",
        };

        Ok(StepResult::success(NAME)
            .with_output(format!("{sentiment} ({score})"))
            .with_structured(json!({ "sentiment": sentiment, "score": score })))
    }
}
