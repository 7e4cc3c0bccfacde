use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::ProcessorError;
use crate::ports::{VlmChatRequest, VlmClient, VlmGenerateRequest};

/// `VlmClient` backed by an Ollama-compatible HTTP API.
///
/// `chat` maps to `POST /api/chat` with the image attached to the user
/// message; `generate` maps to `POST /api/generate`. Responses are read
/// non-streaming.
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, ProcessorError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VlmClient for OllamaClient {
    async fn chat(&self, request: &VlmChatRequest) -> Result<String, ProcessorError> {
        let body = json!({
            "model": request.model,
            "messages": [{
                "role": "user",
                "content": request.prompt,
                "images": [request.image_b64],
            }],
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });

        let response = self.post_json("/api/chat", body).await?;
        response["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ProcessorError::BadResponse("chat response carried no message content".to_string())
            })
    }

    async fn generate(&self, request: &VlmGenerateRequest) -> Result<String, ProcessorError> {
        let body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "images": [request.image_b64],
            "stream": false,
        });

        let response = self.post_json("/api/generate", body).await?;
        response["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                ProcessorError::BadResponse("generate response carried no text".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let client = OllamaClient::new("http://ollama:11434/");
        assert_eq!(client.base_url, "http://ollama:11434");
    }
}
