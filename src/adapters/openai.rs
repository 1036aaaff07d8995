//! OpenAI Responses API adapter for resume extraction.
//!
//! Sends the PDF as a base64 `input_file` data URL together with the
//! scoring instruction and returns the model's text output untouched.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tracing::debug;

use super::{ExtractionRequest, Extractor};

/// Default Responses API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/responses";

/// Extraction client for the OpenAI Responses API
pub struct OpenAiExtractor {
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiExtractor {
    /// Create a client. A missing key only fails when `extract` is called.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Build the JSON request body
    fn request_body(request: &ExtractionRequest) -> Value {
        let file_data = format!("data:application/pdf;base64,{}", BASE64.encode(&request.bytes));

        json!({
            "model": request.model,
            "input": [{
                "role": "user",
                "content": [
                    {
                        "type": "input_file",
                        "filename": request.file_name,
                        "file_data": file_data,
                    },
                    {
                        "type": "input_text",
                        "text": request.instruction,
                    }
                ]
            }]
        })
    }

    /// Pull the first output text out of a Responses API reply
    fn output_text(response: &Value) -> Result<String> {
        let outputs = response
            .get("output")
            .and_then(Value::as_array)
            .context("Response has no 'output' array")?;

        // Prefer explicit output_text parts; reasoning items have no content
        let text = outputs
            .iter()
            .filter_map(|item| item.get("content").and_then(Value::as_array))
            .flatten()
            .filter(|part| {
                part.get("type")
                    .and_then(Value::as_str)
                    .map_or(true, |t| t == "output_text")
            })
            .find_map(|part| part.get("text").and_then(Value::as_str))
            .context("Response has no output text")?;

        Ok(text.to_string())
    }
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    fn name(&self) -> &str {
        "openai"
    }

    async fn extract(&self, request: ExtractionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .context("OPENAI_API_KEY is not configured")?;

        debug!(
            model = %request.model,
            file = %request.file_name,
            size = request.bytes.len(),
            "Calling extraction service"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&Self::request_body(&request))
            .send()
            .await
            .context("Failed to reach extraction service")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Extraction service error ({}): {}", status, text.trim());
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse extraction service response")?;

        Self::output_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExtractionRequest {
        ExtractionRequest {
            model: "gpt-4.1".to_string(),
            file_name: "resume-jane_doe.pdf".to_string(),
            bytes: b"%PDF".to_vec(),
            instruction: "Score this".to_string(),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = OpenAiExtractor::request_body(&request());

        assert_eq!(body["model"], "gpt-4.1");
        let content = &body["input"][0]["content"];
        assert_eq!(content[0]["type"], "input_file");
        assert_eq!(content[0]["filename"], "resume-jane_doe.pdf");
        assert_eq!(content[0]["file_data"], "data:application/pdf;base64,JVBERg==");
        assert_eq!(content[1]["text"], "Score this");
    }

    #[test]
    fn test_output_text_skips_reasoning_items() {
        let response = json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "{\"score\": 82}" }
                ]}
            ]
        });

        assert_eq!(
            OpenAiExtractor::output_text(&response).unwrap(),
            "{\"score\": 82}"
        );
    }

    #[test]
    fn test_output_text_missing() {
        assert!(OpenAiExtractor::output_text(&json!({ "output": [] })).is_err());
        assert!(OpenAiExtractor::output_text(&json!({ "error": "x" })).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let extractor = OpenAiExtractor::new(DEFAULT_ENDPOINT, None, Duration::from_secs(1));
        let err = extractor.extract(request()).await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
