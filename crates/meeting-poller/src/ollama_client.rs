use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::InferenceConfig;
use crate::ports::InferenceBackend;

/// Client for an Ollama-style `/api/generate` endpoint
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    format: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

impl OllamaClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    fn request<'a>(&'a self, prompt: &'a str, system: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            system,
            format: "json",
            stream: false,
        }
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&self.request(prompt, system))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.endpoint))?
            .error_for_status()
            .context("Inference backend returned an error status")?;

        let envelope: GenerateResponse = response
            .json()
            .await
            .context("Inference backend returned an invalid envelope")?;

        // A missing `response` field is left for the extractor to treat as malformed
        Ok(envelope.response.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let client = OllamaClient::new(&InferenceConfig::default()).unwrap();
        let body = serde_json::to_value(client.request("Subject: hi", "be terse")).unwrap();

        assert_eq!(body["model"], "llama3:8b-instruct-q4_K_M");
        assert_eq!(body["prompt"], "Subject: hi");
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_envelope_without_response_field() {
        let envelope: GenerateResponse =
            serde_json::from_str(r#"{"model": "llama3", "done": true}"#).unwrap();
        assert!(envelope.response.is_none());

        let envelope: GenerateResponse =
            serde_json::from_str(r#"{"response": "{\"has_meeting\": false}"}"#).unwrap();
        assert_eq!(envelope.response.as_deref(), Some(r#"{"has_meeting": false}"#));
    }
}
