use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TranslateConfig;
use crate::error::{Cause, Result, TarjamaError};
use super::{system_prompt, TranslationService};

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    model: String,
    system: String,
    prompt: String,
    stream: bool,
    format: String,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// JSON envelope the model is asked to answer with
#[derive(Debug, Clone, Deserialize)]
struct TranslationResult {
    text: String,
}

/// Translator backed by a local Ollama server
pub struct OllamaTranslator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    domain_hint: Option<String>,
    request_timeout: Duration,
}

impl OllamaTranslator {
    pub fn new(config: &TranslateConfig) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            domain_hint: config.domain_hint.clone(),
            request_timeout,
        })
    }

    fn map_request_error(&self, error: reqwest::Error) -> TarjamaError {
        if error.is_timeout() {
            TarjamaError::TranslationFailed(Cause::timeout(self.request_timeout))
        } else {
            TarjamaError::translation(format!("HTTP request failed: {}", error))
        }
    }
}

#[async_trait]
impl TranslationService for OllamaTranslator {
    async fn translate(&self, subtitle_text: &str, source_language: &str, target_language: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            system: format!(
                "{}\nAnswer with JSON of the form {{\"text\": \"<translated SRT>\"}}.",
                system_prompt(source_language, target_language, self.domain_hint.as_deref())
            ),
            prompt: subtitle_text.to_string(),
            stream: false,
            format: "json".to_string(),
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let url = format!("{}/api/generate", self.endpoint);
        debug!("Sending translation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(TarjamaError::translation(format!(
                "Ollama API error {}: {}",
                status, error_text
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TarjamaError::translation(format!("Failed to parse response: {}", e)))?;

        let raw_response = generated.response.trim();
        debug!("Raw Ollama response: {}", raw_response);
        if raw_response.is_empty() {
            return Err(TarjamaError::translation("Empty translation received"));
        }

        // Models do not always honour the JSON envelope; take the raw text then
        match serde_json::from_str::<TranslationResult>(raw_response) {
            Ok(result) => Ok(result.text),
            Err(_) => Ok(raw_response.to_string()),
        }
    }

    async fn check_availability(&self) -> Result<()> {
        let url = format!("{}/api/show", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": self.model }))
            .send()
            .await
            .map_err(|e| TarjamaError::translation(format!("Failed to connect to Ollama: {}", e)))?;

        if response.status().is_success() {
            info!("Ollama model '{}' is available", self.model);
            Ok(())
        } else {
            Err(TarjamaError::translation(format!(
                "Ollama model '{}' not found. Please pull the model first: ollama pull {}",
                self.model, self.model
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn translator(endpoint: &str) -> OllamaTranslator {
        let config = TranslateConfig {
            endpoint: endpoint.to_string(),
            model: "llama3".to_string(),
            ..TranslateConfig::default()
        };
        OllamaTranslator::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_json_envelope_is_unwrapped() {
        let mut server = Server::new_async().await;
        let srt_en = "1\n00:00:00,000 --> 00:00:01,000\nHello\n";
        let envelope = json!({ "text": srt_en }).to_string();
        let _mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(json!({"model": "llama3", "stream": false, "format": "json"})))
            .with_status(200)
            .with_body(json!({ "response": envelope, "done": true }).to_string())
            .create_async()
            .await;

        let answer = translator(&server.url()).translate("1\n...", "ar", "en").await.unwrap();
        assert_eq!(answer, srt_en);
    }

    #[tokio::test]
    async fn test_plain_answer_is_passed_through() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(json!({ "response": "1\n00:00:00,000 --> 00:00:01,000\nHello", "done": true }).to_string())
            .create_async()
            .await;

        let answer = translator(&server.url()).translate("1\n...", "ar", "en").await.unwrap();
        assert!(answer.ends_with("Hello"));
    }

    #[tokio::test]
    async fn test_missing_model_fails_availability() {
        let mut server = Server::new_async().await;
        let _mock = server.mock("POST", "/api/show").with_status(404).create_async().await;

        let err = translator(&server.url()).check_availability().await.unwrap_err();
        assert!(err.to_string().contains("ollama pull llama3"));
    }
}
