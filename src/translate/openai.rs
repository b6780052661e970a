use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::TranslateConfig;
use crate::error::{Cause, Result, TarjamaError};
use super::{system_prompt, TranslationService};

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Translator backed by an OpenAI-compatible chat completions endpoint
pub struct OpenAiTranslator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    domain_hint: Option<String>,
    request_timeout: Duration,
}

impl OpenAiTranslator {
    pub fn new(config: &TranslateConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| TarjamaError::Config("OpenAI translation needs an API key".to_string()))?;
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
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
impl TranslationService for OpenAiTranslator {
    async fn translate(&self, subtitle_text: &str, source_language: &str, target_language: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(source_language, target_language, self.domain_hint.as_deref()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: subtitle_text.to_string(),
                },
            ],
        };

        let url = format!("{}/chat/completions", self.endpoint);
        debug!("Sending translation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(TarjamaError::translation(format!(
                "OpenAI API error {}: {}",
                status,
                error_text.trim()
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| TarjamaError::translation(format!("Failed to parse response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| TarjamaError::translation("Empty translation received"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn translator(endpoint: &str) -> OpenAiTranslator {
        let config = TranslateConfig {
            endpoint: endpoint.to_string(),
            api_key: Some("sk-test".to_string()),
            ..TranslateConfig::default()
        };
        OpenAiTranslator::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_chat_completion_request() {
        let mut server = Server::new_async().await;
        let srt_en = "1\n00:00:00,000 --> 00:00:01,000\nHello\n";
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"model": "gpt-4", "temperature": 0.0})),
                Matcher::Regex(r#""role":"system""#.to_string()),
                Matcher::Regex(r#""role":"user","content":"1\\n00:00:00,000"#.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"choices": [{"message": {"role": "assistant", "content": srt_en}}]}).to_string())
            .create_async()
            .await;

        let answer = translator(&server.url())
            .translate("1\n00:00:00,000 --> 00:00:01,000\nمرحبا\n", "ar", "en")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(answer, srt_en);
    }

    #[tokio::test]
    async fn test_domain_hint_reaches_system_message() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex(
                r#""role":"system","content":"You are a professional subtitle translator. You are trained in Islamic Arabic translation."#
                    .to_string(),
            ))
            .with_status(200)
            .with_body(json!({"choices": [{"message": {"role": "assistant", "content": "1"}}]}).to_string())
            .create_async()
            .await;

        let config = TranslateConfig {
            endpoint: server.url(),
            api_key: Some("sk-test".to_string()),
            domain_hint: Some("You are trained in Islamic Arabic translation.".to_string()),
            ..TranslateConfig::default()
        };
        OpenAiTranslator::new(&config).unwrap().translate("1", "ar", "en").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_is_translation_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limit exceeded")
            .create_async()
            .await;

        let err = translator(&server.url()).translate("x", "ar", "en").await.unwrap_err();
        match err {
            TarjamaError::TranslationFailed(cause) => assert!(cause.to_string().contains("rate limit exceeded")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_translation_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = translator(&server.url()).translate("x", "ar", "en").await.unwrap_err();
        assert!(matches!(err, TarjamaError::TranslationFailed(_)));
    }
}
