// OpenAI audio transcription endpoint
//
// POST {endpoint}/audio/transcriptions as multipart form data, asking for SRT
// output directly so no intermediate segment format is needed.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::TranscriberConfig;
use crate::error::{Cause, Result, TarjamaError};
use super::TranscriptionService;

pub struct OpenAiTranscriber {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_upload_bytes: u64,
    request_timeout: Duration,
}

impl OpenAiTranscriber {
    pub fn new(config: &TranscriberConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| TarjamaError::Config("OpenAI transcription needs an API key".to_string()))?;
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_upload_bytes: config.max_upload_bytes,
            request_timeout,
        })
    }

    fn map_request_error(&self, error: reqwest::Error) -> TarjamaError {
        if error.is_timeout() {
            TarjamaError::TranscriptionFailed(Cause::timeout(self.request_timeout))
        } else {
            TarjamaError::transcription(error.to_string())
        }
    }
}

#[async_trait]
impl TranscriptionService for OpenAiTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str, source_language: &str) -> Result<String> {
        let url = format!("{}/audio/transcriptions", self.endpoint);
        debug!("Uploading {} ({} bytes) to {}", file_name, audio.len(), url);

        let file = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_type(file_name))
            .map_err(|e| TarjamaError::transcription(e.to_string()))?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "srt")
            .text("language", source_language.to_string());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_request_error(e))?;
        if !status.is_success() {
            return Err(TarjamaError::transcription(format!(
                "transcription service returned {}: {}",
                status,
                body.trim()
            )));
        }
        Ok(body)
    }

    fn max_upload_bytes(&self) -> Option<u64> {
        Some(self.max_upload_bytes)
    }
}

fn mime_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("webm") => "video/webm",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn transcriber(endpoint: &str) -> OpenAiTranscriber {
        let config = TranscriberConfig {
            endpoint: endpoint.to_string(),
            api_key: Some("sk-test".to_string()),
            ..TranscriberConfig::default()
        };
        OpenAiTranscriber::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_uploads_multipart_and_returns_srt() {
        let mut server = Server::new_async().await;
        let srt = "1\n00:00:00,000 --> 00:00:01,000\nمرحبا\n";
        let mock = server
            .mock("POST", "/audio/transcriptions")
            .match_header("authorization", "Bearer sk-test")
            .match_header("content-type", Matcher::Regex("multipart/form-data".to_string()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("whisper-1".to_string()),
                Matcher::Regex("clip_audio.mp3".to_string()),
                Matcher::Regex("srt".to_string()),
            ]))
            .with_status(200)
            .with_body(srt)
            .create_async()
            .await;

        let result = transcriber(&server.url())
            .transcribe(b"ID3".to_vec(), "clip_audio.mp3", "ar")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, srt);
    }

    #[tokio::test]
    async fn test_service_error_is_transcription_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/transcriptions")
            .with_status(400)
            .with_body(r#"{"error":{"message":"Invalid file format."}}"#)
            .create_async()
            .await;

        let err = transcriber(&server.url())
            .transcribe(b"junk".to_vec(), "clip.xyz", "ar")
            .await
            .unwrap_err();
        match err {
            TarjamaError::TranscriptionFailed(cause) => {
                assert!(cause.to_string().contains("Invalid file format"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let result = OpenAiTranscriber::new(&TranscriberConfig::default());
        assert!(matches!(result, Err(TarjamaError::Config(_))));
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type("a.MP3"), "audio/mpeg");
        assert_eq!(mime_type("a.mp4"), "video/mp4");
        assert_eq!(mime_type("a"), "application/octet-stream");
    }
}
