// Speech-to-text
//
// Transcription services are interchangeable behind `TranscriptionService`:
// - OpenAi: hosted audio transcription endpoint
// - WhisperCpp: local whisper.cpp command line tool
//
// Every service takes audio bytes plus a language hint and answers with SRT
// text. `transcribe_media` is the stage adapter: it enforces the upload limit,
// owns the timeout and turns the answer into cues. It does not write files.

pub mod openai;
pub mod whisper_cpp;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::{TranscriberBackend, TranscriberConfig};
use crate::error::{Result, TarjamaError};
use crate::subtitle::Subtitles;
use crate::workflow::Stage;

pub use openai::OpenAiTranscriber;
pub use whisper_cpp::WhisperCppTranscriber;

/// Main trait for transcription operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe `audio` (the contents of `file_name`) into SRT text
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str, source_language: &str) -> Result<String>;

    /// Largest payload the service accepts, if it has a limit
    fn max_upload_bytes(&self) -> Option<u64> {
        None
    }
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    pub fn create_transcriber(config: &TranscriberConfig) -> Result<Box<dyn TranscriptionService>> {
        Ok(match config.backend {
            TranscriberBackend::OpenAi => Box::new(OpenAiTranscriber::new(config)?),
            TranscriberBackend::WhisperCpp => Box::new(WhisperCppTranscriber::new(config)),
        })
    }
}

/// Transcribe stage.
///
/// Fails with `TranscriptionFailed` when the file is unreadable or larger than
/// the service accepts, when the service errors or runs past `timeout`, and
/// when its answer is not SRT or holds no cues.
pub async fn transcribe_media(
    service: &dyn TranscriptionService,
    media_path: &Path,
    source_language: &str,
    timeout: Duration,
) -> Result<Subtitles> {
    let size = tokio::fs::metadata(media_path)
        .await
        .map_err(|e| TarjamaError::transcription(format!("cannot read {}: {}", media_path.display(), e)))?
        .len();
    if let Some(limit) = service.max_upload_bytes() {
        if size > limit {
            return Err(TarjamaError::transcription(format!(
                "{} is {} bytes, over the {} byte upload limit",
                media_path.display(),
                size,
                limit
            )));
        }
    }

    let audio = tokio::fs::read(media_path)
        .await
        .map_err(|e| TarjamaError::transcription(format!("cannot read {}: {}", media_path.display(), e)))?;
    let file_name = media_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    info!("Transcribing {} ({} bytes, language {})", media_path.display(), size, source_language);
    let srt = match tokio::time::timeout(timeout, service.transcribe(audio, &file_name, source_language)).await {
        Ok(Ok(srt)) => srt,
        Ok(Err(e)) => return Err(e.for_stage(Stage::Transcribing)),
        Err(_) => return Err(TarjamaError::timed_out(Stage::Transcribing, timeout)),
    };

    let transcript = Subtitles::parse(source_language, &srt).map_err(|e| e.for_stage(Stage::Transcribing))?;
    if transcript.is_empty() {
        return Err(TarjamaError::transcription("service returned no subtitle cues"));
    }
    info!("Transcript has {} cues", transcript.len());
    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Cause;
    use std::fs;

    const SRT: &str = "1\n00:00:00,000 --> 00:00:02,000\nمرحبا\n\n2\n00:00:02,000 --> 00:00:04,000\nكيف حالك\n";

    fn media(bytes: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip_audio.mp3");
        fs::write(&path, bytes).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_transcript_is_parsed() {
        let (_dir, path) = media(b"ID3 audio");
        let mut service = MockTranscriptionService::new();
        service.expect_max_upload_bytes().return_const(Some(1024u64));
        service
            .expect_transcribe()
            .withf(|audio, name, lang| audio == b"ID3 audio" && name == "clip_audio.mp3" && lang == "ar")
            .times(1)
            .returning(|_, _, _| Ok(SRT.to_string()));

        let transcript = transcribe_media(&service, &path, "ar", Duration::from_secs(5)).await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.language, "ar");
        assert_eq!(transcript.cues[1].text, "كيف حالك");
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let (_dir, path) = media(&[0u8; 64]);
        let mut service = MockTranscriptionService::new();
        service.expect_max_upload_bytes().return_const(Some(16u64));
        service.expect_transcribe().times(0);

        let err = transcribe_media(&service, &path, "ar", Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("upload limit"));
    }

    #[tokio::test]
    async fn test_timeout_is_transcription_failure() {
        let (_dir, path) = media(b"audio");
        let mut service = MockTranscriptionService::new();
        service.expect_max_upload_bytes().return_const(None::<u64>);
        service.expect_transcribe().returning(|_, _, _| {
            Err(TarjamaError::TranscriptionFailed(Cause::Timeout { secs: 600 }))
        });

        let err = transcribe_media(&service, &path, "ar", Duration::from_secs(5)).await.unwrap_err();
        match err {
            TarjamaError::TranscriptionFailed(cause) => assert!(cause.is_timeout()),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_and_empty_answers_fail() {
        let (_dir, path) = media(b"audio");
        let mut service = MockTranscriptionService::new();
        service.expect_max_upload_bytes().return_const(None::<u64>);
        let mut answers = vec![String::new(), "I could not hear anything".to_string()];
        service.expect_transcribe().times(2).returning(move |_, _, _| Ok(answers.pop().unwrap()));

        for _ in 0..2 {
            let err = transcribe_media(&service, &path, "ar", Duration::from_secs(5)).await.unwrap_err();
            assert!(matches!(err, TarjamaError::TranscriptionFailed(_)));
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_transcription_failure() {
        let dir = tempfile::tempdir().unwrap();
        let service = MockTranscriptionService::new();
        let err = transcribe_media(&service, &dir.path().join("nope.mp3"), "ar", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TarjamaError::TranscriptionFailed(_)));
    }
}
