// whisper.cpp command line transcription
//
// The audio is written to a scratch directory and whisper-cli is asked for
// SRT output next to it (`-osrt -of <prefix>`), which is read back verbatim.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

use crate::config::TranscriberConfig;
use crate::error::{Result, TarjamaError};
use crate::media::MediaCommand;
use super::TranscriptionService;

const OUTPUT_PREFIX: &str = "transcript";

pub struct WhisperCppTranscriber {
    binary_path: String,
    model_path: String,
}

impl WhisperCppTranscriber {
    pub fn new(config: &TranscriberConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            model_path: config.model_path.clone(),
        }
    }

    fn transcription_command(&self, input: &Path, output_prefix: &Path, language: &str) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Transcription")
            .arg("-m")
            .arg(&self.model_path)
            .arg("-l")
            .arg(language)
            .arg("-np")
            .arg("-osrt")
            .arg("-of")
            .path(output_prefix)
            .arg("-f")
            .path(input)
    }
}

#[async_trait]
impl TranscriptionService for WhisperCppTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str, source_language: &str) -> Result<String> {
        let scratch = tempfile::tempdir()
            .map_err(|e| TarjamaError::transcription(format!("Failed to create temp directory: {}", e)))?;
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav");
        let input = scratch.path().join(format!("input.{}", extension));
        tokio::fs::write(&input, &audio).await?;

        let prefix = scratch.path().join(OUTPUT_PREFIX);
        info!("Running whisper.cpp on {} with model {}", file_name, self.model_path);
        let output = self
            .transcription_command(&input, &prefix, source_language)
            .execute()
            .await
            .map_err(|e| TarjamaError::transcription(format!("{}\n{}", e, e.diagnostics())))?;
        debug!("whisper.cpp stderr: {}", output.stderr.trim_end());

        let srt_path = prefix.with_extension("srt");
        tokio::fs::read_to_string(&srt_path).await.map_err(|e| {
            TarjamaError::transcription(format!("whisper.cpp wrote no SRT at {}: {}", srt_path.display(), e))
        })
    }
}
