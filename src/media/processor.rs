use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{MediaConfig, WatermarkConfig};
use crate::error::{Result, TarjamaError};
use super::{AudioExtractor, CommandError, MediaCommandBuilder, SubtitleBurner};

/// ffmpeg-backed subtitle burner and audio extractor
#[derive(Debug, Clone)]
pub struct FfmpegProcessor {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegProcessor {
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }

    /// First line of `ffmpeg -version`
    pub async fn version_info(&self) -> Result<String> {
        let output = self
            .command_builder
            .version_check()
            .execute()
            .await
            .map_err(|e| TarjamaError::Config(format!("ffmpeg is not usable: {}", e)))?;
        Ok(output.stdout.lines().next().unwrap_or("Unknown version").to_string())
    }
}

#[async_trait]
impl SubtitleBurner for FfmpegProcessor {
    async fn embed(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
        watermark: &WatermarkConfig,
    ) -> Result<PathBuf> {
        info!(
            "Embedding subtitles from {} into {} -> {}",
            subtitle_path.display(),
            video_path.display(),
            output_path.display()
        );

        let command = self.command_builder.embed_subtitles(
            video_path,
            subtitle_path,
            output_path,
            watermark,
            &self.config.video_codec,
            &self.config.subtitle_options,
        );

        command.execute().await.map_err(|e| match &e {
            CommandError::Exited { code, .. } => TarjamaError::embed(
                format!("ffmpeg exited with code {}", code.map_or("unknown".to_string(), |c| c.to_string())),
                e.diagnostics(),
            ),
            CommandError::Spawn { .. } => TarjamaError::embed(e.to_string(), ""),
        })?;

        info!("Subtitle embedding completed successfully");
        Ok(output_path.to_path_buf())
    }

    async fn check_availability(&self) -> Result<()> {
        let version = self.version_info().await?;
        info!("Media processor is available: {}", version);
        Ok(())
    }
}

#[async_trait]
impl AudioExtractor for FfmpegProcessor {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());

        self.command_builder
            .extract_audio(video_path, audio_path)
            .execute()
            .await
            .map_err(|e| TarjamaError::transcription(format!("{}\n{}", e, e.diagnostics())))?;

        info!("Audio extraction completed");
        Ok(())
    }
}
