// Media processing: burning subtitles into video, pulling out an audio track.
//
// - Commands: external tool invocation and the ffmpeg command builders
// - Processor: the ffmpeg implementation of both capabilities
//
// `burn_subtitles` is the embed stage adapter the workflow calls; it owns the
// stage timeout and guarantees no partial output survives a failure.

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub use commands::*;
pub use processor::*;

use crate::config::WatermarkConfig;
use crate::error::{Result, TarjamaError};
use crate::naming::SUBTITLE_EXTENSION;
use crate::workflow::Stage;

/// Renders a subtitle file and a watermark into a new video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubtitleBurner: Send + Sync {
    /// Burn `subtitle_path` into `video_path`, writing `output_path`
    async fn embed(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
        watermark: &WatermarkConfig,
    ) -> Result<PathBuf>;

    /// Check if the burner's tooling is usable
    async fn check_availability(&self) -> Result<()> {
        Ok(())
    }
}

/// Produces a compact audio-only copy of a video for upload
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()>;
}

/// Embed stage.
///
/// Fails with `EmbedFailed` when an input is missing, the subtitle file is not
/// SRT, the burner fails or runs past `timeout`, or no output appears. On
/// failure any partial file at `output_path` is removed.
pub async fn burn_subtitles(
    burner: &dyn SubtitleBurner,
    video_path: &Path,
    subtitle_path: &Path,
    output_path: &Path,
    watermark: &WatermarkConfig,
    timeout: Duration,
) -> Result<PathBuf> {
    check_inputs(video_path, subtitle_path)?;
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let result = match tokio::time::timeout(
        timeout,
        burner.embed(video_path, subtitle_path, output_path, watermark),
    )
    .await
    {
        Ok(Ok(path)) if path.is_file() => Ok(path),
        Ok(Ok(path)) => Err(TarjamaError::embed(
            format!("burner reported success but {} does not exist", path.display()),
            "",
        )),
        Ok(Err(e)) => Err(e.for_stage(Stage::Embedding)),
        Err(_) => Err(TarjamaError::timed_out(Stage::Embedding, timeout)),
    };

    if result.is_err() {
        remove_partial_output(output_path).await;
    } else {
        info!("Output video ready: {}", output_path.display());
    }
    result
}

/// Audio extraction ahead of transcription. Failures belong to the transcribe stage.
pub async fn extract_audio_track(
    extractor: &dyn AudioExtractor,
    video_path: &Path,
    audio_path: &Path,
    timeout: Duration,
) -> Result<PathBuf> {
    match tokio::time::timeout(timeout, extractor.extract_audio(video_path, audio_path)).await {
        Ok(Ok(())) if audio_path.is_file() => Ok(audio_path.to_path_buf()),
        Ok(Ok(())) => Err(TarjamaError::transcription(format!(
            "audio extraction produced no file at {}",
            audio_path.display()
        ))),
        Ok(Err(e)) => Err(e.for_stage(Stage::Transcribing)),
        Err(_) => Err(TarjamaError::timed_out(Stage::Transcribing, timeout)),
    }
}

fn check_inputs(video_path: &Path, subtitle_path: &Path) -> Result<()> {
    if !video_path.is_file() {
        return Err(TarjamaError::embed(
            format!("video not found: {}", video_path.display()),
            "",
        ));
    }
    if !subtitle_path.is_file() {
        return Err(TarjamaError::embed(
            format!("subtitles not found: {}", subtitle_path.display()),
            "",
        ));
    }
    let is_srt = subtitle_path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SUBTITLE_EXTENSION));
    if !is_srt {
        return Err(TarjamaError::embed(
            format!("unsupported subtitle format: {}", subtitle_path.display()),
            "",
        ));
    }
    Ok(())
}

async fn remove_partial_output(output_path: &Path) {
    if output_path.exists() {
        if let Err(e) = tokio::fs::remove_file(output_path).await {
            warn!("Failed to remove partial output {}: {}", output_path.display(), e);
        }
    }
}
