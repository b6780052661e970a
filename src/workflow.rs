use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, StageError, TarjamaError};
use crate::fetch::{fetch_media, FetcherFactory, MediaFetcher};
use crate::manifest::RunManifest;
use crate::media::{burn_subtitles, extract_audio_track, AudioExtractor, FfmpegProcessor, SubtitleBurner};
use crate::naming::ArtifactPaths;
use crate::progress::{NoopReporter, ProgressReporter};
use crate::subtitle::Subtitles;
use crate::transcribe::{transcribe_media, TranscriberFactory, TranscriptionService};
use crate::translate::{translate_subtitles, TranslationService, TranslatorFactory};

/// Pipeline stages, in the only order they ever run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Transcribing,
    Translating,
    Embedding,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Fetching,
        Stage::Transcribing,
        Stage::Translating,
        Stage::Embedding,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "Fetching",
            Stage::Transcribing => "Transcribing",
            Stage::Translating => "Translating",
            Stage::Embedding => "Embedding",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation, observed between stages only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The external capabilities a run depends on
pub struct Collaborators {
    pub fetcher: Box<dyn MediaFetcher>,
    pub transcriber: Box<dyn TranscriptionService>,
    pub translator: Box<dyn TranslationService>,
    pub burner: Box<dyn SubtitleBurner>,
    /// Used ahead of transcription when `transcriber.extract_audio` is set
    pub audio_extractor: Option<Box<dyn AudioExtractor>>,
}

impl Collaborators {
    pub fn from_config(config: &Config) -> Result<Self> {
        let processor = FfmpegProcessor::new(config.media.clone());
        Ok(Self {
            fetcher: FetcherFactory::create_fetcher(&config.fetch)?,
            transcriber: TranscriberFactory::create_transcriber(&config.transcriber)?,
            translator: TranslatorFactory::create_translator(&config.translate)?,
            burner: Box::new(processor.clone()),
            audio_extractor: Some(Box::new(processor)),
        })
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub source_url: String,
    pub run_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub artifacts: ArtifactPaths,
    pub transcript_cues: usize,
    /// Stages whose artifacts were kept from an earlier run
    pub skipped: Vec<Stage>,
}

/// Stable per-source directory name: first 16 hex digits of SHA-256(url)
pub fn run_key(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.trim().as_bytes()));
    digest[..16].to_string()
}

pub struct Workflow {
    config: Config,
    collaborators: Collaborators,
    cancel: CancelToken,
}

impl Workflow {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            cancel: CancelToken::new(),
        }
    }

    /// Validate `config` and build the collaborators it names
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::new(config, collaborators))
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Check that every external tool and service is usable
    pub async fn check_availability(&self) -> Result<()> {
        self.collaborators.fetcher.check_availability().await?;
        self.collaborators.translator.check_availability().await?;
        self.collaborators.burner.check_availability().await?;
        Ok(())
    }

    /// Directory holding every artifact of the run for `url`
    pub fn run_dir(&self, url: &str) -> PathBuf {
        let output_dir = &self.config.pipeline.output_dir;
        if self.config.pipeline.per_run_subdir {
            output_dir.join(run_key(url))
        } else {
            output_dir.clone()
        }
    }

    fn timeout(&self, stage: Stage) -> Duration {
        self.config.pipeline.timeout_for(stage)
    }

    /// Run all four stages for `url`, starting from Fetching.
    pub async fn run(&self, url: &str) -> std::result::Result<RunReport, StageError> {
        self.run_with(url, &NoopReporter, false).await
    }

    /// Run all four stages for `url`.
    ///
    /// With `resume`, stages recorded in the run manifest whose artifacts
    /// still exist are skipped, up to the first incomplete one.
    pub async fn run_with(
        &self,
        url: &str,
        reporter: &dyn ProgressReporter,
        resume: bool,
    ) -> std::result::Result<RunReport, StageError> {
        let result = self.execute(url, reporter, resume).await;
        match &result {
            Ok(report) => {
                info!("Run for {} finished: {}", url, report.artifacts.output_video.display());
                reporter.run_finished(report);
            }
            Err(e) => {
                warn!("Run for {} halted: {}", url, e);
                reporter.run_failed(e);
            }
        }
        result
    }

    async fn execute(
        &self,
        url: &str,
        reporter: &dyn ProgressReporter,
        resume: bool,
    ) -> std::result::Result<RunReport, StageError> {
        let source_language = self.config.transcriber.source_language.as_str();
        let target_language = self.config.translate.target_language.as_str();
        let run_dir = self.run_dir(url);
        info!("Starting run for {} in {}", url, run_dir.display());

        let mut manifest = self.open_manifest(url, &run_dir, resume).await;
        let mut resuming = resume;
        let mut skipped = Vec::new();

        self.checkpoint(Stage::Fetching)?;
        let media = match kept_artifact(&manifest, Stage::Fetching, resuming) {
            Some(path) => {
                reporter.stage_skipped(Stage::Fetching, &path);
                skipped.push(Stage::Fetching);
                path
            }
            None => {
                resuming = false;
                manifest.invalidate_from(Stage::Fetching);
                reporter.stage_started(Stage::Fetching);
                let path = self
                    .fetch(url, &run_dir)
                    .await
                    .map_err(|e| StageError::new(Stage::Fetching, e))?;
                self.complete(&mut manifest, &run_dir, Stage::Fetching, &path, reporter).await?;
                path
            }
        };
        let paths = ArtifactPaths::derive(&media, source_language, target_language)
            .map_err(|e| StageError::new(Stage::Transcribing, e))?;

        self.checkpoint(Stage::Transcribing)?;
        let kept = match kept_artifact(&manifest, Stage::Transcribing, resuming) {
            Some(path) => read_kept(source_language, &path).await.map(|t| (path, t)),
            None => None,
        };
        let transcript = match kept {
            Some((path, transcript)) => {
                reporter.stage_skipped(Stage::Transcribing, &path);
                skipped.push(Stage::Transcribing);
                transcript
            }
            None => {
                resuming = false;
                manifest.invalidate_from(Stage::Transcribing);
                reporter.stage_started(Stage::Transcribing);
                let transcript = self
                    .transcribe_into(&media, &paths.audio, &paths.source_subtitles)
                    .await
                    .map_err(|e| StageError::new(Stage::Transcribing, e))?;
                self.complete(&mut manifest, &run_dir, Stage::Transcribing, &paths.source_subtitles, reporter)
                    .await?;
                transcript
            }
        };

        self.checkpoint(Stage::Translating)?;
        let kept = match kept_artifact(&manifest, Stage::Translating, resuming) {
            Some(path) => match read_kept(target_language, &path).await {
                Some(translation) => match transcript.check_same_structure(&translation) {
                    Ok(()) => Some(path),
                    Err(reason) => {
                        warn!("Not reusing {}: it no longer matches the transcript ({})", path.display(), reason);
                        None
                    }
                },
                None => None,
            },
            None => None,
        };
        let translation_path = match kept {
            Some(path) => {
                reporter.stage_skipped(Stage::Translating, &path);
                skipped.push(Stage::Translating);
                path
            }
            None => {
                resuming = false;
                manifest.invalidate_from(Stage::Translating);
                reporter.stage_started(Stage::Translating);
                self.translate_into(&transcript, &paths.translated_subtitles)
                    .await
                    .map_err(|e| StageError::new(Stage::Translating, e))?;
                self.complete(&mut manifest, &run_dir, Stage::Translating, &paths.translated_subtitles, reporter)
                    .await?;
                paths.translated_subtitles.clone()
            }
        };

        self.checkpoint(Stage::Embedding)?;
        match kept_artifact(&manifest, Stage::Embedding, resuming) {
            Some(path) => {
                reporter.stage_skipped(Stage::Embedding, &path);
                skipped.push(Stage::Embedding);
            }
            None => {
                manifest.invalidate_from(Stage::Embedding);
                reporter.stage_started(Stage::Embedding);
                let output = self
                    .embed(&media, &translation_path, &paths.output_video)
                    .await
                    .map_err(|e| StageError::new(Stage::Embedding, e))?;
                self.complete(&mut manifest, &run_dir, Stage::Embedding, &output, reporter).await?;
            }
        }

        Ok(RunReport {
            source_url: url.to_string(),
            manifest_path: RunManifest::path_in(&run_dir),
            run_dir,
            artifacts: paths,
            transcript_cues: transcript.len(),
            skipped,
        })
    }

    /// Run independent sources concurrently, at most `jobs` at a time.
    /// Results come back in the order of `urls`.
    pub async fn run_batch(&self, urls: &[String], jobs: usize) -> Vec<std::result::Result<RunReport, StageError>> {
        self.run_batch_with(urls, jobs, false, |_| Box::new(NoopReporter) as Box<dyn ProgressReporter>)
            .await
    }

    pub async fn run_batch_with<F>(
        &self,
        urls: &[String],
        jobs: usize,
        resume: bool,
        make_reporter: F,
    ) -> Vec<std::result::Result<RunReport, StageError>>
    where
        F: Fn(&str) -> Box<dyn ProgressReporter>,
    {
        if !self.config.pipeline.per_run_subdir && jobs > 1 {
            warn!("pipeline.per_run_subdir is off; concurrent runs share one directory and manifest");
        }

        // Two runs of one source would write the same files
        let mut seen = HashSet::new();
        let duplicates: Vec<bool> = urls.iter().map(|url| !seen.insert(run_key(url))).collect();

        let make_reporter = &make_reporter;
        stream::iter(urls.iter().zip(duplicates))
            .map(|(url, duplicate)| async move {
                if duplicate {
                    return Err(StageError::new(
                        Stage::Fetching,
                        TarjamaError::fetch(format!("{} appears earlier in this batch", url)),
                    ));
                }
                let reporter = make_reporter(url);
                self.run_with(url, reporter.as_ref(), resume).await
            })
            .buffered(jobs.max(1))
            .collect()
            .await
    }

    /// Fetch stage on its own: download `url` into `dest_dir`
    pub async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        fetch_media(
            self.collaborators.fetcher.as_ref(),
            url,
            dest_dir,
            self.timeout(Stage::Fetching),
        )
        .await
    }

    /// Transcribe stage on its own: transcribe `media` and write SRT to `output`
    pub async fn transcribe(&self, media: &Path, output: &Path) -> Result<Subtitles> {
        let paths = ArtifactPaths::derive(
            media,
            &self.config.transcriber.source_language,
            &self.config.translate.target_language,
        )?;
        self.transcribe_into(media, &paths.audio, output).await
    }

    /// Translate stage on its own: translate the SRT at `input` into `output`
    pub async fn translate(&self, input: &Path, output: &Path) -> Result<Subtitles> {
        let source = Subtitles::read(&self.config.transcriber.source_language, input).await?;
        self.translate_into(&source, output).await
    }

    /// Embed stage on its own: burn `subtitles` into `video`, writing `output`
    pub async fn embed(&self, video: &Path, subtitles: &Path, output: &Path) -> Result<PathBuf> {
        burn_subtitles(
            self.collaborators.burner.as_ref(),
            video,
            subtitles,
            output,
            &self.config.media.watermark,
            self.timeout(Stage::Embedding),
        )
        .await
    }

    /// Extraction and upload each get the full transcribe timeout.
    async fn transcribe_into(&self, media: &Path, audio: &Path, output: &Path) -> Result<Subtitles> {
        let timeout = self.timeout(Stage::Transcribing);
        let upload = match (&self.collaborators.audio_extractor, self.config.transcriber.extract_audio) {
            (Some(extractor), true) => extract_audio_track(extractor.as_ref(), media, audio, timeout).await?,
            _ => media.to_path_buf(),
        };

        let transcript = transcribe_media(
            self.collaborators.transcriber.as_ref(),
            &upload,
            &self.config.transcriber.source_language,
            timeout,
        )
        .await?;
        transcript.write(output).await?;
        Ok(transcript)
    }

    async fn translate_into(&self, source: &Subtitles, output: &Path) -> Result<Subtitles> {
        let translation = translate_subtitles(
            self.collaborators.translator.as_ref(),
            source,
            &self.config.translate.target_language,
            self.config.translate.cues_per_request,
            self.timeout(Stage::Translating),
        )
        .await?;
        translation.write(output).await?;
        Ok(translation)
    }

    async fn open_manifest(&self, url: &str, run_dir: &Path, resume: bool) -> RunManifest {
        let source_language = &self.config.transcriber.source_language;
        let target_language = &self.config.translate.target_language;
        if resume {
            match RunManifest::load_in(run_dir).await {
                Ok(Some(manifest)) if manifest.matches(url, source_language, target_language) => {
                    info!(
                        "Resuming run {} (last completed stage: {:?})",
                        manifest.id,
                        manifest.last_completed()
                    );
                    return manifest;
                }
                Ok(Some(_)) => warn!(
                    "Manifest in {} describes another source or language pair; starting over",
                    run_dir.display()
                ),
                Ok(None) => info!("No earlier run in {}; starting from the beginning", run_dir.display()),
                Err(e) => warn!("Ignoring unreadable manifest in {}: {}", run_dir.display(), e),
            }
        }
        RunManifest::new(url, source_language, target_language)
    }

    async fn complete(
        &self,
        manifest: &mut RunManifest,
        run_dir: &Path,
        stage: Stage,
        artifact: &Path,
        reporter: &dyn ProgressReporter,
    ) -> std::result::Result<(), StageError> {
        manifest.record(stage, artifact);
        manifest
            .save(run_dir)
            .await
            .map_err(|e| StageError::new(stage, e))?;
        info!("{} complete: {}", stage, artifact.display());
        reporter.stage_finished(stage, artifact);
        Ok(())
    }

    fn checkpoint(&self, next: Stage) -> std::result::Result<(), StageError> {
        if self.cancel.is_cancelled() {
            info!("Cancelled before {}", next);
            return Err(StageError::new(next, TarjamaError::Cancelled));
        }
        Ok(())
    }
}

/// Artifact recorded for `stage` that still exists, while still resuming
fn kept_artifact(manifest: &RunManifest, stage: Stage, resuming: bool) -> Option<PathBuf> {
    if !resuming {
        return None;
    }
    manifest
        .artifact(stage)
        .filter(|path| path.is_file())
        .map(Path::to_path_buf)
}

async fn read_kept(language: &str, path: &Path) -> Option<Subtitles> {
    match Subtitles::read(language, path).await {
        Ok(subtitles) if !subtitles.is_empty() => Some(subtitles),
        Ok(_) => None,
        Err(e) => {
            warn!("Not reusing {}: {}", path.display(), e);
            None
        }
    }
}
