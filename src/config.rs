use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TarjamaError};
use crate::workflow::Stage;

pub const DEFAULT_CONFIG_FILE: &str = "tarjama.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub transcriber: TranscriberConfig,
    pub translate: TranslateConfig,
    pub media: MediaConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetcherBackend {
    /// Resolve the page with yt-dlp and download one stream variant
    YtDlp,
    /// Treat the URL as a direct link to a media file
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub backend: FetcherBackend,
    /// Path to the yt-dlp binary
    pub binary_path: String,
    /// Container every downloaded variant must use (e.g. "mp4")
    pub container: String,
    /// Reject variants without an audio track
    pub require_audio: bool,
    /// Reject variants without a video track
    pub require_video: bool,
    /// Extra arguments passed to yt-dlp verbatim
    pub extra_args: Vec<String>,
    /// HTTP request timeout for direct downloads
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            backend: FetcherBackend::YtDlp,
            binary_path: "yt-dlp".to_string(),
            container: "mp4".to_string(),
            require_audio: true,
            require_video: true,
            extra_args: Vec::new(),
            request_timeout_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriberBackend {
    /// OpenAI audio transcription endpoint
    OpenAi,
    /// Local whisper.cpp command line tool
    WhisperCpp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    pub backend: TranscriberBackend,
    /// Language spoken in the source media
    pub source_language: String,
    /// Base URL of the OpenAI-compatible API
    pub endpoint: String,
    /// Model name sent to the API
    pub model: String,
    /// API key; usually supplied through OPENAI_API_KEY
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Path to the whisper.cpp binary (e.g., whisper-cli)
    pub binary_path: String,
    /// Path to the whisper.cpp model file
    pub model_path: String,
    /// Largest upload the service accepts
    pub max_upload_bytes: u64,
    /// Upload a compact audio track instead of the whole video
    pub extract_audio: bool,
    pub request_timeout_secs: u64,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            backend: TranscriberBackend::OpenAi,
            source_language: "ar".to_string(),
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "whisper-1".to_string(),
            api_key: None,
            binary_path: "whisper-cli".to_string(),
            model_path: "models/ggml-medium.bin".to_string(),
            max_upload_bytes: 25 * 1024 * 1024,
            extract_audio: true,
            request_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslatorBackend {
    /// OpenAI chat completions endpoint
    OpenAi,
    /// Local Ollama server
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    pub backend: TranslatorBackend,
    /// Language the subtitles are translated into
    pub target_language: String,
    /// Base URL of the API (OpenAI-compatible, or the Ollama server)
    pub endpoint: String,
    /// LLM model to use for translation
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Number of cues sent to the service per request
    pub cues_per_request: usize,
    pub request_timeout_secs: u64,
    /// Subject matter guidance added to the prompt, e.g.
    /// "You are trained in Islamic Arabic translation."
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_hint: Option<String>,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            backend: TranslatorBackend::OpenAi,
            target_language: "en".to_string(),
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            api_key: None,
            temperature: 0.0,
            cues_per_request: 50,
            request_timeout_secs: 300,
            domain_hint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Encoder for the re-encoded video stream
    pub video_codec: String,
    /// Additional encoding options for subtitle embedding
    /// Common options: ["-preset", "medium", "-crf", "23", "-pix_fmt", "yuv420p"]
    pub subtitle_options: Vec<String>,
    pub watermark: WatermarkConfig,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            video_codec: "libx264".to_string(),
            subtitle_options: Vec::new(),
            watermark: WatermarkConfig::default(),
        }
    }
}

/// Fixed overlay text and subtitle styling burned into every output video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub text: String,
    /// Font family used for both the subtitles and the watermark
    pub font_name: String,
    /// Font file for drawtext; fontconfig lookup by `font_name` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_file: Option<String>,
    pub font_size: u32,
    pub font_color: String,
    /// drawtext x expression
    pub x: String,
    /// drawtext y expression
    pub y: String,
    /// Vertical margin of the subtitle block, in pixels
    pub subtitle_margin_v: u32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: "tarjama".to_string(),
            font_name: "Sukhumvit Set".to_string(),
            font_file: None,
            font_size: 24,
            font_color: "white".to_string(),
            x: "10".to_string(),
            y: "h-text_h-10".to_string(),
            subtitle_margin_v: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Destination directory for all artifacts
    pub output_dir: PathBuf,
    /// Give every source its own subdirectory so concurrent runs never collide
    pub per_run_subdir: bool,
    pub fetch_timeout_secs: u64,
    pub transcribe_timeout_secs: u64,
    pub translate_timeout_secs: u64,
    pub embed_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./files"),
            per_run_subdir: true,
            fetch_timeout_secs: 1800,
            transcribe_timeout_secs: 900,
            translate_timeout_secs: 900,
            embed_timeout_secs: 3600,
        }
    }
}

impl PipelineConfig {
    pub fn timeout_for(&self, stage: Stage) -> Duration {
        let secs = match stage {
            Stage::Fetching => self.fetch_timeout_secs,
            Stage::Transcribing => self.transcribe_timeout_secs,
            Stage::Translating => self.translate_timeout_secs,
            Stage::Embedding => self.embed_timeout_secs,
        };
        Duration::from_secs(secs)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TarjamaError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| TarjamaError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TarjamaError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TarjamaError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Load from `path`, or from `tarjama.toml` in the working directory when
    /// present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// `OPENAI_API_KEY` only fills credentials the file left empty.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.transcriber.api_key.get_or_insert_with(|| key.clone());
            self.translate.api_key.get_or_insert(key);
        }
        if let Some(base_url) = lookup("TARJAMA_OPENAI_BASE_URL") {
            if self.transcriber.backend == TranscriberBackend::OpenAi {
                self.transcriber.endpoint = base_url.clone();
            }
            if self.translate.backend == TranslatorBackend::OpenAi {
                self.translate.endpoint = base_url;
            }
        }
        if let Some(text) = lookup("TARJAMA_WATERMARK_TEXT") {
            self.media.watermark.text = text;
        }
        if let Some(font) = lookup("TARJAMA_WATERMARK_FONT") {
            self.media.watermark.font_name = font;
        }
        if let Some(font_file) = lookup("TARJAMA_WATERMARK_FONT_FILE") {
            self.media.watermark.font_file = Some(font_file);
        }
        if let Some(size) = lookup("TARJAMA_WATERMARK_FONT_SIZE") {
            self.media.watermark.font_size = size.parse().map_err(|_| {
                TarjamaError::Config(format!("TARJAMA_WATERMARK_FONT_SIZE is not a number: {}", size))
            })?;
        }
        if let Some(dir) = lookup("TARJAMA_OUTPUT_DIR") {
            self.pipeline.output_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let source = self.transcriber.source_language.trim();
        let target = self.translate.target_language.trim();
        if source.is_empty() || target.is_empty() {
            return Err(TarjamaError::Config("Source and target languages must be set".to_string()));
        }
        if source.eq_ignore_ascii_case(target) {
            return Err(TarjamaError::Config(format!(
                "Source and target language are both '{}'",
                source
            )));
        }
        if self.translate.cues_per_request == 0 {
            return Err(TarjamaError::Config("translate.cues_per_request must be at least 1".to_string()));
        }
        if self.fetch.container.trim().is_empty() {
            return Err(TarjamaError::Config("fetch.container must not be empty".to_string()));
        }
        for stage in Stage::ALL {
            if self.pipeline.timeout_for(stage).is_zero() {
                return Err(TarjamaError::Config(format!("Timeout for {} must be positive", stage)));
            }
        }
        if self.transcriber.backend == TranscriberBackend::OpenAi && self.transcriber.api_key.is_none() {
            return Err(TarjamaError::Config(
                "OpenAI transcription needs an API key (set OPENAI_API_KEY)".to_string(),
            ));
        }
        if self.translate.backend == TranslatorBackend::OpenAi && self.translate.api_key.is_none() {
            return Err(TarjamaError::Config(
                "OpenAI translation needs an API key (set OPENAI_API_KEY)".to_string(),
            ));
        }
        Ok(())
    }
}
