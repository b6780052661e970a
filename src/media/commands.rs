use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::WatermarkConfig;

/// Abstract external tool invocation (ffmpeg, yt-dlp, whisper-cli)
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

/// Captured output of a successful run
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{description}: failed to start {binary}: {source}")]
    Spawn {
        description: String,
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{description} exited with code {code:?}")]
    Exited {
        description: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl CommandError {
    /// Diagnostic stream of the failed process, verbatim minus trailing whitespace.
    pub fn diagnostics(&self) -> &str {
        match self {
            Self::Spawn { .. } => "",
            Self::Exited { stderr, .. } => stderr.trim_end(),
        }
    }
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add a path argument
    pub fn path<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").path(path)
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.path(path)
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy audio stream
    pub fn copy_audio(self) -> Self {
        self.audio_codec("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Run to completion, capturing stdout and stderr.
    ///
    /// The child is killed if the returned future is dropped, so wrapping this
    /// in `tokio::time::timeout` also stops the process.
    pub async fn execute(&self) -> Result<CommandOutput, CommandError> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                description: self.description.clone(),
                binary: self.binary_path.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(CommandError::Exited {
                description: self.description.clone(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Builder for the ffmpeg invocations the pipeline needs
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build the subtitle burn-in command: rendered subtitles plus a watermark
    /// overlay, re-encoded video, untouched audio.
    pub fn embed_subtitles(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
        watermark: &WatermarkConfig,
        video_codec: &str,
        additional_options: &[String],
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Subtitle embedding")
            .overwrite()
            .input(video_path)
            .video_filter(subtitle_filter_graph(subtitle_path, watermark))
            .video_codec(video_codec)
            .copy_audio()
            .args(additional_options.iter().cloned())
            .output(output_path)
    }

    /// Build audio extraction command: mono 16 kHz mp3, small enough to upload
    pub fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio extraction")
            .overwrite()
            .input(video_path)
            .no_video()
            .audio_channels(1)
            .audio_sample_rate(16000)
            .audio_codec("libmp3lame")
            .audio_bitrate("32k")
            .output(audio_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}

/// `subtitles=...,drawtext=...` with every value escaped for both the option
/// level and the filtergraph level.
pub fn subtitle_filter_graph(subtitle_path: &Path, watermark: &WatermarkConfig) -> String {
    let force_style = format!(
        "Fontname={},FontSize={},MarginV={}",
        watermark.font_name, watermark.font_size, watermark.subtitle_margin_v
    );
    let subtitles = filter(
        "subtitles",
        &[
            ("filename", subtitle_path.to_string_lossy().into_owned()),
            ("force_style", force_style),
        ],
    );

    let mut drawtext_options = vec![
        ("text", watermark.text.clone()),
        ("expansion", "none".to_string()),
        ("x", watermark.x.clone()),
        ("y", watermark.y.clone()),
        ("fontsize", watermark.font_size.to_string()),
        ("fontcolor", watermark.font_color.clone()),
    ];
    match &watermark.font_file {
        Some(font_file) => drawtext_options.push(("fontfile", font_file.clone())),
        None => drawtext_options.push(("font", watermark.font_name.clone())),
    }
    let drawtext = filter("drawtext", &drawtext_options);

    format!("{},{}", subtitles, drawtext)
}

fn filter(name: &str, options: &[(&str, String)]) -> String {
    let options = options
        .iter()
        .map(|(key, value)| format!("{}={}", key, escape_option_value(value)))
        .collect::<Vec<_>>()
        .join(":");
    escape_graph(&format!("{}={}", name, options))
}

fn escape_option_value(value: &str) -> String {
    escape_chars(value, &['\\', '\'', ':'])
}

fn escape_graph(filter: &str) -> String {
    escape_chars(filter, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_chars(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
