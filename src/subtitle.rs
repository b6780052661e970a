use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tokio::fs;
use tracing::info;

use crate::error::{Result, TarjamaError};

static TIMING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})")
        .expect("timing regex is valid")
});

/// One timed subtitle entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub index: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// A parsed subtitle track. Used for both the transcript and its translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtitles {
    pub language: String,
    pub cues: Vec<Cue>,
}

impl Subtitles {
    pub fn new<S: Into<String>>(language: S, cues: Vec<Cue>) -> Self {
        Self {
            language: language.into(),
            cues,
        }
    }

    pub fn parse<S: Into<String>>(language: S, content: &str) -> Result<Self> {
        Ok(Self::new(language, parse_srt(content)?))
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn to_srt(&self) -> String {
        render_srt(&self.cues)
    }

    pub async fn read<S: Into<String>, P: AsRef<Path>>(language: S, path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).await?;
        Self::parse(language, &content)
    }

    /// Write the track as SRT.
    pub async fn write<P: AsRef<Path>>(&self, output_path: P) -> Result<()> {
        let output_path = output_path.as_ref();
        info!("Writing {} cues to {}", self.cues.len(), output_path.display());
        fs::write(output_path, self.to_srt()).await?;
        Ok(())
    }

    /// Check that `other` has exactly the same cue indices and timings.
    pub fn check_same_structure(&self, other: &Subtitles) -> std::result::Result<(), String> {
        if self.cues.len() != other.cues.len() {
            return Err(format!(
                "expected {} cues, got {}",
                self.cues.len(),
                other.cues.len()
            ));
        }
        for (expected, actual) in self.cues.iter().zip(&other.cues) {
            if expected.index != actual.index {
                return Err(format!("expected cue {}, got cue {}", expected.index, actual.index));
            }
            if expected.start_ms != actual.start_ms || expected.end_ms != actual.end_ms {
                return Err(format!(
                    "cue {} timing changed from {} --> {} to {} --> {}",
                    expected.index,
                    format_srt_time(expected.start_ms),
                    format_srt_time(expected.end_ms),
                    format_srt_time(actual.start_ms),
                    format_srt_time(actual.end_ms),
                ));
            }
        }
        Ok(())
    }
}

/// Parse SRT text into cues.
///
/// Blocks are separated by blank lines; a block is an index line, a timing
/// line and one or more text lines. Cues with empty text are kept because
/// translation must preserve the cue count.
pub fn parse_srt(content: &str) -> Result<Vec<Cue>> {
    let normalized = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in normalized.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let mut lines = block.lines();
        let index_line = lines.next().unwrap_or_default().trim();
        let index: u32 = index_line
            .parse()
            .map_err(|_| malformed(format!("expected cue index, found '{}'", index_line)))?;

        let timing_line = lines
            .next()
            .ok_or_else(|| malformed(format!("cue {} has no timing line", index)))?;
        let caps = TIMING_LINE
            .captures(timing_line.trim())
            .ok_or_else(|| malformed(format!("cue {} has a bad timing line '{}'", index, timing_line)))?;

        let start_ms = timestamp_ms(&caps, 1);
        let end_ms = timestamp_ms(&caps, 5);
        if end_ms < start_ms {
            return Err(malformed(format!("cue {} ends before it starts", index)));
        }

        let text = lines.map(str::trim_end).collect::<Vec<_>>().join("\n");
        cues.push(Cue {
            index,
            start_ms,
            end_ms,
            text,
        });
    }

    Ok(cues)
}

pub fn render_srt(cues: &[Cue]) -> String {
    let mut srt_content = String::new();

    for cue in cues {
        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            cue.index,
            format_srt_time(cue.start_ms),
            format_srt_time(cue.end_ms),
            cue.text.trim()
        ));
    }

    srt_content
}

/// Format milliseconds as SRT time (HH:MM:SS,mmm)
pub fn format_srt_time(total_milliseconds: u64) -> String {
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

fn timestamp_ms(caps: &regex::Captures, first: usize) -> u64 {
    let part = |i: usize| caps[first + i].parse::<u64>().unwrap_or(0);
    part(0) * 3_600_000 + part(1) * 60_000 + part(2) * 1_000 + part(3)
}

fn malformed(message: String) -> TarjamaError {
    TarjamaError::InvalidSubtitles(message)
}
