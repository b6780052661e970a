use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::workflow::Stage;

/// Why a stage failed, independent of which stage it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// The collaborator did not answer within the configured budget
    Timeout { secs: u64 },
    /// Any other collaborator-reported problem
    Message(String),
}

impl Cause {
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { secs: duration.as_secs() }
    }

    pub fn message<S: Into<String>>(message: S) -> Self {
        Self::Message(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { secs } => write!(f, "timed out after {}s", secs),
            Self::Message(message) => f.write_str(message),
        }
    }
}

#[derive(Error, Debug)]
pub enum TarjamaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch failed: {0}")]
    FetchFailed(Cause),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(Cause),

    #[error("Translation failed: {0}")]
    TranslationFailed(Cause),

    #[error("Translation malformed: {0}")]
    TranslationMalformed(String),

    #[error("Subtitle embedding failed: {cause}\n{diagnostics}")]
    EmbedFailed { cause: Cause, diagnostics: String },

    #[error("Invalid subtitles: {0}")]
    InvalidSubtitles(String),

    #[error("Invalid artifact path: {0}")]
    InvalidArtifactPath(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(String),
}

impl TarjamaError {
    pub fn fetch<S: Into<String>>(message: S) -> Self {
        Self::FetchFailed(Cause::message(message))
    }

    pub fn transcription<S: Into<String>>(message: S) -> Self {
        Self::TranscriptionFailed(Cause::message(message))
    }

    pub fn translation<S: Into<String>>(message: S) -> Self {
        Self::TranslationFailed(Cause::message(message))
    }

    pub fn embed<S: Into<String>, D: Into<String>>(message: S, diagnostics: D) -> Self {
        Self::EmbedFailed {
            cause: Cause::message(message),
            diagnostics: diagnostics.into(),
        }
    }

    /// The failure a stage reports when its collaborator exceeds `duration`.
    pub fn timed_out(stage: Stage, duration: Duration) -> Self {
        Self::with_cause(stage, Cause::timeout(duration))
    }

    /// Fold any error into the failure kind owned by `stage`.
    ///
    /// Errors that already belong to the stage pass through untouched, as do
    /// naming failures and cancellation. Unparseable subtitles coming back from
    /// translation count as malformed output. Everything else is wrapped with
    /// its message.
    pub fn for_stage(self, stage: Stage) -> Self {
        match (stage, self) {
            (_, err @ (Self::InvalidArtifactPath(_) | Self::Cancelled)) => err,
            (Stage::Fetching, err @ Self::FetchFailed(_)) => err,
            (Stage::Transcribing, err @ Self::TranscriptionFailed(_)) => err,
            (Stage::Translating, err @ (Self::TranslationFailed(_) | Self::TranslationMalformed(_))) => err,
            (Stage::Translating, Self::InvalidSubtitles(message)) => Self::TranslationMalformed(message),
            (Stage::Embedding, err @ Self::EmbedFailed { .. }) => err,
            (stage, err) => Self::with_cause(stage, Cause::Message(err.to_string())),
        }
    }

    fn with_cause(stage: Stage, cause: Cause) -> Self {
        match stage {
            Stage::Fetching => Self::FetchFailed(cause),
            Stage::Transcribing => Self::TranscriptionFailed(cause),
            Stage::Translating => Self::TranslationFailed(cause),
            Stage::Embedding => Self::EmbedFailed {
                cause,
                diagnostics: String::new(),
            },
        }
    }

    /// Captured diagnostic output of an external process, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::EmbedFailed { diagnostics, .. } if !diagnostics.is_empty() => Some(diagnostics),
            _ => None,
        }
    }
}

/// A run that halted, and the stage it halted in.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {error}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub error: TarjamaError,
}

impl StageError {
    pub fn new(stage: Stage, error: TarjamaError) -> Self {
        Self {
            stage,
            error: error.for_stage(stage),
        }
    }
}

pub type Result<T> = std::result::Result<T, TarjamaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_stage_keeps_own_kind() {
        let err = TarjamaError::TranslationMalformed("3 cues, expected 4".to_string());
        assert!(matches!(
            err.for_stage(Stage::Translating),
            TarjamaError::TranslationMalformed(_)
        ));
    }

    #[test]
    fn test_bad_subtitles_from_translation_are_malformed() {
        let err = TarjamaError::InvalidSubtitles("cue 3 has no timing line".to_string());
        assert!(matches!(
            err.for_stage(Stage::Translating),
            TarjamaError::TranslationMalformed(_)
        ));

        let err = TarjamaError::InvalidSubtitles("cue 3 has no timing line".to_string());
        assert!(matches!(
            err.for_stage(Stage::Transcribing),
            TarjamaError::TranscriptionFailed(_)
        ));
    }

    #[test]
    fn test_for_stage_wraps_foreign_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        match TarjamaError::Io(io).for_stage(Stage::Fetching) {
            TarjamaError::FetchFailed(Cause::Message(message)) => assert!(message.contains("gone")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_timed_out_matches_stage() {
        let err = TarjamaError::timed_out(Stage::Transcribing, Duration::from_secs(30));
        match err {
            TarjamaError::TranscriptionFailed(cause) => {
                assert!(cause.is_timeout());
                assert_eq!(cause.to_string(), "timed out after 30s");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_embed_failure_displays_diagnostics() {
        let err = TarjamaError::embed("ffmpeg exited with code 1", "codec not found");
        assert_eq!(err.diagnostics(), Some("codec not found"));
        assert!(err.to_string().contains("codec not found"));
    }
}
