//! Sibling artifact paths derived from a fetched media file.
//!
//! The file names are the only link between stages, and other tools rely on
//! them: `<base>.<ext>`, `<base>_<src>.srt`, `<base>_<dst>.srt`,
//! `<base>_<dst>.<ext>`, plus `<base>_audio.mp3` for the upload track.

use std::path::{Path, PathBuf};

use crate::error::{Result, TarjamaError};

pub const SUBTITLE_EXTENSION: &str = "srt";
pub const AUDIO_SUFFIX: &str = "audio";
pub const AUDIO_EXTENSION: &str = "mp3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub media: PathBuf,
    pub audio: PathBuf,
    pub source_subtitles: PathBuf,
    pub translated_subtitles: PathBuf,
    pub output_video: PathBuf,
}

impl ArtifactPaths {
    pub fn derive(media: &Path, source_language: &str, target_language: &str) -> Result<Self> {
        let invalid = |reason: &str| TarjamaError::InvalidArtifactPath(format!("{}: {}", media.display(), reason));

        let extension = media
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| invalid("no file extension"))?;
        if extension.eq_ignore_ascii_case(SUBTITLE_EXTENSION) {
            return Err(invalid("media cannot be a subtitle file"));
        }
        let stem = media
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("no usable file name"))?;

        check_language_tag(source_language).map_err(|reason| invalid(&reason))?;
        check_language_tag(target_language).map_err(|reason| invalid(&reason))?;
        if source_language.eq_ignore_ascii_case(target_language) {
            return Err(invalid("source and target language are identical"));
        }

        let sibling = |suffix: &str, ext: &str| media.with_file_name(format!("{}_{}.{}", stem, suffix, ext));

        Ok(Self {
            media: media.to_path_buf(),
            audio: sibling(AUDIO_SUFFIX, AUDIO_EXTENSION),
            source_subtitles: sibling(source_language, SUBTITLE_EXTENSION),
            translated_subtitles: sibling(target_language, SUBTITLE_EXTENSION),
            output_video: sibling(target_language, extension),
        })
    }

    pub fn all(&self) -> [&Path; 5] {
        [
            &self.media,
            &self.audio,
            &self.source_subtitles,
            &self.translated_subtitles,
            &self.output_video,
        ]
    }
}

fn check_language_tag(tag: &str) -> std::result::Result<(), String> {
    if tag.is_empty() {
        return Err("empty language tag".to_string());
    }
    if tag.eq_ignore_ascii_case(AUDIO_SUFFIX) {
        return Err(format!("'{}' is reserved", AUDIO_SUFFIX));
    }
    if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("invalid language tag '{}'", tag));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_derive_layout() {
        let paths = ArtifactPaths::derive(Path::new("/data/run/7z161Mn0wwI.mp4"), "ar", "en").unwrap();

        assert_eq!(paths.media, PathBuf::from("/data/run/7z161Mn0wwI.mp4"));
        assert_eq!(paths.audio, PathBuf::from("/data/run/7z161Mn0wwI_audio.mp3"));
        assert_eq!(paths.source_subtitles, PathBuf::from("/data/run/7z161Mn0wwI_ar.srt"));
        assert_eq!(paths.translated_subtitles, PathBuf::from("/data/run/7z161Mn0wwI_en.srt"));
        assert_eq!(paths.output_video, PathBuf::from("/data/run/7z161Mn0wwI_en.mp4"));
    }

    #[test]
    fn test_paths_are_distinct_siblings_sharing_the_stem() {
        for input in ["clip.mp4", "dir/some.video.webm", "/abs/x.mkv"] {
            let media = Path::new(input);
            let paths = ArtifactPaths::derive(media, "ar", "en").unwrap();
            let stem = media.file_stem().unwrap().to_str().unwrap();

            let unique: HashSet<&Path> = paths.all().into_iter().collect();
            assert_eq!(unique.len(), 5, "collision for {}", input);

            for path in paths.all() {
                assert_eq!(path.parent(), media.parent());
                assert!(path.file_name().unwrap().to_str().unwrap().starts_with(stem));
            }
        }
    }

    #[test]
    fn test_derive_is_deterministic() {
        let a = ArtifactPaths::derive(Path::new("out/abc.mp4"), "ar", "en").unwrap();
        let b = ArtifactPaths::derive(Path::new("out/abc.mp4"), "ar", "en").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_extension_is_invalid() {
        for input in ["out/video", "out/.hidden", "out/trailing."] {
            let result = ArtifactPaths::derive(Path::new(input), "ar", "en");
            assert!(
                matches!(result, Err(TarjamaError::InvalidArtifactPath(_))),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_colliding_languages_are_invalid() {
        let result = ArtifactPaths::derive(Path::new("a.mp4"), "en", "EN");
        assert!(matches!(result, Err(TarjamaError::InvalidArtifactPath(_))));

        let result = ArtifactPaths::derive(Path::new("a.mp4"), "ar", "audio");
        assert!(matches!(result, Err(TarjamaError::InvalidArtifactPath(_))));

        let result = ArtifactPaths::derive(Path::new("a.mp4"), "ar", "e/n");
        assert!(matches!(result, Err(TarjamaError::InvalidArtifactPath(_))));

        let result = ArtifactPaths::derive(Path::new("a.mp4"), "AUDIO", "en");
        assert!(matches!(result, Err(TarjamaError::InvalidArtifactPath(_))));
    }

    #[test]
    fn test_subtitle_file_as_media_is_invalid() {
        for input in ["clip.srt", "clip.SRT"] {
            let result = ArtifactPaths::derive(Path::new(input), "ar", "en");
            assert!(
                matches!(result, Err(TarjamaError::InvalidArtifactPath(_))),
                "{} should be rejected",
                input
            );
        }
    }
}
