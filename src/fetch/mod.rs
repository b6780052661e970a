// Media fetching
//
// - YtDlp: resolves a video page and downloads exactly one stream variant
// - Http: downloads a direct media link
//
// Both honour the same `StreamPolicy` and name the file deterministically
// from the URL, so fetching the same source twice lands on the same path.

pub mod http;
pub mod ytdlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::config::{FetchConfig, FetcherBackend};
use crate::error::{Result, TarjamaError};
use crate::workflow::Stage;

pub use http::HttpFetcher;
pub use ytdlp::YtDlpFetcher;

/// Downloads the media behind a URL into a directory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` into `dest_dir` and return the local file path
    async fn fetch(&self, url: &Url, dest_dir: &Path) -> Result<PathBuf>;

    /// Check if the fetcher's tooling is usable
    async fn check_availability(&self) -> Result<()> {
        Ok(())
    }
}

/// Which stream variant to download when a source offers several.
///
/// Variants are filtered to the fixed container, optionally requiring both an
/// audio and a video track; among the survivors the best-ranked one is taken.
/// There is no prompting and no fallback to another container: if nothing
/// matches, the fetch fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPolicy {
    pub container: String,
    pub require_audio: bool,
    pub require_video: bool,
}

impl StreamPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            container: config.container.trim().to_lowercase(),
            require_audio: config.require_audio,
            require_video: config.require_video,
        }
    }

    /// yt-dlp format selector expressing this policy
    pub fn format_selector(&self) -> String {
        let mut selector = format!("best[ext={}]", self.container);
        if self.require_video {
            selector.push_str("[vcodec!=none]");
        }
        if self.require_audio {
            selector.push_str("[acodec!=none]");
        }
        selector
    }

    pub fn accepts_extension(&self, extension: &str) -> bool {
        extension.eq_ignore_ascii_case(&self.container)
    }
}

impl Default for StreamPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Factory for creating fetcher instances
pub struct FetcherFactory;

impl FetcherFactory {
    pub fn create_fetcher(config: &FetchConfig) -> Result<Box<dyn MediaFetcher>> {
        let policy = StreamPolicy::from_config(config);
        Ok(match config.backend {
            FetcherBackend::YtDlp => Box::new(YtDlpFetcher::new(config, policy)),
            FetcherBackend::Http => Box::new(HttpFetcher::new(config, policy)?),
        })
    }
}

/// Only absolute http(s) URLs are accepted as media sources.
pub fn parse_source_url(source: &str) -> Result<Url> {
    let url = Url::parse(source.trim())
        .map_err(|e| TarjamaError::fetch(format!("invalid URL '{}': {}", source, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(TarjamaError::fetch(format!("unsupported URL scheme '{}'", scheme))),
    }
}

/// Fetch stage.
///
/// Creates `dest_dir` if needed, runs the fetcher under `timeout` and checks
/// that a non-empty file came back. Every failure is `FetchFailed`; nothing is
/// retried here.
pub async fn fetch_media(
    fetcher: &dyn MediaFetcher,
    source: &str,
    dest_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf> {
    let url = parse_source_url(source)?;
    tokio::fs::create_dir_all(dest_dir).await.map_err(|e| {
        TarjamaError::fetch(format!("cannot create {}: {}", dest_dir.display(), e))
    })?;

    info!("Downloading {} into {}", url, dest_dir.display());
    let path = match tokio::time::timeout(timeout, fetcher.fetch(&url, dest_dir)).await {
        Ok(Ok(path)) => path,
        Ok(Err(e)) => return Err(e.for_stage(Stage::Fetching)),
        Err(_) => return Err(TarjamaError::timed_out(Stage::Fetching, timeout)),
    };

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {
            info!("Downloaded to {} ({} bytes)", path.display(), meta.len());
            Ok(path)
        }
        Ok(_) => Err(TarjamaError::fetch(format!("{} is empty or not a file", path.display()))),
        Err(e) => Err(TarjamaError::fetch(format!("{} is missing: {}", path.display(), e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Cause;

    #[test]
    fn test_format_selector() {
        assert_eq!(
            StreamPolicy::default().format_selector(),
            "best[ext=mp4][vcodec!=none][acodec!=none]"
        );

        let audio_only = StreamPolicy {
            container: "m4a".to_string(),
            require_audio: true,
            require_video: false,
        };
        assert_eq!(audio_only.format_selector(), "best[ext=m4a][acodec!=none]");
    }

    #[test]
    fn test_parse_source_url() {
        assert!(parse_source_url("https://www.youtube.com/watch?v=7z161Mn0wwI").is_ok());
        assert!(matches!(parse_source_url("not a url"), Err(TarjamaError::FetchFailed(_))));
        assert!(matches!(parse_source_url("file:///etc/passwd"), Err(TarjamaError::FetchFailed(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_never_reaches_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().times(0);

        let err = fetch_media(&fetcher, "ftp://example.com/a.mp4", dir.path(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TarjamaError::FetchFailed(_)));
    }

    #[tokio::test]
    async fn test_refetch_yields_same_path_and_creates_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("run");
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().times(2).returning(|url, dest_dir| {
            let id = url.query_pairs().find(|(k, _)| k == "v").map(|(_, v)| v.into_owned()).unwrap();
            let path = dest_dir.join(format!("{}.mp4", id));
            std::fs::write(&path, b"fresh bytes").unwrap();
            Ok(path)
        });

        let url = "https://www.youtube.com/watch?v=7z161Mn0wwI";
        let first = fetch_media(&fetcher, url, &dest, Duration::from_secs(5)).await.unwrap();
        let second = fetch_media(&fetcher, url, &dest, Duration::from_secs(5)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, dest.join("7z161Mn0wwI.mp4"));
    }

    #[tokio::test]
    async fn test_empty_download_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().returning(|_, dest_dir| {
            let path = dest_dir.join("empty.mp4");
            std::fs::write(&path, b"").unwrap();
            Ok(path)
        });

        let err = fetch_media(&fetcher, "https://example.com/empty.mp4", dir.path(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TarjamaError::FetchFailed(Cause::Message(_))));
    }

    #[tokio::test]
    async fn test_collaborator_errors_become_fetch_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().returning(|_, _| {
            Err(TarjamaError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        });

        let err = fetch_media(&fetcher, "https://example.com/a.mp4", dir.path(), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            TarjamaError::FetchFailed(cause) => assert!(cause.to_string().contains("connection refused")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
