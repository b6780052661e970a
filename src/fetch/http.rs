use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::{Cause, Result, TarjamaError};
use super::{MediaFetcher, StreamPolicy};

/// Downloads a direct media link.
///
/// The file is named after the last URL path segment and streamed into a
/// `.part` sibling that is renamed once complete, so an interrupted download
/// never looks like a finished one.
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: StreamPolicy,
    request_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig, policy: StreamPolicy) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .user_agent(concat!("tarjama/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            policy,
            request_timeout,
        })
    }

    /// Local file name for `url`, checked against the stream policy
    fn target_name(&self, url: &Url, content_type: Option<&str>) -> Result<String> {
        let segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("download");
        let mut name = sanitize_filename(segment);

        match Path::new(&name).extension().and_then(|e| e.to_str()) {
            Some(ext) if self.policy.accepts_extension(ext) => Ok(name),
            Some(ext) => Err(TarjamaError::fetch(format!(
                "{} serves .{} media but the policy requires .{}",
                url, ext, self.policy.container
            ))),
            None => {
                let expected = format!("video/{}", self.policy.container);
                if content_type.is_some_and(|ct| ct.starts_with(&expected)) {
                    name.push('.');
                    name.push_str(&self.policy.container);
                    Ok(name)
                } else {
                    Err(TarjamaError::fetch(format!(
                        "{} has no file extension and content type {} is not {}",
                        url,
                        content_type.unwrap_or("unknown"),
                        expected
                    )))
                }
            }
        }
    }

    fn map_request_error(&self, error: reqwest::Error) -> TarjamaError {
        if error.is_timeout() {
            TarjamaError::FetchFailed(Cause::timeout(self.request_timeout))
        } else {
            TarjamaError::fetch(error.to_string())
        }
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, dest_dir: &Path) -> Result<PathBuf> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;
        let response = response
            .error_for_status()
            .map_err(|e| self.map_request_error(e))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let name = self.target_name(response.url(), content_type.as_deref())?;
        let dest = dest_dir.join(&name);
        let partial = dest_dir.join(format!("{}.part", name));
        debug!("Streaming {} into {}", url, partial.display());

        let partial = PartialDownload::create(partial);
        let mut file = fs::File::create(partial.path()).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_request_error(e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        partial.persist(&dest).await?;
        info!("Saved {} bytes to {}", written, dest.display());
        Ok(dest)
    }
}

/// A `.part` file that is removed when dropped, unless persisted.
///
/// Covers early returns as well as the stage timeout dropping the download.
struct PartialDownload {
    path: PathBuf,
    persisted: bool,
}

impl PartialDownload {
    fn create(path: PathBuf) -> Self {
        Self { path, persisted: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(mut self, dest: &Path) -> Result<()> {
        fs::rename(&self.path, dest).await?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial download {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial download {}: {}", self.path.display(), e),
        }
    }
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if matches!(c, '/' | '\\' | '"' | '\n' | '\r' | '\t' | '<' | '>' | '|' | ':' | '*' | '?') {
                '_'
            } else {
                c
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn fetcher() -> HttpFetcher {
        let config = FetchConfig {
            request_timeout_secs: 10,
            ..FetchConfig::default()
        };
        HttpFetcher::new(&config, StreamPolicy::from_config(&config)).unwrap()
    }

    #[tokio::test]
    async fn test_download_is_stable_across_refetch() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/media/clip.mp4")
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .with_body("video bytes")
            .expect(2)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("{}/media/clip.mp4", server.url())).unwrap();
        let fetcher = fetcher();

        let first = fetcher.fetch(&url, dir.path()).await.unwrap();
        let second = fetcher.fetch(&url, dir.path()).await.unwrap();

        assert_eq!(first, dir.path().join("clip.mp4"));
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"video bytes");
        assert!(!dir.path().join("clip.mp4.part").exists());
    }

    #[tokio::test]
    async fn test_extension_from_content_type() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/watch")
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .with_body("abc")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("{}/watch", server.url())).unwrap();
        let path = fetcher().fetch(&url, dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("watch.mp4"));
    }

    #[tokio::test]
    async fn test_wrong_container_is_rejected() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/clip.webm")
            .with_status(200)
            .with_header("content-type", "video/webm")
            .with_body("abc")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("{}/clip.webm", server.url())).unwrap();
        let err = fetcher().fetch(&url, dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("requires .mp4"));
        assert!(!dir.path().join("clip.webm").exists());
    }

    #[tokio::test]
    async fn test_http_error_status_is_fetch_failure() {
        let mut server = Server::new_async().await;
        let _m = server.mock("GET", "/gone.mp4").with_status(404).create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("{}/gone.mp4", server.url())).unwrap();
        let err = fetcher().fetch(&url, dir.path()).await.unwrap_err();
        assert!(matches!(err, TarjamaError::FetchFailed(Cause::Message(_))));
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_no_partial_file() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/clip.mp4")
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .with_body("video bytes")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory where the finished file should go
        std::fs::create_dir_all(dir.path().join("clip.mp4").join("occupied")).unwrap();
        let url = Url::parse(&format!("{}/clip.mp4", server.url())).unwrap();

        assert!(fetcher().fetch(&url, dir.path()).await.is_err());
        assert!(!dir.path().join("clip.mp4.part").exists());
    }

    #[tokio::test]
    async fn test_dropped_download_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4.part");
        std::fs::write(&path, b"half").unwrap();

        drop(PartialDownload::create(path.clone()));
        assert!(!path.exists());

        std::fs::write(&path, b"whole").unwrap();
        let dest = dir.path().join("clip.mp4");
        PartialDownload::create(path.clone()).persist(&dest).await.unwrap();
        assert!(!path.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"whole");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a:b*c?.mp4"), "a_b_c_.mp4");
        assert_eq!(sanitize_filename("..hidden.mp4"), "hidden.mp4");
    }
}
