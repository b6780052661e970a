use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use crate::config::FetchConfig;
use crate::error::{Result, TarjamaError};
use crate::media::{CommandError, MediaCommand};
use super::{MediaFetcher, StreamPolicy};

/// Output template: the platform's video id keeps the file name stable across re-fetches
const OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";

/// yt-dlp backed fetcher
pub struct YtDlpFetcher {
    binary_path: String,
    extra_args: Vec<String>,
    policy: StreamPolicy,
}

impl YtDlpFetcher {
    pub fn new(config: &FetchConfig, policy: StreamPolicy) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            extra_args: config.extra_args.clone(),
            policy,
        }
    }

    fn download_command(&self, url: &Url, dest_dir: &Path) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Media download")
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("--no-simulate")
            .arg("--force-overwrites")
            .arg("-f")
            .arg(self.policy.format_selector())
            .arg("-o")
            .path(dest_dir.join(OUTPUT_TEMPLATE))
            .arg("--print")
            .arg("after_move:filepath")
            .args(self.extra_args.iter().cloned())
            .arg(url.as_str())
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &Url, dest_dir: &Path) -> Result<PathBuf> {
        let selector = self.policy.format_selector();
        info!("Fetching {} with format {}", url, selector);

        let output = self
            .download_command(url, dest_dir)
            .execute()
            .await
            .map_err(|e| map_command_error(e, &selector))?;

        let path = downloaded_path(&output.stdout).ok_or_else(|| {
            TarjamaError::fetch("yt-dlp did not report where it saved the file")
        })?;
        debug!("yt-dlp saved {}", path.display());

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if !self.policy.accepts_extension(extension) {
            return Err(TarjamaError::fetch(format!(
                "downloaded {} but the policy requires .{}",
                path.display(),
                self.policy.container
            )));
        }
        Ok(path)
    }

    async fn check_availability(&self) -> Result<()> {
        let output = MediaCommand::new(&self.binary_path, "Version check")
            .arg("--version")
            .execute()
            .await
            .map_err(|e| TarjamaError::Config(format!("yt-dlp is not usable: {}", e)))?;
        info!("yt-dlp is available: {}", output.stdout.trim());
        Ok(())
    }
}

/// Last non-empty stdout line is the final file path
fn downloaded_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(PathBuf::from)
}

fn map_command_error(error: CommandError, selector: &str) -> TarjamaError {
    let diagnostics = error.diagnostics();
    if diagnostics.contains("Requested format is not available") {
        return TarjamaError::fetch(format!("no stream variant matches {}", selector));
    }
    match &error {
        CommandError::Spawn { .. } => TarjamaError::fetch(error.to_string()),
        CommandError::Exited { .. } => {
            let reason = diagnostics
                .lines()
                .rev()
                .find(|line| line.contains("ERROR"))
                .unwrap_or(diagnostics);
            TarjamaError::fetch(format!("{}: {}", error, reason))
        }
    }
}
