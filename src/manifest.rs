use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{Result, TarjamaError};
use crate::workflow::Stage;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Record of one run: which stages completed and where their artifacts are.
///
/// Written to `<run_dir>/manifest.json` after every completed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: Uuid,
    pub source_url: String,
    pub source_language: String,
    pub target_language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub artifacts: BTreeMap<Stage, PathBuf>,
}

impl RunManifest {
    pub fn new(source_url: &str, source_language: &str, target_language: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_url: source_url.to_string(),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            created_at: now,
            updated_at: now,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn path_in(run_dir: &Path) -> PathBuf {
        run_dir.join(MANIFEST_FILE)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        serde_json::from_str(&content)
            .map_err(|e| TarjamaError::Manifest(format!("{}: {}", path.display(), e)))
    }

    /// Manifest of `run_dir`, or `None` when the directory has none yet
    pub async fn load_in(run_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(run_dir);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        Self::load(&path).await.map(Some)
    }

    /// Persist atomically: write a sibling temp file, then rename over.
    pub async fn save(&self, run_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(run_dir).await?;
        let path = Self::path_in(run_dir);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, serde_json::to_string_pretty(self)?).await?;
        fs::rename(&temp_path, &path).await?;
        debug!("Saved run manifest {}", path.display());
        Ok(path)
    }

    pub fn record(&mut self, stage: Stage, artifact: &Path) {
        self.artifacts.insert(stage, artifact.to_path_buf());
        self.updated_at = Utc::now();
    }

    /// Drop `stage` and every later stage, whose artifacts are now stale
    pub fn invalidate_from(&mut self, stage: Stage) {
        self.artifacts.retain(|recorded, _| *recorded < stage);
    }

    pub fn artifact(&self, stage: Stage) -> Option<&Path> {
        self.artifacts.get(&stage).map(PathBuf::as_path)
    }

    /// Last stage of the unbroken completed prefix Fetching, Transcribing, ...
    pub fn last_completed(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .take_while(|stage| self.artifacts.contains_key(stage))
            .last()
    }

    pub fn is_complete(&self) -> bool {
        self.last_completed() == Some(Stage::Embedding)
    }

    /// Whether this manifest describes the same source and language pair
    pub fn matches(&self, source_url: &str, source_language: &str, target_language: &str) -> bool {
        self.source_url == source_url
            && self.source_language.eq_ignore_ascii_case(source_language)
            && self.target_language.eq_ignore_ascii_case(target_language)
    }

    /// All manifests below `dir`, oldest first. Unreadable ones are skipped.
    pub fn find_all(dir: &Path) -> Vec<(PathBuf, RunManifest)> {
        let mut found: Vec<(PathBuf, RunManifest)> = WalkDir::new(dir)
            .sort_by_file_name()
            .max_depth(3)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE)
            .filter_map(|entry| {
                let path = entry.into_path();
                let parsed = std::fs::read_to_string(&path)
                    .map_err(TarjamaError::from)
                    .and_then(|content| serde_json::from_str::<RunManifest>(&content).map_err(TarjamaError::from));
                match parsed {
                    Ok(manifest) => Some((path, manifest)),
                    Err(e) => {
                        warn!("Skipping unreadable manifest {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();
        found.sort_by_key(|(_, manifest)| manifest.created_at);
        found
    }
}
