//! Local filesystem storage implementation.
//!
//! Every write goes through a temp file followed by a rename, so readers
//! never see a half-written artifact or state file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{NormalizedPosting, RawRecord, RunReport, ScoredPosting};
use crate::storage::{Artifact, ArtifactStorage};

const RUNS_DIR: &str = "runs";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    pub async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    pub async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    pub async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Key of an artifact within a run.
    fn artifact_key(run_id: &str, artifact: Artifact) -> String {
        format!("{}/{}/{}", RUNS_DIR, run_id, artifact.file_name())
    }

    /// Run ids present on disk, oldest first.
    pub async fn list_runs(&self) -> Result<Vec<String>> {
        let dir = self.path(RUNS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut runs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                runs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        runs.sort();
        Ok(runs)
    }

    async fn write_artifact<T: Serialize + ?Sized>(
        &self,
        run_id: &str,
        artifact: Artifact,
        value: &T,
    ) -> Result<()> {
        let key = Self::artifact_key(run_id, artifact);
        self.write_json(&key, value).await?;
        log::debug!("Wrote {}", key);
        Ok(())
    }
}

#[async_trait]
impl ArtifactStorage for LocalStorage {
    async fn write_raw(&self, run_id: &str, records: &[RawRecord]) -> Result<()> {
        self.write_artifact(run_id, Artifact::Raw, records).await
    }

    async fn write_normalized(&self, run_id: &str, postings: &[NormalizedPosting]) -> Result<()> {
        self.write_artifact(run_id, Artifact::Normalized, postings)
            .await
    }

    async fn write_scored(&self, run_id: &str, scored: &[ScoredPosting]) -> Result<()> {
        self.write_artifact(run_id, Artifact::Scored, scored).await
    }

    async fn write_report(&self, run_id: &str, report: &RunReport) -> Result<()> {
        self.write_artifact(run_id, Artifact::Report, report).await
    }

    async fn read_normalized(&self, run_id: &str) -> Result<Option<Vec<NormalizedPosting>>> {
        self.read_json(&Self::artifact_key(run_id, Artifact::Normalized))
            .await
    }

    async fn read_scored(&self, run_id: &str) -> Result<Option<Vec<ScoredPosting>>> {
        self.read_json(&Self::artifact_key(run_id, Artifact::Scored))
            .await
    }

    async fn read_report(&self, run_id: &str) -> Result<Option<RunReport>> {
        self.read_json(&Self::artifact_key(run_id, Artifact::Report))
            .await
    }

    async fn latest_run_with(&self, artifact: Artifact) -> Result<Option<String>> {
        for run_id in self.list_runs().await?.into_iter().rev() {
            let key = Self::artifact_key(&run_id, artifact);
            if tokio::fs::try_exists(self.path(&key)).await? {
                return Ok(Some(run_id));
            }
        }
        Ok(None)
    }
}
