//! On-disk archive of rotated records.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::SourceResult;
use crate::models::Record;

/// Writes the records discarded by a rotation as one JSON array per file.
#[derive(Debug, Clone)]
pub struct StoreArchiver {
    dir: PathBuf,
}

impl StoreArchiver {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// `<dir>/<sanitized>_data_<YYYY-MM-DD_HHMM>.json`
    pub fn path_for(&self, sanitized_name: &str, at: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!(
            "{}_data_{}.json",
            sanitized_name,
            at.format("%Y-%m-%d_%H%M")
        ))
    }

    /// `path`, or `<stem>_<n>.json` when a rotation in the same minute
    /// already used it.
    async fn free_path(&self, path: PathBuf) -> SourceResult<PathBuf> {
        if !tokio::fs::try_exists(&path).await? {
            return Ok(path);
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut n = 1u32;
        loop {
            let candidate = self.dir.join(format!("{}_{}.json", stem, n));
            if !tokio::fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    pub async fn write(&self, sanitized_name: &str, records: &[Record]) -> SourceResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.free_path(self.path_for(sanitized_name, Utc::now())).await?;
        let contents = serde_json::to_vec_pretty(records).map_err(std::io::Error::from)?;
        tokio::fs::write(&path, contents).await?;

        Ok(path)
    }

    /// Archive and log the outcome; errors never reach the caller.
    pub async fn archive(&self, sanitized_name: &str, records: &[Record]) {
        match self.write(sanitized_name, records).await {
            Ok(path) => info!(
                "Archived {} records for '{}' to {}",
                records.len(),
                sanitized_name,
                path.display()
            ),
            Err(e) => warn!("Failed to archive records for '{}': {}", sanitized_name, e),
        }
    }
}
