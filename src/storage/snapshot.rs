//! Snapshot file: the full metric state as one JSON array on one line
//!
//! ```text
//! [{"id":"hits","type":"counter","delta":12},{"id":"temp","type":"gauge","value":40.5}]
//! ```
//!
//! Every save replaces the file wholesale. The new content is written to a
//! sibling `*.tmp` file first and renamed over the target, so a crash during a
//! save leaves either the previous snapshot or the new one, never a torn file.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::error::{StorageError, StorageResult};
use crate::model::Metric;

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read the snapshot
    ///
    /// A missing or blank file yields an empty state. Anything else that does
    /// not parse is an error.
    pub async fn load(&self) -> StorageResult<Vec<Metric>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no snapshot at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let content = content.trim();
        if content.is_empty() {
            debug!("snapshot at {} is empty, starting empty", self.path.display());
            return Ok(Vec::new());
        }

        let metrics: Vec<Metric> =
            serde_json::from_str(content).map_err(|source| StorageError::CorruptSnapshot {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            "loaded {} metrics from {}",
            metrics.len(),
            self.path.display()
        );
        Ok(metrics)
    }

    /// Replace the snapshot with `metrics`.
    pub async fn save(&self, metrics: &[Metric]) -> StorageResult<()> {
        let mut line = serde_json::to_vec(metrics)?;
        line.push(b'\n');

        let temp = self.temp_path();
        tokio::fs::write(&temp, &line).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        trace!(
            "wrote {} metrics ({} bytes) to {}",
            metrics.len(),
            line.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("absent.json"));

        assert!(snapshot.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.json");
        std::fs::write(&path, "\n").unwrap();

        assert!(SnapshotFile::new(path).load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[{\"id\":\"hits\",").unwrap();

        let result = SnapshotFile::new(path).load().await;
        assert_matches!(result, Err(StorageError::CorruptSnapshot { .. }));
    }

    #[tokio::test]
    async fn test_reads_documented_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"[{"id":"hits","type":"counter","delta":12}]"#).unwrap();

        let metrics = SnapshotFile::new(path).load().await.unwrap();
        assert_eq!(metrics, vec![Metric::counter("hits", 12).unwrap()]);
    }

    #[tokio::test]
    async fn test_save_replaces_content_with_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let snapshot = SnapshotFile::new(&path);

        snapshot
            .save(&[
                Metric::counter("a", 1).unwrap(),
                Metric::gauge("b", 2.5).unwrap(),
            ])
            .await
            .unwrap();
        snapshot.save(&[Metric::counter("a", 3).unwrap()]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[{\"id\":\"a\",\"type\":\"counter\",\"delta\":3}]\n");
        assert!(!snapshot.temp_path().exists());
    }
}
