use std::path::{Path, PathBuf};

use relay_process::StreamId;

/// Durable stream_id -> pid mapping, one file per stream.
///
/// A pid file only records that a launch happened; liveness must always be
/// probed separately. A corrupt file reads the same as a missing one.
#[derive(Debug, Clone)]
pub struct PidStore {
    dir: PathBuf,
}

impl PidStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub fn path(&self, stream_id: StreamId) -> PathBuf {
        self.dir.join(format!("stream_{stream_id}.pid"))
    }

    /// Create or overwrite the pid file. Writes go through a temp file and a
    /// rename so readers never observe a half-written pid.
    pub async fn write(&self, stream_id: StreamId, pid: u32) -> std::io::Result<()> {
        let path = self.path(stream_id);
        let tmp = self.dir.join(format!("stream_{stream_id}.pid.tmp"));
        tokio::fs::write(&tmp, pid.to_string()).await?;
        tokio::fs::rename(&tmp, &path).await
    }

    /// Returns the recorded pid, or `None` when the file is missing or its
    /// content does not parse as a pid.
    pub async fn read(&self, stream_id: StreamId) -> Option<u32> {
        let raw = tokio::fs::read_to_string(self.path(stream_id)).await.ok()?;
        raw.trim().parse::<u32>().ok()
    }

    /// Removes the pid file if present. Missing files are a no-op.
    pub async fn delete(&self, stream_id: StreamId) {
        if let Err(err) = tokio::fs::remove_file(self.path(stream_id)).await
            && err.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(stream_id = stream_id.0, %err, "failed to remove pid file");
        }
    }
}
