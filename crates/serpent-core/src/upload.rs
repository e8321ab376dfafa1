//! Upload destination handling.
//!
//! Client filenames are used verbatim as long as they name a single entry
//! inside the upload directory. Payload bytes are streamed into a hidden
//! temporary file which replaces the destination only once the whole part
//! has been received.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::{fs::File, io::AsyncWriteExt};
use tracing::debug;

use crate::error::{CoreError, Result};

static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(0);

/// Checks that a client-supplied filename stays inside the upload directory.
///
/// # Errors
///
/// Returns `CoreError::InvalidFilename` for empty names, `.` and `..`, and
/// names containing `/`, `\` or NUL.
pub fn validate_filename(raw: &str) -> Result<&str> {
    let invalid =
        raw.is_empty() || raw == "." || raw == ".." || raw.contains(['/', '\\', '\0']);
    if invalid {
        return Err(CoreError::InvalidFilename { filename: raw.to_string() });
    }
    Ok(raw)
}

/// Streaming writer for one uploaded file.
///
/// Dropping a sink without calling `commit` removes its temporary file.
#[derive(Debug)]
pub struct FileSink {
    target: PathBuf,
    temp: PathBuf,
    file: Option<File>,
    written: u64,
}

impl FileSink {
    /// Opens a temporary file next to `<dir>/<filename>`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidFilename` for unsafe names and
    /// `CoreError::UploadIo` if the directory or file cannot be created.
    pub async fn create(dir: &Path, filename: &str) -> Result<Self> {
        let name = validate_filename(filename)?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| CoreError::UploadIo { path: dir.to_path_buf(), source })?;

        let id = NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed);
        let target = dir.join(name);
        let temp = dir.join(format!(".{name}.{}-{id}.part", std::process::id()));
        let file = File::create(&temp)
            .await
            .map_err(|source| CoreError::UploadIo { path: temp.clone(), source })?;

        debug!(target = %target.display(), temp = %temp.display(), "Opened upload sink");
        Ok(Self { target, temp, file: Some(file), written: 0 })
    }

    /// Returns the final destination path.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Appends payload bytes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UploadIo` if the write fails.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else { return Ok(()) };
        file.write_all(chunk)
            .await
            .map_err(|source| CoreError::UploadIo { path: self.temp.clone(), source })?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes the payload and moves it over the destination, replacing any
    /// existing file. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UploadIo` if flushing or renaming fails.
    pub async fn commit(mut self) -> Result<u64> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|source| CoreError::UploadIo { path: self.temp.clone(), source })?;
            file.sync_all()
                .await
                .map_err(|source| CoreError::UploadIo { path: self.temp.clone(), source })?;
        }

        tokio::fs::rename(&self.temp, &self.target)
            .await
            .map_err(|source| CoreError::UploadIo { path: self.target.clone(), source })?;

        // Nothing left to clean up.
        self.temp = PathBuf::new();
        Ok(self.written)
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.temp.as_os_str().is_empty() {
            return;
        }
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.temp) {
            debug!(temp = %self.temp.display(), error = %e, "Could not remove abandoned upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert_eq!(validate_filename("snake.jpg").unwrap(), "snake.jpg");
        assert_eq!(validate_filename("..hidden").unwrap(), "..hidden");
        assert_eq!(validate_filename("my snake (1).png").unwrap(), "my snake (1).png");
    }

    #[test]
    fn rejects_traversal_and_separators() {
        for name in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "nul\0byte"] {
            let err = validate_filename(name).unwrap_err();
            assert_eq!(err.code(), "E1005", "{name:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn commit_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), b"old contents").unwrap();

        let mut sink = FileSink::create(dir.path(), "a.bin").await.unwrap();
        sink.write(b"new").await.unwrap();
        sink.write(b" bytes").await.unwrap();
        let written = sink.commit().await.unwrap();

        assert_eq!(written, 9);
        assert_eq!(std::fs::read(dir.path().join("a.bin")).unwrap(), b"new bytes");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn dropped_sink_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut sink = FileSink::create(dir.path(), "partial.bin").await.unwrap();
            sink.write(b"half").await.unwrap();
        }

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn creates_missing_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("incoming");

        let sink = FileSink::create(&nested, "x.txt").await.unwrap();
        sink.commit().await.unwrap();

        assert!(nested.join("x.txt").exists());
    }
}
