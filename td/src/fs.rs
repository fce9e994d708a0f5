//! Filesystem collaborator
//!
//! The engine never touches `std::fs`/`tokio::fs` directly for the TODO file;
//! it goes through [`FileSystem`] with paths already checked by
//! [`PathValidator`](crate::path::PathValidator).

use std::io;
use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::debug;

/// Subset of file metadata the engine cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub is_file: bool,
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_file(&self, path: &Path) -> io::Result<String>;

    async fn write_file(&self, path: &Path, content: &str) -> io::Result<()>;

    async fn stat(&self, path: &Path) -> io::Result<FileStat>;

    async fn exists(&self, path: &Path) -> bool;
}

/// Local disk via `tokio::fs`
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// concurrent reader (or the watcher) never observes a half-written file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_file(&self, path: &Path) -> io::Result<String> {
        debug!(?path, "LocalFileSystem::read_file: called");
        tokio::fs::read_to_string(path).await
    }

    async fn write_file(&self, path: &Path, content: &str) -> io::Result<()> {
        debug!(?path, bytes = content.len(), "LocalFileSystem::write_file: called");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        let tmp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        debug!(?path, "LocalFileSystem::stat: called");
        let meta = tokio::fs::metadata(path).await?;
        Ok(FileStat {
            size: meta.len(),
            modified: meta.modified().ok(),
            is_file: meta.is_file(),
        })
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_creates_parents_and_reads_back() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("TODO.md");
        let fs = LocalFileSystem;

        fs.write_file(&path, "# TODO\n").await.unwrap();
        assert!(fs.exists(&path).await);
        assert_eq!(fs.read_file(&path).await.unwrap(), "# TODO\n");
        assert!(!fs.exists(&path.with_file_name(".TODO.md.tmp")).await);
    }

    #[tokio::test]
    async fn test_stat() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("a.md");
        let fs = LocalFileSystem;
        fs.write_file(&path, "12345").await.unwrap();

        let stat = fs.stat(&path).await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(stat.is_file);
        assert!(fs.stat(&temp.path().join("missing")).await.is_err());
    }
}
