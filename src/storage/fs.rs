//! Filesystem port used by every storage component.
//!
//! The engine only needs a handful of primitives. Keeping them behind a trait
//! lets tests inject busy/locked failures and observe operation order without
//! touching a real network share.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Creates or truncates `path`, writes `bytes`, flushes and fsyncs.
    async fn write_synced(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Plain overwrite without fsync.
    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    async fn read_to_string(&self, path: &Path) -> io::Result<String>;

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    async fn exists(&self, path: &Path) -> bool;

    /// File names (not paths) of the regular entries in `dir`.
    async fn list_file_names(&self, dir: &Path) -> io::Result<Vec<String>>;
}

/// Production implementation backed by `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFs;

#[async_trait]
impl FileSystem for TokioFs {
    async fn write_synced(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes).await
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn list_file_names(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

/// `path` with `suffix` appended to its file name (`data.json` -> `data.json.tmp`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_with_suffix_keeps_extension() {
        assert_eq!(
            with_suffix(Path::new("/data/shop.json"), ".tmp"),
            PathBuf::from("/data/shop.json.tmp")
        );
    }

    #[tokio::test]
    async fn test_list_file_names_skips_directories() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let names = TokioFs.list_file_names(dir.path()).await.unwrap();
        assert_eq!(names, vec!["a.json".to_string()]);
    }
}
