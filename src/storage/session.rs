use super::fs::FileSystem;
use crate::core::{Result, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, event};

/// Last-write-wins store for ephemeral editor state.
///
/// No temp file, no verification, no retry and no merge. An absent or
/// unparsable session simply means there is nothing to resume.
pub struct SessionStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl SessionStore {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save<T: Serialize + ?Sized>(&self, snapshot: &T) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs
                .create_dir_all(parent)
                .await
                .map_err(|err| StoreError::from_io(parent, &err))?;
        }
        self.fs
            .write(&self.path, &bytes)
            .await
            .map_err(|err| StoreError::from_io(&self.path, &err))
    }

    pub async fn load<T: DeserializeOwned>(&self) -> Option<T> {
        let text = match self.fs.read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    event!(Level::DEBUG, error = %err, "session not readable");
                }
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                event!(Level::DEBUG, error = %err, "session not parsable, ignoring");
                None
            }
        }
    }

    pub async fn clear(&self) -> Result<()> {
        match self.fs.remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::from_io(&self.path, &err)),
        }
    }
}
