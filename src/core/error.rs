use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Flat classification of a [`StoreError`], used when building recovery
/// prompts and when callers only care about the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    LockedOrBusy,
    Corrupt,
    StaleWrite,
    ConfigMissing,
    NetworkUnmounted,
    WriteFailed,
    Io,
    Serialization,
    Archive,
    InvalidConfig,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File '{}' not found", .0.display())]
    NotFound(PathBuf),

    #[error("File '{}' is locked or busy: {detail}", .path.display())]
    LockedOrBusy { path: PathBuf, detail: String },

    #[error("File '{}' is corrupt: {detail}", .path.display())]
    Corrupt {
        path: PathBuf,
        detail: String,
        backup: Option<PathBuf>,
    },

    #[error("Stale write on '{}': {detail}", .path.display())]
    StaleWrite { path: PathBuf, detail: String },

    #[error("Neither primary '{}' nor backup '{}' config could be read", .primary.display(), .backup.display())]
    ConfigMissing { primary: PathBuf, backup: PathBuf },

    #[error("Network path '{}' did not become visible within {waited_ms}ms", .path.display())]
    NetworkUnmounted { path: PathBuf, waited_ms: u64 },

    #[error(
        "Data NOT saved to '{}': {cause}; emergency copy also failed: {rescue_error}",
        .path.display()
    )]
    WriteFailed {
        path: PathBuf,
        cause: String,
        rescue_error: String,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::LockedOrBusy { .. } => ErrorKind::LockedOrBusy,
            Self::Corrupt { .. } => ErrorKind::Corrupt,
            Self::StaleWrite { .. } => ErrorKind::StaleWrite,
            Self::ConfigMissing { .. } => ErrorKind::ConfigMissing,
            Self::NetworkUnmounted { .. } => ErrorKind::NetworkUnmounted,
            Self::WriteFailed { .. } => ErrorKind::WriteFailed,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Archive(_) => ErrorKind::Archive,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Classifies an I/O error raised while touching `path`.
    ///
    /// Missing files map to `NotFound`; everything else is treated as
    /// contention, which is what network shares and antivirus scanners
    /// usually produce.
    pub fn from_io(path: &Path, err: &io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::LockedOrBusy {
                path: path.to_path_buf(),
                detail: err.to_string(),
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound(path) => Some(path),
            Self::LockedOrBusy { path, .. }
            | Self::Corrupt { path, .. }
            | Self::StaleWrite { path, .. }
            | Self::NetworkUnmounted { path, .. }
            | Self::WriteFailed { path, .. } => Some(path),
            Self::ConfigMissing { primary, .. } => Some(primary),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
