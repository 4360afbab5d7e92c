//! Verified, retrying, single-file atomic writes.
//!
//! Every write goes through the same sequence:
//! 1. write `<path>.tmp`, flush and fsync it,
//! 2. from the fourth attempt on, delete the destination first,
//! 3. rename the temp file over the destination, falling back to copy when
//!    the rename is refused (busy file, permissions, cross-device share),
//! 4. re-read the destination and compare it to the payload.
//!
//! When every attempt fails the payload is written to a rescue artifact
//! instead, so the caller's data is never silently lost.

use super::fs::{FileSystem, with_suffix};
use super::rescue;
use crate::config::WritePolicy;
use crate::core::{Result, StoreError};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;
use tracing::{Instrument, Level, event, info_span};

const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The destination now holds exactly the payload.
    Committed { attempts: u32 },
    /// The destination is unchanged; the payload lives in `rescue_path`.
    EmergencySaved { rescue_path: PathBuf, cause: String },
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    pub fn rescue_path(&self) -> Option<&Path> {
        match self {
            Self::Committed { .. } => None,
            Self::EmergencySaved { rescue_path, .. } => Some(rescue_path),
        }
    }
}

pub fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, TEMP_SUFFIX)
}

/// Rename errors that are worth retrying as a copy instead.
fn rename_needs_copy(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy | io::ErrorKind::CrossesDevices
    ) {
        return true;
    }

    #[cfg(windows)]
    {
        // ERROR_ACCESS_DENIED, ERROR_NOT_SAME_DEVICE, ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        matches!(err.raw_os_error(), Some(5 | 17 | 32 | 33))
    }
    #[cfg(not(windows))]
    {
        // EPERM, EBUSY, EXDEV
        matches!(err.raw_os_error(), Some(1 | 16 | 18))
    }
}

pub struct AtomicWriter {
    fs: Arc<dyn FileSystem>,
    policy: WritePolicy,
    /// One FIFO lock per destination. Entries are never removed; the map is
    /// bounded by the number of distinct documents a process touches.
    queues: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl AtomicWriter {
    pub fn new(fs: Arc<dyn FileSystem>, policy: WritePolicy) -> Self {
        Self {
            fs,
            policy,
            queues: Mutex::new(HashMap::new()),
        }
    }

    fn queue_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut queues = self
            .queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        queues
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Writes `payload` to `path`, queued behind any write already in flight
    /// for the same path.
    ///
    /// `payload` must be valid JSON; it is rejected before touching disk
    /// otherwise.
    pub async fn write(&self, path: &Path, payload: &str) -> Result<WriteOutcome> {
        serde_json::from_str::<serde::de::IgnoredAny>(payload)?;

        let queue = self.queue_for(path);
        let _turn = queue.lock().await;

        let span = info_span!("store.atomic_write", path = %path.display());
        self.write_locked(path, payload).instrument(span).await
    }

    async fn write_locked(&self, path: &Path, payload: &str) -> Result<WriteOutcome> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(err) = self.fs.create_dir_all(parent).await {
                event!(Level::WARN, error = %err, "could not create parent directory");
            }
        }

        let tmp = temp_path(path);
        let attempts = self.policy.attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.attempt(path, &tmp, payload, attempt).await {
                Ok(()) => {
                    event!(Level::DEBUG, attempt = attempt + 1, "write committed");
                    return Ok(WriteOutcome::Committed {
                        attempts: attempt + 1,
                    });
                }
                Err(err) => {
                    event!(
                        Level::WARN,
                        attempt = attempt + 1,
                        of = attempts,
                        error = %err,
                        "write attempt failed"
                    );
                    last_error = Some(err);
                    if attempt + 1 < attempts {
                        sleep(self.policy.backoff(attempt)).await;
                    }
                }
            }
        }

        let _ = self.fs.remove_file(&tmp).await;
        let cause = last_error.unwrap_or_else(|| StoreError::Io("no write attempt ran".to_string()));
        self.emergency_save(path, payload, cause).await
    }

    async fn attempt(&self, path: &Path, tmp: &Path, payload: &str, attempt: u32) -> Result<()> {
        self.fs
            .write_synced(tmp, payload.as_bytes())
            .await
            .map_err(|err| StoreError::from_io(tmp, &err))?;

        if attempt >= self.policy.delete_destination_from {
            if let Err(err) = self.fs.remove_file(path).await {
                event!(Level::DEBUG, error = %err, "pre-commit delete of destination failed");
            }
        }

        self.commit(tmp, path).await?;
        self.verify(path, payload).await
    }

    async fn commit(&self, tmp: &Path, path: &Path) -> Result<()> {
        match self.fs.rename(tmp, path).await {
            Ok(()) => Ok(()),
            Err(err) if rename_needs_copy(&err) => {
                event!(Level::INFO, error = %err, "rename refused, committing by copy");
                self.fs
                    .copy(tmp, path)
                    .await
                    .map_err(|err| StoreError::from_io(path, &err))?;
                if let Err(err) = self.fs.remove_file(tmp).await {
                    event!(Level::DEBUG, error = %err, "could not remove temp file after copy");
                }
                Ok(())
            }
            Err(err) => Err(StoreError::Io(format!(
                "rename '{}' -> '{}': {}",
                tmp.display(),
                path.display(),
                err
            ))),
        }
    }

    async fn verify(&self, path: &Path, payload: &str) -> Result<()> {
        let written = self
            .fs
            .read_to_string(path)
            .await
            .map_err(|err| StoreError::from_io(path, &err))?;

        if written.trim() != payload.trim() {
            return Err(StoreError::StaleWrite {
                path: path.to_path_buf(),
                detail: format!(
                    "read back {} bytes, expected {}",
                    written.len(),
                    payload.len()
                ),
            });
        }

        serde_json::from_str::<serde::de::IgnoredAny>(&written).map_err(|err| {
            StoreError::StaleWrite {
                path: path.to_path_buf(),
                detail: format!("read back invalid JSON: {}", err),
            }
        })?;
        Ok(())
    }

    async fn emergency_save(
        &self,
        path: &Path,
        payload: &str,
        cause: StoreError,
    ) -> Result<WriteOutcome> {
        let mut created_at = rescue::now_millis();
        let mut rescue_path = rescue::rescue_path(path, created_at);
        while self.fs.exists(&rescue_path).await {
            created_at += 1;
            rescue_path = rescue::rescue_path(path, created_at);
        }

        match self.fs.write_synced(&rescue_path, payload.as_bytes()).await {
            Ok(()) => {
                event!(
                    Level::ERROR,
                    error = %cause,
                    rescue = %rescue_path.display(),
                    "write retries exhausted, payload saved to rescue file"
                );
                Ok(WriteOutcome::EmergencySaved {
                    rescue_path,
                    cause: cause.to_string(),
                })
            }
            Err(rescue_err) => {
                event!(
                    Level::ERROR,
                    error = %cause,
                    rescue_error = %rescue_err,
                    "write failed and rescue file could not be written"
                );
                Err(StoreError::WriteFailed {
                    path: path.to_path_buf(),
                    cause: cause.to_string(),
                    rescue_error: rescue_err.to_string(),
                })
            }
        }
    }
}
