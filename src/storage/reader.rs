use super::fs::FileSystem;
use crate::config::{MountPolicy, ReadPolicy};
use crate::core::{Result, StoreError};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{Instant, sleep};
use tracing::{Level, event};

/// Retrying reader for documents on unreliable storage.
///
/// A missing file is reported immediately. Empty files and every other I/O
/// error are retried with exponential backoff and finally surfaced as
/// `LockedOrBusy`.
pub struct RecoveringReader {
    fs: Arc<dyn FileSystem>,
    policy: ReadPolicy,
    mount: MountPolicy,
}

impl RecoveringReader {
    pub fn new(fs: Arc<dyn FileSystem>, policy: ReadPolicy, mount: MountPolicy) -> Self {
        Self { fs, policy, mount }
    }

    pub async fn read(&self, path: &Path) -> Result<String> {
        let attempts = self.policy.attempts.max(1);
        let mut last_detail = String::new();

        for attempt in 0..attempts {
            match self.fs.read_to_string(path).await {
                Ok(text) if !text.trim().is_empty() => return Ok(text),
                Ok(_) => {
                    last_detail = "file is empty".to_string();
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Err(StoreError::NotFound(path.to_path_buf()));
                }
                Err(err) => {
                    last_detail = err.to_string();
                }
            }

            event!(
                Level::DEBUG,
                path = %path.display(),
                attempt = attempt + 1,
                detail = %last_detail,
                "read attempt failed"
            );
            if attempt + 1 < attempts {
                sleep(self.policy.backoff(attempt)).await;
            }
        }

        event!(Level::WARN, path = %path.display(), detail = %last_detail, "read retries exhausted");
        Err(StoreError::LockedOrBusy {
            path: path.to_path_buf(),
            detail: last_detail,
        })
    }

    /// Waits for a network path to become visible.
    ///
    /// Local paths return immediately. Network paths are polled until they
    /// exist or the mount timeout elapses.
    pub async fn wait_for_mount(&self, path: &Path) -> Result<()> {
        if !self.mount.is_network_path(path) {
            return Ok(());
        }

        let started = Instant::now();
        loop {
            if self.fs.exists(path).await {
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= self.mount.timeout {
                event!(
                    Level::WARN,
                    path = %path.display(),
                    waited_ms = waited.as_millis() as u64,
                    "network path still not visible"
                );
                return Err(StoreError::NetworkUnmounted {
                    path: path.to_path_buf(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            sleep(self.mount.poll_interval).await;
        }
    }
}
