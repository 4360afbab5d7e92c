//! Resolution of the storage directory from a primary config record and its
//! redundant backup copy.
//!
//! Resolution order:
//! 1. primary record (and refresh the backup when it is missing or differs),
//! 2. backup record (and restore the primary from it),
//! 3. the default documents directory, flagged with `is_default = true` so
//!    the caller can ask the user before treating it as authoritative.

use super::atomic::{AtomicWriter, WriteOutcome};
use super::fs::FileSystem;
use super::reader::RecoveringReader;
use crate::config::StoreConfig;
use crate::core::{CanonicalDocument, ErrorKind, Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, event};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRecord {
    pub data_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_artifact_path: Option<PathBuf>,
}

impl ConfigRecord {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            last_artifact_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationOrigin {
    Primary,
    RestoredFromBackup,
    /// No config record resolved.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub document_path: PathBuf,
    pub is_default: bool,
    pub origin: LocationOrigin,
    pub record: Option<ConfigRecord>,
}

impl ResolvedLocation {
    pub fn directory(&self) -> &Path {
        self.document_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn last_artifact_path(&self) -> Option<&Path> {
        self.record
            .as_ref()
            .and_then(|record| record.last_artifact_path.as_deref())
    }
}

/// What to do when the relocation target holds no document yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationPolicy {
    CopyExisting,
    StartFresh,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    Moved(ResolvedLocation),
    Canceled,
}

pub struct ConfigLocator {
    fs: Arc<dyn FileSystem>,
    reader: Arc<RecoveringReader>,
    writer: Arc<AtomicWriter>,
    primary: PathBuf,
    backup: PathBuf,
    default_dir: PathBuf,
    document_file_name: String,
}

impl ConfigLocator {
    pub fn new(
        config: &StoreConfig,
        fs: Arc<dyn FileSystem>,
        reader: Arc<RecoveringReader>,
        writer: Arc<AtomicWriter>,
    ) -> Self {
        Self {
            fs,
            reader,
            writer,
            primary: config.primary_config_path.clone(),
            backup: config.backup_config_path.clone(),
            default_dir: config.default_documents_dir.clone(),
            document_file_name: config.document_file_name.clone(),
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub async fn resolve_path(&self) -> ResolvedLocation {
        match self.read_record().await {
            Ok((record, origin)) => ResolvedLocation {
                document_path: record.data_path.join(&self.document_file_name),
                is_default: false,
                origin,
                record: Some(record),
            },
            Err(err) => {
                event!(Level::WARN, error = %err, "falling back to default storage location");
                ResolvedLocation {
                    document_path: self.default_dir.join(&self.document_file_name),
                    is_default: true,
                    origin: LocationOrigin::Default,
                    record: None,
                }
            }
        }
    }

    /// Reads the config record with primary/backup self-healing.
    ///
    /// Returns `ConfigMissing` when neither copy resolves.
    pub async fn read_record(&self) -> Result<(ConfigRecord, LocationOrigin)> {
        match self.load(&self.primary).await {
            Ok((record, raw)) => {
                self.refresh_backup(&raw).await;
                Ok((record, LocationOrigin::Primary))
            }
            Err(primary_err) => {
                if primary_err.kind() != ErrorKind::NotFound {
                    event!(Level::WARN, error = %primary_err, "primary config unreadable");
                }
                match self.load(&self.backup).await {
                    Ok((record, raw)) => {
                        self.restore_primary(&raw).await;
                        Ok((record, LocationOrigin::RestoredFromBackup))
                    }
                    Err(backup_err) => {
                        event!(
                            Level::DEBUG,
                            primary_error = %primary_err,
                            backup_error = %backup_err,
                            "no config record resolved"
                        );
                        Err(StoreError::ConfigMissing {
                            primary: self.primary.clone(),
                            backup: self.backup.clone(),
                        })
                    }
                }
            }
        }
    }

    async fn load(&self, path: &Path) -> Result<(ConfigRecord, String)> {
        let raw = self.reader.read(path).await?;
        let record: ConfigRecord =
            serde_json::from_str(&raw).map_err(|err| StoreError::Corrupt {
                path: path.to_path_buf(),
                detail: err.to_string(),
                backup: None,
            })?;
        if record.data_path.as_os_str().is_empty() {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                detail: "dataPath is empty".to_string(),
                backup: None,
            });
        }
        Ok((record, raw))
    }

    async fn refresh_backup(&self, raw: &str) {
        let current = self.fs.read_to_string(&self.backup).await.ok();
        if current.as_deref().map(str::trim) == Some(raw.trim()) {
            return;
        }
        match self.writer.write(&self.backup, raw).await {
            Ok(WriteOutcome::Committed { .. }) => {
                event!(Level::DEBUG, path = %self.backup.display(), "config backup refreshed");
            }
            Ok(outcome) => {
                event!(Level::WARN, ?outcome, "config backup not refreshed");
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "config backup not refreshed");
            }
        }
    }

    async fn restore_primary(&self, raw: &str) {
        match self.writer.write(&self.primary, raw).await {
            Ok(WriteOutcome::Committed { .. }) => {
                event!(Level::INFO, path = %self.primary.display(), "primary config restored from backup");
            }
            Ok(outcome) => {
                event!(Level::WARN, ?outcome, "primary config could not be restored");
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "primary config could not be restored");
            }
        }
    }

    /// Writes the record to the primary location (required) and to the
    /// backup location (best effort).
    pub async fn write_record(&self, record: &ConfigRecord) -> Result<()> {
        let raw = serde_json::to_string_pretty(record)?;
        match self.writer.write(&self.primary, &raw).await? {
            WriteOutcome::Committed { .. } => {}
            WriteOutcome::EmergencySaved { rescue_path, cause } => {
                return Err(StoreError::LockedOrBusy {
                    path: self.primary.clone(),
                    detail: format!("{} (copy kept at '{}')", cause, rescue_path.display()),
                });
            }
        }

        match self.writer.write(&self.backup, &raw).await {
            Ok(WriteOutcome::Committed { .. }) => {}
            Ok(outcome) => {
                event!(Level::WARN, ?outcome, "config backup write did not commit");
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "config backup write failed");
            }
        }
        Ok(())
    }

    /// Moves the storage location to `new_dir`.
    ///
    /// An existing document at the target is adopted if it parses. Otherwise
    /// `policy` decides whether the current document is copied, a fresh one
    /// is created, or nothing changes.
    pub async fn change_location(
        &self,
        current: &ResolvedLocation,
        new_dir: &Path,
        policy: RelocationPolicy,
    ) -> Result<Relocation> {
        self.reader.wait_for_mount(new_dir).await?;
        self.fs
            .create_dir_all(new_dir)
            .await
            .map_err(|err| StoreError::from_io(new_dir, &err))?;

        let target = new_dir.join(&self.document_file_name);
        if self.fs.exists(&target).await {
            let text = self.reader.read(&target).await?;
            CanonicalDocument::parse(&text).map_err(|err| StoreError::Corrupt {
                path: target.clone(),
                detail: err.to_string(),
                backup: None,
            })?;
            event!(Level::INFO, path = %target.display(), "adopting existing document");
        } else {
            let payload = match policy {
                RelocationPolicy::Cancel => return Ok(Relocation::Canceled),
                RelocationPolicy::StartFresh => CanonicalDocument::new().to_json_pretty()?,
                RelocationPolicy::CopyExisting => self.current_payload(current).await?,
            };
            if let WriteOutcome::EmergencySaved { rescue_path, cause } =
                self.writer.write(&target, &payload).await?
            {
                return Err(StoreError::LockedOrBusy {
                    path: target,
                    detail: format!("{} (copy kept at '{}')", cause, rescue_path.display()),
                });
            }
        }

        let record = ConfigRecord {
            data_path: new_dir.to_path_buf(),
            last_artifact_path: current
                .record
                .as_ref()
                .and_then(|record| record.last_artifact_path.clone()),
        };
        self.write_record(&record).await?;
        event!(Level::INFO, dir = %new_dir.display(), "storage location changed");

        Ok(Relocation::Moved(ResolvedLocation {
            document_path: target,
            is_default: false,
            origin: LocationOrigin::Primary,
            record: Some(record),
        }))
    }

    async fn current_payload(&self, current: &ResolvedLocation) -> Result<String> {
        match self.reader.read(&current.document_path).await {
            Ok(text) => {
                let document = CanonicalDocument::parse(&text).map_err(|err| StoreError::Corrupt {
                    path: current.document_path.clone(),
                    detail: err.to_string(),
                    backup: None,
                })?;
                document.to_json_pretty()
            }
            Err(StoreError::NotFound(_)) => CanonicalDocument::new().to_json_pretty(),
            Err(err) => Err(err),
        }
    }

    /// Records the last exported/imported archive in the config record.
    ///
    /// At the default location there is no record to update; the path is
    /// only kept in the returned location.
    pub async fn remember_artifact(
        &self,
        current: &ResolvedLocation,
        artifact: &Path,
    ) -> Result<ResolvedLocation> {
        let mut updated = current.clone();
        match updated.record.as_mut() {
            Some(record) => {
                record.last_artifact_path = Some(artifact.to_path_buf());
                let record = record.clone();
                self.write_record(&record).await?;
            }
            None => {
                event!(Level::DEBUG, "default location, artifact path not persisted");
            }
        }
        Ok(updated)
    }
}
