use crate::config::StoreConfig;
use crate::core::{CanonicalDocument, ErrorKind, PartialDocument, Result, StoreError};
use crate::recovery::{DecisionPort, RecoveryDecision, RecoveryPrompt};
use crate::storage::archive::{self, ArchiveManifest};
use crate::storage::fs::{FileSystem, TokioFs, with_suffix};
use crate::storage::rescue::{self, RescueArtifact};
use crate::storage::{
    AtomicWriter, ConfigLocator, RecoveringReader, Relocation, RelocationPolicy, ResolvedLocation,
    SessionStore, WriteOutcome,
};
use crate::sync::{merge, overlay};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{Instrument, Level, event, info_span};

/// Result of a mutating operation that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The operation completed but something needs the user's attention,
    /// e.g. the payload only reached an emergency rescue file.
    SavedWithWarning {
        warning: String,
        rescue_path: Option<PathBuf>,
    },
    Canceled,
}

impl SaveOutcome {
    fn from_write(path: &Path, outcome: WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Committed { .. } => Self::Saved,
            WriteOutcome::EmergencySaved { rescue_path, cause } => Self::SavedWithWarning {
                warning: format!(
                    "Data was NOT written to '{}' ({}). An emergency copy was saved to '{}'.",
                    path.display(),
                    cause,
                    rescue_path.display()
                ),
                rescue_path: Some(rescue_path),
            },
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    Disk,
    CreatedDefault,
    RestoredFromRescue(PathBuf),
    /// Empty in-memory document; nothing was written.
    EmptyFallback,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: CanonicalDocument,
    pub source: LoadSource,
    pub path: PathBuf,
    pub warning: Option<String>,
}

#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Loaded(LoadedDocument),
    /// The decision port asked the process to quit.
    QuitRequested { kind: ErrorKind, path: PathBuf },
}

impl LoadOutcome {
    pub fn into_loaded(self) -> Option<LoadedDocument> {
        match self {
            Self::Loaded(loaded) => Some(loaded),
            Self::QuitRequested { .. } => None,
        }
    }
}

enum Resolution {
    Retry,
    Done(LoadOutcome),
}

/// Persistence manager for one application dataset.
///
/// Owns the writer (and with it the per-path write queues), the reader, the
/// config locator and the session store. All calling-layer operations go
/// through this type.
pub struct DocumentStore {
    config: StoreConfig,
    fs: Arc<dyn FileSystem>,
    writer: Arc<AtomicWriter>,
    reader: Arc<RecoveringReader>,
    locator: ConfigLocator,
    session: SessionStore,
    port: Arc<dyn DecisionPort>,
    location: RwLock<ResolvedLocation>,
}

impl DocumentStore {
    pub async fn open(config: StoreConfig, port: Arc<dyn DecisionPort>) -> Result<Self> {
        Self::open_with_fs(config, Arc::new(TokioFs), port).await
    }

    pub async fn open_with_fs(
        config: StoreConfig,
        fs: Arc<dyn FileSystem>,
        port: Arc<dyn DecisionPort>,
    ) -> Result<Self> {
        config.validate()?;

        let writer = Arc::new(AtomicWriter::new(fs.clone(), config.write.clone()));
        let reader = Arc::new(RecoveringReader::new(
            fs.clone(),
            config.read.clone(),
            config.mount.clone(),
        ));
        let locator = ConfigLocator::new(&config, fs.clone(), reader.clone(), writer.clone());
        let session = SessionStore::new(fs.clone(), config.session_path());

        let location = locator.resolve_path().await;
        event!(
            Level::INFO,
            path = %location.document_path.display(),
            is_default = location.is_default,
            origin = ?location.origin,
            "storage location resolved"
        );

        Ok(Self {
            config,
            fs,
            writer,
            reader,
            locator,
            session,
            port,
            location: RwLock::new(location),
        })
    }

    pub fn locator(&self) -> &ConfigLocator {
        &self.locator
    }

    pub async fn location(&self) -> ResolvedLocation {
        self.location.read().await.clone()
    }

    pub async fn document_path(&self) -> PathBuf {
        self.location.read().await.document_path.clone()
    }

    pub async fn buffer_path(&self) -> PathBuf {
        let document = self.document_path().await;
        document.with_file_name(format!("{}.buffer.json", rescue::base_name(&document)))
    }

    // ========================================================================
    // Load
    // ========================================================================

    pub async fn load_document(&self) -> Result<LoadOutcome> {
        let location = self.location().await;
        let span = info_span!("store.load", path = %location.document_path.display());
        self.load_at(location, true).instrument(span).await
    }

    /// Reads the document through the unified recovery step.
    ///
    /// With `commit` set, a default document created for a missing file and
    /// identifiers assigned to id-less items are written back before
    /// returning. Without it the caller is expected to write the result.
    async fn load_at(&self, location: ResolvedLocation, commit: bool) -> Result<LoadOutcome> {
        let path = location.document_path.clone();
        let mut round = 0;

        loop {
            if let Err(err) = self.reader.wait_for_mount(location.directory()).await {
                event!(Level::WARN, error = %err, "reading without visible mount");
            }

            let failure = match self.reader.read(&path).await {
                Ok(text) => match CanonicalDocument::parse(&text) {
                    Ok(mut document) => {
                        let assigned = document.ensure_ids();
                        let warning = if commit && assigned > 0 {
                            event!(Level::INFO, assigned, "committing assigned item ids");
                            self.commit_loaded(&path, &document).await?
                        } else {
                            None
                        };
                        return Ok(LoadOutcome::Loaded(LoadedDocument {
                            document,
                            source: LoadSource::Disk,
                            path,
                            warning,
                        }));
                    }
                    Err(err) => self.preserve_corrupt(&path, err).await,
                },
                Err(StoreError::NotFound(_)) if location.is_default => {
                    event!(Level::INFO, "no document at default location, creating one");
                    if !commit {
                        return Ok(LoadOutcome::Loaded(LoadedDocument {
                            document: CanonicalDocument::new(),
                            source: LoadSource::CreatedDefault,
                            path,
                            warning: None,
                        }));
                    }
                    return self.create_default(&path).await;
                }
                Err(err) => err,
            };

            round += 1;
            if round > self.config.max_prompt_rounds.max(1) {
                return Err(failure);
            }
            match self.attempt_rescue_recovery(&location, failure, round).await? {
                Resolution::Retry => continue,
                Resolution::Done(outcome) => return Ok(outcome),
            }
        }
    }

    async fn commit_loaded(
        &self,
        path: &Path,
        document: &CanonicalDocument,
    ) -> Result<Option<String>> {
        let payload = document.to_json_pretty()?;
        let outcome = self.writer.write(path, &payload).await?;
        Ok(match SaveOutcome::from_write(path, outcome) {
            SaveOutcome::SavedWithWarning { warning, .. } => Some(warning),
            _ => None,
        })
    }

    /// Copies an unparsable document aside and returns the `Corrupt` error
    /// describing it.
    async fn preserve_corrupt(&self, path: &Path, err: StoreError) -> StoreError {
        let backup_path = rescue::corrupt_backup_path(path, rescue::now_millis());
        let backup = match self.fs.copy(path, &backup_path).await {
            Ok(_) => {
                event!(Level::WARN, backup = %backup_path.display(), "corrupt document preserved");
                Some(backup_path)
            }
            Err(copy_err) => {
                event!(Level::ERROR, error = %copy_err, "could not preserve corrupt document");
                None
            }
        };
        StoreError::Corrupt {
            path: path.to_path_buf(),
            detail: err.to_string(),
            backup,
        }
    }

    /// Single recovery step shared by not-found, corrupt and locked failures:
    /// look for the newest rescue artifact and let the decision port choose.
    async fn attempt_rescue_recovery(
        &self,
        location: &ResolvedLocation,
        failure: StoreError,
        round: u32,
    ) -> Result<Resolution> {
        let path = &location.document_path;
        let rescue = match rescue::scan(self.fs.as_ref(), path).await {
            Ok(found) => found.into_iter().next(),
            Err(err) => {
                event!(Level::WARN, error = %err, "rescue scan failed");
                None
            }
        };

        let corrupt_backup = match &failure {
            StoreError::Corrupt { backup, .. } => backup.clone(),
            _ => None,
        };
        let prompt = RecoveryPrompt {
            kind: failure.kind(),
            path: path.clone(),
            detail: failure.to_string(),
            rescue,
            corrupt_backup,
            is_default_location: location.is_default,
            round,
        };

        let decision = self.port.decide(&prompt).await;
        event!(Level::INFO, kind = ?prompt.kind, ?decision, "recovery decision");

        let outcome = match decision {
            RecoveryDecision::RetryRead => return Ok(Resolution::Retry),
            RecoveryDecision::RestoreFromRescue(artifact) => {
                self.restore_rescue(path, &artifact).await?
            }
            RecoveryDecision::CreateDefaultDocument => self.create_default(path).await?,
            RecoveryDecision::AbortWithEmptyDocument => LoadOutcome::Loaded(LoadedDocument {
                document: CanonicalDocument::new(),
                source: LoadSource::EmptyFallback,
                path: path.clone(),
                warning: Some(failure.to_string()),
            }),
            RecoveryDecision::QuitProcess => LoadOutcome::QuitRequested {
                kind: prompt.kind,
                path: path.clone(),
            },
        };
        Ok(Resolution::Done(outcome))
    }

    async fn create_default(&self, path: &Path) -> Result<LoadOutcome> {
        let document = CanonicalDocument::new();
        let warning = self.commit_loaded(path, &document).await?;
        Ok(LoadOutcome::Loaded(LoadedDocument {
            document,
            source: LoadSource::CreatedDefault,
            path: path.to_path_buf(),
            warning,
        }))
    }

    async fn restore_rescue(&self, path: &Path, artifact: &RescueArtifact) -> Result<LoadOutcome> {
        let text = self.reader.read(&artifact.path).await?;
        let mut document = CanonicalDocument::parse(&text).map_err(|err| StoreError::Corrupt {
            path: artifact.path.clone(),
            detail: err.to_string(),
            backup: None,
        })?;
        document.ensure_ids();

        let payload = document.to_json_pretty()?;
        match self.writer.write(path, &payload).await? {
            WriteOutcome::Committed { .. } => {}
            WriteOutcome::EmergencySaved { rescue_path, cause } => {
                return Err(StoreError::LockedOrBusy {
                    path: path.to_path_buf(),
                    detail: format!(
                        "restore from '{}' did not commit: {} (copy kept at '{}')",
                        artifact.path.display(),
                        cause,
                        rescue_path.display()
                    ),
                });
            }
        }

        let consumed = rescue::mark_restored(self.fs.as_ref(), artifact).await?;
        event!(Level::INFO, artifact = %consumed.display(), "rescue artifact restored");
        Ok(LoadOutcome::Loaded(LoadedDocument {
            document,
            source: LoadSource::RestoredFromRescue(artifact.path.clone()),
            path: path.to_path_buf(),
            warning: None,
        }))
    }

    // ========================================================================
    // Save / sync
    // ========================================================================

    /// Saves `partial` over the current disk content. Every top-level field
    /// present in `partial` replaces the stored field.
    ///
    /// The current content is read through the same recovery step as
    /// `load_document`, so an unreadable or missing document is only replaced
    /// when the decision port says so. Declining returns `Canceled` and
    /// leaves the file untouched.
    pub async fn save_document(&self, partial: PartialDocument) -> Result<SaveOutcome> {
        let location = self.location().await;
        let span = info_span!("store.save", path = %location.document_path.display());
        self.save_at(location, partial).instrument(span).await
    }

    async fn save_at(
        &self,
        location: ResolvedLocation,
        partial: PartialDocument,
    ) -> Result<SaveOutcome> {
        let path = location.document_path.clone();
        let current = match self.load_at(location, false).await? {
            LoadOutcome::Loaded(loaded) if loaded.source != LoadSource::EmptyFallback => {
                loaded.document
            }
            _ => {
                event!(Level::WARN, "save declined, document left untouched");
                return Ok(SaveOutcome::Canceled);
            }
        };

        let mut updated = overlay(current, partial);
        updated.ensure_ids();
        let payload = updated.to_json_pretty()?;
        let outcome = self.writer.write(&path, &payload).await?;
        Ok(SaveOutcome::from_write(&path, outcome))
    }

    /// Writes the buffered snapshot to the buffer file. No merge.
    pub async fn save_buffer(&self, snapshot: &PartialDocument) -> Result<SaveOutcome> {
        let location = self.location().await;
        self.reader.wait_for_mount(location.directory()).await?;
        let path = self.buffer_path().await;
        let payload = serde_json::to_string_pretty(snapshot)?;
        let outcome = self.writer.write(&path, &payload).await?;
        Ok(SaveOutcome::from_write(&path, outcome))
    }

    pub async fn load_buffer(&self) -> Result<Option<PartialDocument>> {
        let location = self.location().await;
        self.reader.wait_for_mount(location.directory()).await?;
        let path = self.buffer_path().await;
        match self.reader.read(&path).await {
            Ok(text) => PartialDocument::parse(&text)
                .map(Some)
                .map_err(|err| StoreError::Corrupt {
                    path,
                    detail: err.to_string(),
                    backup: None,
                }),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Merges `local` into the current canonical document and commits it.
    ///
    /// The canonical document is re-read on every call so changes written
    /// by another machine since the last sync are kept. Sync never prompts:
    /// an invisible share, a missing document at a configured location and
    /// a corrupt document all fail the call without writing.
    pub async fn sync(&self, local: PartialDocument) -> Result<SaveOutcome> {
        let location = self.location().await;
        let span = info_span!("store.sync", path = %location.document_path.display());
        self.sync_at(&location, local).instrument(span).await
    }

    async fn sync_at(
        &self,
        location: &ResolvedLocation,
        local: PartialDocument,
    ) -> Result<SaveOutcome> {
        let path = &location.document_path;
        self.reader.wait_for_mount(location.directory()).await?;

        let main = match self.reader.read(path).await {
            Ok(text) => match CanonicalDocument::parse(&text) {
                Ok(document) => document,
                Err(err) => return Err(self.preserve_corrupt(path, err).await),
            },
            Err(StoreError::NotFound(_)) if location.is_default => CanonicalDocument::new(),
            Err(err) => return Err(err),
        };

        let mut merged = merge(main, local);
        merged.ensure_ids();
        let payload = merged.to_json_pretty()?;
        let outcome = self.writer.write(path, &payload).await?;
        Ok(SaveOutcome::from_write(path, outcome))
    }

    // ========================================================================
    // Session
    // ========================================================================

    pub async fn save_session<T: Serialize + ?Sized>(&self, snapshot: &T) -> Result<SaveOutcome> {
        self.session.save(snapshot).await?;
        Ok(SaveOutcome::Saved)
    }

    pub async fn load_session<T: DeserializeOwned>(&self) -> Option<T> {
        self.session.load().await
    }

    pub async fn clear_session(&self) -> Result<()> {
        self.session.clear().await
    }

    // ========================================================================
    // Location / archive
    // ========================================================================

    pub async fn relocate_storage(
        &self,
        new_dir: &Path,
        policy: RelocationPolicy,
    ) -> Result<SaveOutcome> {
        let current = self.location().await;
        match self.locator.change_location(&current, new_dir, policy).await? {
            Relocation::Moved(resolved) => {
                *self.location.write().await = resolved;
                Ok(SaveOutcome::Saved)
            }
            Relocation::Canceled => Ok(SaveOutcome::Canceled),
        }
    }

    pub async fn list_rescues(&self) -> Result<Vec<RescueArtifact>> {
        let path = self.document_path().await;
        rescue::scan(self.fs.as_ref(), &path).await
    }

    /// Bundles the canonical document into a compressed archive at `dest`.
    pub async fn export_archive(&self, dest: &Path) -> Result<SaveOutcome> {
        let location = self.location().await;
        let path = &location.document_path;
        self.reader.wait_for_mount(location.directory()).await?;
        let text = self.reader.read(path).await?;
        CanonicalDocument::parse(&text).map_err(|err| StoreError::Corrupt {
            path: path.clone(),
            detail: err.to_string(),
            backup: None,
        })?;

        let manifest = ArchiveManifest::new(&self.config.document_file_name);
        let bytes = archive::pack(&text, &manifest)?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs
                .create_dir_all(parent)
                .await
                .map_err(|err| StoreError::from_io(parent, &err))?;
        }
        let tmp = with_suffix(dest, ".tmp");
        self.fs
            .write_synced(&tmp, &bytes)
            .await
            .map_err(|err| StoreError::from_io(&tmp, &err))?;
        self.fs
            .rename(&tmp, dest)
            .await
            .map_err(|err| StoreError::from_io(dest, &err))?;
        event!(Level::INFO, dest = %dest.display(), bytes = bytes.len(), "archive exported");

        Ok(self.remember_artifact(&location, dest).await)
    }

    /// Replaces the canonical document with the one inside the archive at
    /// `src`. The archive is fully validated first and the existing document
    /// is copied to `<document>.bak` before it is overwritten.
    pub async fn import_archive(&self, src: &Path) -> Result<SaveOutcome> {
        let location = self.location().await;
        let path = &location.document_path;

        let bytes = self
            .fs
            .read(src)
            .await
            .map_err(|err| StoreError::from_io(src, &err))?;
        let mut unpacked = archive::unpack(&bytes)?;
        unpacked.document.ensure_ids();

        self.reader.wait_for_mount(location.directory()).await?;
        if self.fs.exists(path).await {
            let backup = with_suffix(path, ".bak");
            self.fs
                .copy(path, &backup)
                .await
                .map_err(|err| StoreError::from_io(&backup, &err))?;
            event!(Level::INFO, backup = %backup.display(), "document backed up before import");
        }

        let payload = unpacked.document.to_json_pretty()?;
        let outcome = self.writer.write(path, &payload).await?;
        let committed = outcome.is_committed();
        let result = SaveOutcome::from_write(path, outcome);
        if !committed {
            return Ok(result);
        }

        event!(Level::INFO, src = %src.display(), "archive imported");
        Ok(self.remember_artifact(&location, src).await)
    }

    async fn remember_artifact(&self, location: &ResolvedLocation, artifact: &Path) -> SaveOutcome {
        match self.locator.remember_artifact(location, artifact).await {
            Ok(updated) => {
                *self.location.write().await = updated;
                SaveOutcome::Saved
            }
            Err(err) => SaveOutcome::SavedWithWarning {
                warning: format!("Could not record last archive path: {}", err),
                rescue_path: None,
            },
        }
    }
}
