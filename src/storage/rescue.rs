//! Naming and discovery of rescue artifacts and corrupt backups.
//!
//! Rescue artifacts live next to the canonical document as
//! `<base>_conflict_<epoch-millis>.json`. Once restored they are renamed with
//! a `.restored` suffix so they are never offered again.

use super::fs::{FileSystem, with_suffix};
use crate::core::{Result, StoreError};
use chrono::{DateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};

const CONFLICT_MARKER: &str = "_conflict_";
const RESTORED_SUFFIX: &str = ".restored";

lazy_static! {
    static ref CONFLICT_NAME: Regex =
        Regex::new(r"^(?P<base>.+)_conflict_(?P<ts>\d+)\.json$").expect("static regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescueArtifact {
    pub path: PathBuf,
    pub created_at_ms: i64,
}

impl RescueArtifact {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at_ms).single()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Base name used in artifact names: the document's file stem.
pub fn base_name(document: &Path) -> String {
    document
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string())
}

pub fn rescue_path(document: &Path, created_at_ms: i64) -> PathBuf {
    document.with_file_name(format!(
        "{}{}{}.json",
        base_name(document),
        CONFLICT_MARKER,
        created_at_ms
    ))
}

pub fn corrupt_backup_path(document: &Path, created_at_ms: i64) -> PathBuf {
    with_suffix(document, &format!(".corrupt-{}", created_at_ms))
}

pub fn restored_path(artifact: &Path) -> PathBuf {
    with_suffix(artifact, RESTORED_SUFFIX)
}

/// Returns the timestamp encoded in `file_name` if it is a rescue artifact of
/// the document with base name `base`.
pub fn parse_artifact_name(file_name: &str, base: &str) -> Option<i64> {
    let captures = CONFLICT_NAME.captures(file_name)?;
    if &captures["base"] != base {
        return None;
    }
    captures["ts"].parse().ok()
}

/// Lists the rescue artifacts of `document`, newest first.
pub async fn scan(fs: &dyn FileSystem, document: &Path) -> Result<Vec<RescueArtifact>> {
    let Some(dir) = document.parent() else {
        return Ok(Vec::new());
    };
    let names = match fs.list_file_names(dir).await {
        Ok(names) => names,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::from_io(dir, &err)),
    };

    let base = base_name(document);
    let mut artifacts: Vec<RescueArtifact> = names
        .iter()
        .filter_map(|name| {
            parse_artifact_name(name, &base).map(|created_at_ms| RescueArtifact {
                path: dir.join(name),
                created_at_ms,
            })
        })
        .collect();
    artifacts.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
    Ok(artifacts)
}

/// Renames a consumed artifact so later scans skip it.
pub async fn mark_restored(fs: &dyn FileSystem, artifact: &RescueArtifact) -> Result<PathBuf> {
    let target = restored_path(&artifact.path);
    fs.rename(&artifact.path, &target)
        .await
        .map_err(|err| StoreError::from_io(&artifact.path, &err))?;
    Ok(target)
}
