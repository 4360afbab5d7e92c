//! Single-file export container: a gzip-compressed tar holding the canonical
//! document (`data.json`) and a small manifest (`manifest.json`).

use crate::core::{CanonicalDocument, Result, StoreError};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use tar::{Archive, Builder, Header};

pub const ARCHIVE_DOCUMENT_ENTRY: &str = "data.json";
pub const ARCHIVE_MANIFEST_ENTRY: &str = "manifest.json";
pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveManifest {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub document_name: String,
    pub tool: String,
}

impl ArchiveManifest {
    pub fn new(document_name: &str) -> Self {
        Self {
            format_version: ARCHIVE_FORMAT_VERSION,
            created_at: Utc::now(),
            document_name: document_name.to_string(),
            tool: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnpackedArchive {
    /// Raw document text as stored in the archive
    pub document_text: String,
    pub document: CanonicalDocument,
    pub manifest: Option<ArchiveManifest>,
}

fn archive_err(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Archive(format!("{}: {}", context, err))
}

fn append_file(builder: &mut Builder<Vec<u8>>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(Utc::now().timestamp().max(0) as u64);
    header.set_entry_type(tar::EntryType::Regular);
    builder
        .append_data(&mut header, Path::new(name), bytes)
        .map_err(|err| archive_err(name, err))
}

pub fn pack(document_text: &str, manifest: &ArchiveManifest) -> Result<Vec<u8>> {
    let manifest_text = serde_json::to_string_pretty(manifest)?;

    let mut builder = Builder::new(Vec::new());
    append_file(&mut builder, ARCHIVE_DOCUMENT_ENTRY, document_text.as_bytes())?;
    append_file(&mut builder, ARCHIVE_MANIFEST_ENTRY, manifest_text.as_bytes())?;
    let tar_bytes = builder
        .into_inner()
        .map_err(|err| archive_err("finish tar", err))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&tar_bytes)
        .map_err(|err| archive_err("compress", err))?;
    encoder.finish().map_err(|err| archive_err("compress", err))
}

/// Extracts and validates the document of an archive.
///
/// Fails unless `data.json` is present and parses as a document. A missing
/// or unreadable manifest is tolerated.
pub fn unpack(bytes: &[u8]) -> Result<UnpackedArchive> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut document_text = None;
    let mut manifest = None;

    let entries = archive
        .entries()
        .map_err(|err| archive_err("read archive", err))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| archive_err("read entry", err))?;
        let name = entry
            .path()
            .map_err(|err| archive_err("entry path", err))?
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();

        match name.as_str() {
            ARCHIVE_DOCUMENT_ENTRY => {
                let mut text = String::new();
                entry
                    .read_to_string(&mut text)
                    .map_err(|err| archive_err(ARCHIVE_DOCUMENT_ENTRY, err))?;
                document_text = Some(text);
            }
            ARCHIVE_MANIFEST_ENTRY => {
                let mut text = String::new();
                if entry.read_to_string(&mut text).is_ok() {
                    manifest = serde_json::from_str(&text).ok();
                }
            }
            _ => {}
        }
    }

    let document_text = document_text.ok_or_else(|| {
        StoreError::Archive(format!("archive has no '{}' entry", ARCHIVE_DOCUMENT_ENTRY))
    })?;
    let document = CanonicalDocument::parse(&document_text)
        .map_err(|err| archive_err("archived document is not valid", err))?;

    Ok(UnpackedArchive {
        document_text,
        document,
        manifest,
    })
}
