//! Integration tests for archive export and import.

mod common;

use common::sandbox;
use docguard::storage::archive::{self, ArchiveManifest};
use docguard::{DocumentStore, PartialDocument, PolicyPort, SaveOutcome, StoreError};
use serde_json::{Value, json};
use std::sync::Arc;

async fn open_with_entries() -> (tempfile::TempDir, DocumentStore) {
    let (root, config) = sandbox();
    let store = DocumentStore::open(config, Arc::new(PolicyPort)).await.unwrap();
    store.load_document().await.unwrap();
    store
        .save_document(PartialDocument {
            entries: Some(serde_json::from_value(json!([{"id": "e1", "total": 42}])).unwrap()),
            ..PartialDocument::default()
        })
        .await
        .unwrap();
    (root, store)
}

#[tokio::test]
async fn test_export_then_import_restores_document() {
    let (root, store) = open_with_entries().await;
    let archive_path = root.path().join("exports").join("backup.tar.gz");

    assert_eq!(
        store.export_archive(&archive_path).await.unwrap(),
        SaveOutcome::Saved
    );
    let unpacked = archive::unpack(&std::fs::read(&archive_path).unwrap()).unwrap();
    assert_eq!(unpacked.document.entries.len(), 1);
    assert_eq!(unpacked.manifest.unwrap().document_name, "data.json");

    store
        .save_document(PartialDocument::default().with_entries(vec![]))
        .await
        .unwrap();
    let outcome = store.import_archive(&archive_path).await.unwrap();

    assert_eq!(outcome, SaveOutcome::Saved);
    let document_path = store.document_path().await;
    let restored: Value =
        serde_json::from_str(&std::fs::read_to_string(&document_path).unwrap()).unwrap();
    assert_eq!(restored["entries"], json!([{"id": "e1", "total": 42}]));

    let backup: Value = serde_json::from_str(
        &std::fs::read_to_string(document_path.with_file_name("data.json.bak")).unwrap(),
    )
    .unwrap();
    assert_eq!(backup["entries"], json!([]));
}

#[tokio::test]
async fn test_invalid_archive_leaves_document_untouched() {
    let (root, store) = open_with_entries().await;
    let document_path = store.document_path().await;
    let before = std::fs::read_to_string(&document_path).unwrap();

    let bogus = root.path().join("bogus.tar.gz");
    std::fs::write(
        &bogus,
        archive::pack("{\"entries\": [", &ArchiveManifest::new("data.json")).unwrap(),
    )
    .unwrap();

    let err = store.import_archive(&bogus).await.unwrap_err();

    assert!(matches!(err, StoreError::Archive(_)));
    assert_eq!(std::fs::read_to_string(&document_path).unwrap(), before);
    assert!(!document_path.with_file_name("data.json.bak").exists());
}

#[tokio::test]
async fn test_import_of_missing_file_is_not_found() {
    let (root, store) = open_with_entries().await;

    let err = store
        .import_archive(&root.path().join("nowhere.tar.gz"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), docguard::ErrorKind::NotFound);
}

#[tokio::test]
async fn test_export_path_remembered_in_config_record() {
    let (root, config) = sandbox();
    let primary = config.primary_config_path.clone();
    let store = DocumentStore::open(config, Arc::new(PolicyPort)).await.unwrap();
    let data_dir = root.path().join("nas");
    store
        .relocate_storage(&data_dir, docguard::RelocationPolicy::StartFresh)
        .await
        .unwrap();

    let archive_path = root.path().join("last.tar.gz");
    store.export_archive(&archive_path).await.unwrap();

    assert_eq!(
        store.location().await.last_artifact_path(),
        Some(archive_path.as_path())
    );
    let record: Value = serde_json::from_str(&std::fs::read_to_string(primary).unwrap()).unwrap();
    assert_eq!(record["lastArtifactPath"], json!(archive_path));
}
