//! Integration tests for config record self-healing and storage relocation.

mod common;

use common::{FaultyFs, Op, sandbox};
use docguard::storage::{LocationOrigin, Relocation};
use docguard::{DocumentStore, PolicyPort, RelocationPolicy, SaveOutcome, StoreConfig};
use serde_json::json;
use std::io;
use std::path::Path;
use std::sync::Arc;

fn write_record(path: &Path, data_path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        path,
        serde_json::to_string_pretty(&json!({"dataPath": data_path})).unwrap(),
    )
    .unwrap();
}

async fn open(config: StoreConfig) -> DocumentStore {
    DocumentStore::open(config, Arc::new(PolicyPort)).await.unwrap()
}

#[tokio::test]
async fn test_primary_restored_byte_identical_from_backup() {
    let (root, config) = sandbox();
    let data_dir = root.path().join("nas");
    write_record(&config.backup_config_path, &data_dir);
    let backup_text = std::fs::read_to_string(&config.backup_config_path).unwrap();
    let primary = config.primary_config_path.clone();

    let store = open(config).await;
    let location = store.location().await;

    assert_eq!(location.origin, LocationOrigin::RestoredFromBackup);
    assert!(!location.is_default);
    assert_eq!(location.document_path, data_dir.join("data.json"));
    assert_eq!(std::fs::read_to_string(primary).unwrap(), backup_text);
}

#[tokio::test]
async fn test_missing_backup_refreshed_from_primary() {
    let (root, config) = sandbox();
    let data_dir = root.path().join("nas");
    write_record(&config.primary_config_path, &data_dir);
    let primary_text = std::fs::read_to_string(&config.primary_config_path).unwrap();
    let backup = config.backup_config_path.clone();

    let store = open(config).await;

    assert_eq!(store.location().await.origin, LocationOrigin::Primary);
    assert_eq!(std::fs::read_to_string(backup).unwrap(), primary_text);
}

#[tokio::test]
async fn test_corrupt_primary_falls_back_to_backup() {
    let (root, config) = sandbox();
    let data_dir = root.path().join("nas");
    write_record(&config.backup_config_path, &data_dir);
    std::fs::create_dir_all(config.primary_config_path.parent().unwrap()).unwrap();
    std::fs::write(&config.primary_config_path, "{\"dataPa").unwrap();

    let store = open(config).await;

    assert_eq!(
        store.location().await.document_path,
        data_dir.join("data.json")
    );
}

#[tokio::test]
async fn test_no_record_resolves_to_flagged_default() {
    let (_root, config) = sandbox();
    let expected = config.default_document_path();

    let store = open(config).await;
    let location = store.location().await;

    assert!(location.is_default);
    assert_eq!(location.origin, LocationOrigin::Default);
    assert_eq!(location.document_path, expected);
}

#[tokio::test]
async fn test_read_record_reports_config_missing() {
    let (_root, config) = sandbox();
    let store = open(config).await;

    let err = store.locator().read_record().await.unwrap_err();
    assert_eq!(err.kind(), docguard::ErrorKind::ConfigMissing);
}

#[tokio::test]
async fn test_relocation_copies_current_document_and_writes_both_records() {
    let (root, config) = sandbox();
    let primary = config.primary_config_path.clone();
    let backup = config.backup_config_path.clone();
    let store = open(config).await;
    store.load_document().await.unwrap();
    store
        .save_document(docguard::PartialDocument::default().with_color_categories(vec![
            "Warm".to_string(),
        ]))
        .await
        .unwrap();

    let target = root.path().join("moved");
    let outcome = store
        .relocate_storage(&target, RelocationPolicy::CopyExisting)
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Saved);
    let moved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(target.join("data.json")).unwrap()).unwrap();
    assert_eq!(moved["colorCategories"], json!(["Warm"]));

    let location = store.location().await;
    assert!(!location.is_default);
    assert_eq!(location.document_path, target.join("data.json"));
    for record in [primary, backup] {
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(record).unwrap()).unwrap();
        assert_eq!(value["dataPath"], json!(target));
    }
}

#[tokio::test]
async fn test_relocation_adopts_existing_document() {
    let (root, config) = sandbox();
    let target = root.path().join("existing");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("data.json"), r#"{"materialCategories":["Oak"]}"#).unwrap();
    let store = open(config).await;

    store
        .relocate_storage(&target, RelocationPolicy::StartFresh)
        .await
        .unwrap();
    let loaded = store.load_document().await.unwrap().into_loaded().unwrap();

    assert_eq!(loaded.document.material_categories, vec!["Oak".to_string()]);
}

#[tokio::test]
async fn test_relocation_cancel_leaves_everything_untouched() {
    let (root, config) = sandbox();
    let primary = config.primary_config_path.clone();
    let store = open(config).await;
    let before = store.location().await;

    let target = root.path().join("empty");
    let outcome = store
        .relocate_storage(&target, RelocationPolicy::Cancel)
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Canceled);
    assert_eq!(store.location().await, before);
    assert!(!primary.exists());
    assert!(!target.join("data.json").exists());
}

#[tokio::test]
async fn test_relocation_fails_when_primary_record_cannot_commit() {
    let (root, config) = sandbox();
    let fs = FaultyFs::new();
    fs.fail_always(Op::WriteSynced, "config/config.json.tmp", io::ErrorKind::ResourceBusy);
    let store = DocumentStore::open_with_fs(config, fs, Arc::new(PolicyPort))
        .await
        .unwrap();
    let target = root.path().join("moved");

    let result = store
        .locator()
        .change_location(&store.location().await, &target, RelocationPolicy::StartFresh)
        .await;

    assert!(result.is_err());
    assert!(store.location().await.is_default);
}

#[tokio::test]
async fn test_relocation_survives_failed_backup_record_write() {
    let (root, config) = sandbox();
    let primary = config.primary_config_path.clone();
    let fs = FaultyFs::new();
    fs.fail_always(Op::WriteSynced, "backup/config.json.tmp", io::ErrorKind::PermissionDenied);
    let store = DocumentStore::open_with_fs(config, fs, Arc::new(PolicyPort))
        .await
        .unwrap();
    let target = root.path().join("moved");

    let outcome = store
        .relocate_storage(&target, RelocationPolicy::StartFresh)
        .await
        .unwrap();

    assert_eq!(outcome, SaveOutcome::Saved);
    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(primary).unwrap()).unwrap();
    assert_eq!(record["dataPath"], json!(target));
    assert!(!store.locator().backup_path().exists());

    let location = store.location().await;
    assert!(!location.is_default);
    assert_eq!(location.document_path, target.join("data.json"));
}

#[tokio::test]
async fn test_relocated_store_reopens_at_new_location() {
    let (root, config) = sandbox();
    let target = root.path().join("moved");
    {
        let store = open(config.clone()).await;
        let moved = store
            .relocate_storage(&target, RelocationPolicy::StartFresh)
            .await
            .unwrap();
        assert!(moved.is_saved());
    }

    let reopened = open(config).await;
    let location = reopened.location().await;
    assert_eq!(location.origin, LocationOrigin::Primary);
    assert_eq!(location.document_path, target.join("data.json"));
    assert!(matches!(
        reopened
            .locator()
            .change_location(&location, &target, RelocationPolicy::Cancel)
            .await
            .unwrap(),
        Relocation::Moved(_)
    ));
}
