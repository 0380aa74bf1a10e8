//! Credential storage on disk.

use glimpse_engine::{CREDENTIAL_KEY, DecryptError, ENCRYPTION_KEY, FileStore, KeyValueStore};
use glimpse_types::{BusRequest, BusStatus};
use wiremock::MockServer;

use crate::common::{config_for, file_gateway, mount_catalog};

#[tokio::test]
async fn credential_is_encrypted_at_rest_and_survives_restart() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path());

    file_gateway(&config)
        .secrets()
        .store_credential("sk-or-v1-disk-credential")
        .unwrap();

    let raw = std::fs::read_to_string(dir.path().join("local.json")).unwrap();
    assert!(!raw.contains("sk-or-v1-disk-credential"));
    assert!(raw.contains(CREDENTIAL_KEY));
    assert!(raw.contains(ENCRYPTION_KEY));

    let reopened = file_gateway(&config);
    let key = reopened.secrets().load_credential().unwrap().unwrap();
    assert_eq!(key.expose_secret(), "sk-or-v1-disk-credential");
}

#[tokio::test]
async fn truncated_stored_payload_is_a_clean_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path());

    {
        let store = FileStore::open(dir.path().join("local.json")).unwrap();
        store
            .set(CREDENTIAL_KEY, serde_json::Value::String("AAAA".to_string()))
            .unwrap();
    }

    let gateway = file_gateway(&config);
    let err = gateway.secrets().load_credential().unwrap_err();
    assert!(matches!(err, DecryptError::InvalidEncryptedPayload));
    assert_eq!(err.to_string(), "Invalid encrypted token payload.");
}

#[tokio::test]
async fn clearing_removes_the_credential() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path());

    let gateway = file_gateway(&config);
    gateway.secrets().store_credential("sk-or-v1-to-clear").unwrap();
    gateway.secrets().clear_credential().unwrap();
    assert!(gateway.secrets().load_credential().unwrap().is_none());

    let reopened = file_gateway(&config);
    assert!(reopened.secrets().load_credential().unwrap().is_none());
}

#[tokio::test]
async fn rotation_by_another_process_is_seen_and_kept() {
    let server = MockServer::start().await;
    mount_catalog(&server, 1).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&server, dir.path());

    let serving = file_gateway(&config);
    serving
        .secrets()
        .store_credential("sk-or-v1-old-credential")
        .unwrap();

    // `glimpse credential set` opens its own handle on the same file.
    file_gateway(&config)
        .secrets()
        .store_credential("sk-or-v1-new-credential")
        .unwrap();

    let seen = serving.secrets().load_credential().unwrap().unwrap();
    assert_eq!(seen.expose_secret(), "sk-or-v1-new-credential");

    let response = serving
        .dispatch(BusRequest::UpdateKnownModelsAndPricing)
        .await;
    assert_eq!(response.status, BusStatus::Success);

    let reopened = file_gateway(&config);
    let on_disk = reopened.secrets().load_credential().unwrap().unwrap();
    assert_eq!(on_disk.expose_secret(), "sk-or-v1-new-credential");
}
