//! Integration tests for batch orchestration over a real catalog.
//!
//! HTTP-backed cases run against wiremock; the rest use in-process backends.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use organizer_core::backend::{ClientOptions, HttpBackend};
use organizer_core::catalog::{CatalogEntry, CatalogStore, ModelType, SqliteCatalog};
use organizer_core::download::{
    BatchStatus, DownloadOrchestrator, DownloadSettings, EntryStatus, ModelDirectories,
    StartOutcome,
};
use organizer_core::{BackendRegistry, Database};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::backends::{BlockingBackend, StaticBackend};
use support::socket_guard::start_mock_server_or_skip;

const MODEL_BYTES: &[u8] = b"0123456789";
const MODEL_MD5: &str = "781e5e245d69b566979b86e28d23f2c7";
const MODEL_SHA256: &str = "84d89877f0d4041efb6bf91a16f0248f2fd573e6af05c19f96bedb9f882f7882";

async fn catalog() -> Arc<SqliteCatalog> {
    Arc::new(SqliteCatalog::new(
        Database::new_in_memory().await.expect("in-memory db"),
    ))
}

fn settings(root: &Path) -> DownloadSettings {
    DownloadSettings {
        directories: ModelDirectories::under(root),
        ..DownloadSettings::default()
    }
}

fn http_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(
        HttpBackend::new(&ClientOptions::default()).expect("http backend"),
    ));
    registry
}

/// Lists directory entries, including hidden temp files.
fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_batch_downloads_model_and_preview_then_reports_failed_entry() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/models/detail.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MODEL_BYTES.to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/images/detail.jpeg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEGDATA".to_vec()))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let catalog = catalog().await;

    let mut good = CatalogEntry::new(
        "Detail",
        ModelType::Lora,
        format!("{}/models/detail.bin", server.uri()),
    );
    good.preview_url = format!("{}/images/detail.jpeg", server.uri());
    good.id = Some(catalog.insert(&good).await.unwrap());

    let mut empty = CatalogEntry::new("Broken", ModelType::Lora, "");
    empty.id = Some(catalog.insert(&empty).await.unwrap());

    let orchestrator = DownloadOrchestrator::new(
        Arc::new(http_registry()),
        catalog.clone(),
        settings(root.path()),
    );
    assert_eq!(
        orchestrator.start(vec![good.clone(), empty.clone()]),
        StartOutcome::Started
    );
    orchestrator.wait().await;

    let state = orchestrator.state();
    assert_eq!(state.status, BatchStatus::Error);

    let lora_dir = root.path().join("Lora");
    let model_path = lora_dir.join("detail.bin");
    let first = state.entry_by_id(good.id.unwrap()).unwrap();
    assert_eq!(first.status, EntryStatus::Completed);
    assert_eq!(first.filename.as_deref(), Some("detail.bin"));
    assert_eq!(first.destination.as_deref(), Some(model_path.as_path()));
    assert_eq!(first.progress.unwrap().bytes_ready, MODEL_BYTES.len() as u64);
    assert!(first.preview_error.is_none());
    assert_eq!(std::fs::read(&model_path).unwrap(), MODEL_BYTES);
    assert_eq!(
        std::fs::read(lora_dir.join("detail.jpeg")).unwrap(),
        b"JPEGDATA"
    );
    assert_eq!(dir_names(&lora_dir), vec!["detail.bin", "detail.jpeg"]);

    let stored = catalog.get_by_id(good.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.location.as_deref(), Some(model_path.as_path()));
    assert_eq!(stored.md5_hash.as_deref(), Some(MODEL_MD5));
    assert_eq!(stored.sha256_hash.as_deref(), Some(MODEL_SHA256));
    assert!(stored.is_downloaded());

    let second = state.entry_by_id(empty.id.unwrap()).unwrap();
    assert_eq!(second.status, EntryStatus::Error);
    let error = second.error.as_ref().unwrap();
    assert_eq!(error.kind, "NoBackendError");
    assert!(error.to_string().starts_with("NoBackendError: "));
    assert!(catalog.get_by_id(empty.id.unwrap()).await.unwrap().unwrap().location.is_none());
}

#[tokio::test]
async fn test_preview_failure_does_not_fail_entry() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/models/v.safetensors"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MODEL_BYTES.to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/images/v.webp"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let mut entry = CatalogEntry::new(
        "V",
        ModelType::Vae,
        format!("{}/models/v.safetensors", server.uri()),
    );
    entry.preview_url = format!("{}/images/v.webp", server.uri());

    let orchestrator =
        DownloadOrchestrator::new(Arc::new(http_registry()), catalog().await, settings(root.path()));
    orchestrator.start(vec![entry]);
    orchestrator.wait().await;

    let state = orchestrator.state();
    assert_eq!(state.status, BatchStatus::Completed);
    let entry = state.entry("unsaved-0").unwrap();
    assert_eq!(entry.status, EntryStatus::Completed);
    assert_eq!(entry.preview_filename.as_deref(), Some("v.webp"));
    assert_eq!(entry.preview_error.as_ref().unwrap().kind, "HttpStatusError");
    assert!(root.path().join("VAE").join("v.safetensors").exists());
    assert_eq!(dir_names(&root.path().join("VAE")), vec!["v.safetensors"]);
}

#[tokio::test]
async fn test_existing_destination_short_circuits_transfer() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("keep.bin"), b"original").unwrap();

    let backend = StaticBackend::new(MODEL_BYTES);
    let mut registry = BackendRegistry::new();
    registry.register(backend.clone());

    let catalog = catalog().await;
    let mut entry = CatalogEntry::new("Keep", ModelType::Other, "test://keep");
    entry.download_path = Some(root.path().to_path_buf());
    entry.download_filename = Some("keep.bin".into());
    entry.id = Some(catalog.insert(&entry).await.unwrap());

    let orchestrator =
        DownloadOrchestrator::new(Arc::new(registry), catalog.clone(), DownloadSettings::default());
    orchestrator.start(vec![entry.clone()]);
    orchestrator.wait().await;

    let state = orchestrator.state();
    assert_eq!(state.status, BatchStatus::Completed);
    assert_eq!(state.entries[0].status, EntryStatus::Exists);
    assert_eq!(backend.transfer_count(), 0);
    assert_eq!(std::fs::read(root.path().join("keep.bin")).unwrap(), b"original");
    let stored = catalog.get_by_id(entry.id.unwrap()).await.unwrap().unwrap();
    assert!(stored.md5_hash.is_none());
}

#[tokio::test]
async fn test_stop_mid_transfer_cancels_remaining_and_leaves_no_partial_files() {
    let root = TempDir::new().unwrap();
    let blocking = BlockingBackend::new();
    let fast = StaticBackend::new(MODEL_BYTES);
    let mut registry = BackendRegistry::new();
    registry.register(blocking.clone());
    registry.register(fast.clone());

    let mut first = CatalogEntry::new("Slow", ModelType::Checkpoint, "slow://big.ckpt");
    first.id = Some(1);
    let mut second = CatalogEntry::new("Next", ModelType::Checkpoint, "test://next.ckpt");
    second.id = Some(2);

    let orchestrator =
        DownloadOrchestrator::new(Arc::new(registry), catalog().await, settings(root.path()));
    orchestrator.start(vec![first, second]);

    tokio::time::timeout(Duration::from_secs(5), blocking.started.notified())
        .await
        .expect("transfer should start");
    assert!(orchestrator.is_running());
    orchestrator.stop().await;
    assert!(!orchestrator.is_running());

    let state = orchestrator.state();
    assert_eq!(state.status, BatchStatus::Cancelled);
    assert_eq!(state.entry("1").unwrap().status, EntryStatus::Cancelled);
    assert_eq!(state.entry("2").unwrap().status, EntryStatus::Cancelled);
    assert_eq!(fast.transfer_count(), 0);

    let checkpoint_dir = root.path().join("Stable-diffusion");
    assert!(dir_names(&checkpoint_dir).is_empty(), "{:?}", dir_names(&checkpoint_dir));
}

#[tokio::test]
async fn test_second_start_while_running_is_ignored() {
    let root = TempDir::new().unwrap();
    let blocking = BlockingBackend::new();
    let mut registry = BackendRegistry::new();
    registry.register(blocking.clone());

    let mut entry = CatalogEntry::new("Slow", ModelType::Lora, "slow://a.bin");
    entry.id = Some(5);

    let orchestrator =
        DownloadOrchestrator::new(Arc::new(registry), catalog().await, settings(root.path()));
    assert_eq!(orchestrator.start(vec![entry.clone()]), StartOutcome::Started);
    tokio::time::timeout(Duration::from_secs(5), blocking.started.notified())
        .await
        .expect("transfer should start");

    assert_eq!(orchestrator.start(vec![entry]), StartOutcome::AlreadyRunning);
    assert_eq!(orchestrator.runs_started(), 1);
    assert_eq!(orchestrator.state().entries.len(), 1);

    orchestrator.stop().await;
    assert_eq!(blocking.transfers.load(std::sync::atomic::Ordering::SeqCst), 1);

    // A finished run frees the orchestrator for the next one.
    let mut next = CatalogEntry::new("Other", ModelType::Lora, "");
    next.id = Some(6);
    assert_eq!(orchestrator.start(vec![next]), StartOutcome::Started);
    orchestrator.wait().await;
    assert_eq!(orchestrator.runs_started(), 2);
    assert_eq!(orchestrator.state().status, BatchStatus::Error);
}

#[tokio::test]
async fn test_entries_run_in_submission_order() {
    let root = TempDir::new().unwrap();
    let backend = StaticBackend::new(MODEL_BYTES);
    let mut registry = BackendRegistry::new();
    registry.register(backend.clone());

    let entries: Vec<CatalogEntry> = (1..=3)
        .map(|id| {
            let mut entry =
                CatalogEntry::new(format!("m{id}"), ModelType::Embedding, format!("test://m{id}"));
            entry.id = Some(id);
            entry
        })
        .collect();

    let orchestrator =
        DownloadOrchestrator::new(Arc::new(registry), catalog().await, settings(root.path()));
    orchestrator.start(entries);
    orchestrator.wait().await;

    let state = orchestrator.state();
    let keys: Vec<&str> = state.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["1", "2", "3"]);
    assert!(state.entries.iter().all(|e| e.status == EntryStatus::Completed));
    assert_eq!(backend.transfer_count(), 3);
    // Unsaved-to-catalog ids still name the files when nothing else does.
    assert_eq!(
        dir_names(&root.path().join("embeddings")),
        vec!["1", "2", "3"]
    );
}

#[tokio::test]
async fn test_filename_precedence_tiers() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api/download/42"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Content-Disposition",
                    r#"attachment; filename="probed-name.safetensors""#,
                )
                .set_body_bytes(MODEL_BYTES.to_vec()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/from-url.pt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MODEL_BYTES.to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/opaque"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MODEL_BYTES.to_vec()))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let base = server.uri();
    let entry = |id: i64, url: String, filename: Option<&str>| {
        let mut entry = CatalogEntry::new(format!("e{id}"), ModelType::Lora, url);
        entry.id = Some(id);
        entry.download_filename = filename.map(ToString::to_string);
        entry
    };
    let entries = vec![
        entry(1, format!("{base}/api/download/42"), Some("chosen.bin")),
        entry(2, format!("{base}/files/from-url.pt"), None),
        entry(3, format!("{base}/api/download/42"), None),
        entry(4, format!("{base}/opaque"), None),
    ];

    let orchestrator =
        DownloadOrchestrator::new(Arc::new(http_registry()), catalog().await, settings(root.path()));
    orchestrator.start(entries);
    orchestrator.wait().await;

    let state = orchestrator.state();
    assert_eq!(state.status, BatchStatus::Completed);
    let names: Vec<Option<&str>> = state
        .entries
        .iter()
        .map(|e| e.filename.as_deref())
        .collect();
    assert_eq!(
        names,
        vec![
            Some("chosen.bin"),
            Some("from-url.pt"),
            Some("probed-name.safetensors"),
            Some("4"),
        ]
    );
}

#[tokio::test]
async fn test_other_type_without_path_fails_with_destination_error() {
    let backend = StaticBackend::new(MODEL_BYTES);
    let mut registry = BackendRegistry::new();
    registry.register(backend.clone());

    let mut entry = CatalogEntry::new("Mystery", ModelType::Other, "test://mystery.bin");
    entry.id = Some(9);

    let orchestrator =
        DownloadOrchestrator::new(Arc::new(registry), catalog().await, DownloadSettings::default());
    orchestrator.start(vec![entry]);
    orchestrator.wait().await;

    let state = orchestrator.state();
    assert_eq!(state.status, BatchStatus::Error);
    assert_eq!(
        state.entry("9").unwrap().error.as_ref().unwrap().kind,
        "DestinationUndefinedError"
    );
    assert_eq!(backend.transfer_count(), 0);
}

#[tokio::test]
async fn test_stop_during_middle_entry_keeps_earlier_results() {
    let root = TempDir::new().unwrap();
    let blocking = BlockingBackend::new();
    let fast = StaticBackend::new(MODEL_BYTES);
    let mut registry = BackendRegistry::new();
    registry.register(blocking.clone());
    registry.register(fast.clone());

    let entries: Vec<CatalogEntry> = [(1, "test://one"), (2, "slow://two"), (3, "test://three")]
        .into_iter()
        .map(|(id, url)| {
            let mut entry = CatalogEntry::new(format!("m{id}"), ModelType::Checkpoint, url);
            entry.id = Some(id);
            entry
        })
        .collect();

    let orchestrator =
        DownloadOrchestrator::new(Arc::new(registry), catalog().await, settings(root.path()));
    orchestrator.start(entries);

    tokio::time::timeout(Duration::from_secs(5), blocking.started.notified())
        .await
        .expect("second transfer should start");
    orchestrator.stop().await;

    let state = orchestrator.state();
    assert_eq!(state.status, BatchStatus::Cancelled);
    let statuses: Vec<EntryStatus> = state.entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            EntryStatus::Completed,
            EntryStatus::Cancelled,
            EntryStatus::Cancelled
        ]
    );
    assert!(state.entries[1].error.is_none());
    assert_eq!(fast.transfer_count(), 1);

    // Only the finished model remains; the interrupted temp file is gone.
    let checkpoint_dir = root.path().join("Stable-diffusion");
    assert_eq!(dir_names(&checkpoint_dir), vec!["1"]);
}

#[tokio::test]
async fn test_repeated_catalog_id_gets_its_own_state_entry() {
    let root = TempDir::new().unwrap();
    let backend = StaticBackend::new(MODEL_BYTES);
    let mut registry = BackendRegistry::new();
    registry.register(backend.clone());

    let mut first = CatalogEntry::new("A", ModelType::Lora, "test://a");
    first.id = Some(1);
    first.download_filename = Some("a.bin".into());
    let mut second = CatalogEntry::new("A again", ModelType::Lora, "");
    second.id = Some(1);

    let orchestrator =
        DownloadOrchestrator::new(Arc::new(registry), catalog().await, settings(root.path()));
    orchestrator.start(vec![first, second]);
    orchestrator.wait().await;

    let state = orchestrator.state();
    assert_eq!(state.status, BatchStatus::Error);
    assert_eq!(state.entries.len(), 2);
    assert_eq!(state.entries[0].key, "1");
    assert_eq!(state.entries[0].status, EntryStatus::Completed);
    assert_eq!(state.entries[1].key, "1#1");
    assert_eq!(state.entries[1].status, EntryStatus::Error);
    assert_eq!(
        state.entries[1].error.as_ref().unwrap().kind,
        "NoBackendError"
    );
    assert_eq!(backend.transfer_count(), 1);
}
