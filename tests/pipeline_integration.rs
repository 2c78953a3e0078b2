//! End-to-end tests for the ingestion pipeline: export files on disk, assets
//! on a mock server, records in an in-memory store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tts_archiver_core::download::layout;
use tts_archiver_core::{
    AssetCategory, AssetStore, Database, Downloader, HttpClient, ModuleFile, NewFile, Pipeline,
    PipelineOptions, SqliteStore,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;

const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

async fn mock_assets() -> MockServer {
    let server = MockServer::start().await;
    for (route, body) in [
        ("/table", PNG_HEADER.to_vec()),
        ("/mesh", b"v 0 0 0\nf 1 1 1\n".to_vec()),
        ("/diffuse", PNG_HEADER.to_vec()),
        ("/rules", b"%PDF-1.7\n".to_vec()),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

fn write_export(dir: &Path, file_name: &str, document: &serde_json::Value) {
    std::fs::write(dir.join(file_name), document.to_string()).expect("failed to write export");
}

fn module_document(base: &str) -> serde_json::Value {
    json!({
        "SaveName": "Demo Module",
        "Date": "1/2/2024 03:04:05 PM",
        "VersionNumber": "",
        "TableURL": format!("{base}/table"),
        "ObjectStates": [{
            "CustomMesh": {
                "MeshURL": format!("{base}/mesh"),
                "DiffuseURL": format!("{base}/diffuse"),
                "ColliderURL": ""
            },
            "ContainedObjects": [{
                "CustomPDF": {"PDFUrl": format!("{base}/rules")}
            }]
        }]
    })
}

async fn setup(output: &Path) -> (Pipeline, Arc<SqliteStore>) {
    let db = Database::new_in_memory().await.expect("failed to open database");
    let store = Arc::new(SqliteStore::new(db));
    let downloader = Downloader::new(HttpClient::new(), output, 3).expect("valid concurrency");
    let pipeline = Pipeline::new(store.clone(), downloader, PipelineOptions::default())
        .expect("valid options");
    (pipeline, store)
}

#[tokio::test]
async fn test_pipeline_archives_module_assets() {
    let server = mock_assets().await;
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_export(input.path(), "12345.json", &module_document(&server.uri()));

    let (pipeline, store) = setup(output.path()).await;
    let summary = pipeline
        .run(input.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.modules_scanned, 1);
    assert_eq!(summary.modules_ingested, 1);
    assert_eq!(summary.assets_discovered, 4);
    assert_eq!(summary.assets_downloaded, 4);
    assert_eq!(summary.assets_failed, 0);

    let module = store.get_module(12345).await.unwrap().unwrap();
    assert_eq!(module.name, "Demo Module");
    assert_eq!(module.version_number, "0");
    assert_eq!(module.epoch_time, 1_704_207_845);

    let rows = store.list_files_by_module(12345).await.unwrap();
    assert_eq!(rows.len(), 4);
    let table = rows
        .iter()
        .find(|row| row.url.ends_with("/table"))
        .expect("table image persisted");
    assert_eq!(table.category, AssetCategory::Image);
    assert_eq!(table.extension, ".png");

    let mut folders: Vec<String> = std::fs::read_dir(output.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    folders.sort();
    assert_eq!(folders, ["Images", "Models", "PDF"]);
}

#[tokio::test]
async fn test_pipeline_second_run_fetches_nothing() {
    let server = mock_assets().await;
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_export(input.path(), "12345.json", &module_document(&server.uri()));

    let (pipeline, store) = setup(output.path()).await;
    pipeline
        .run(input.path(), &CancellationToken::new())
        .await
        .unwrap();
    let first_run_requests = server.received_requests().await.unwrap().len();

    let summary = pipeline
        .run(input.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.assets_downloaded, 0);
    assert_eq!(summary.assets_skipped, 4);
    assert_eq!(
        server.received_requests().await.unwrap().len(),
        first_run_requests
    );
    assert_eq!(store.list_files_by_module(12345).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_pipeline_resets_rows_when_orphans_found() {
    let server = mock_assets().await;
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_export(input.path(), "12345.json", &module_document(&server.uri()));

    let (pipeline, store) = setup(output.path()).await;
    store
        .batch_create_files(&[NewFile {
            module_id: 12345,
            category: AssetCategory::Image,
            url: "http://example.com/removed-from-module".to_string(),
            extension: ".jpg".to_string(),
        }])
        .await
        .unwrap();

    let summary = pipeline
        .run(input.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.modules_with_orphans, 1);
    let rows = store.list_files_by_module(12345).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|row| row.url.starts_with(&server.uri())));
}

#[tokio::test]
async fn test_pipeline_failed_download_is_not_persisted() {
    let server = mock_assets().await;
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let base = server.uri();
    write_export(
        input.path(),
        "77.json",
        &json!({
            "SaveName": "Partial",
            "Date": "01/02/2024 15:04:05",
            "ObjectStates": [{
                "CustomImage": {
                    "ImageURL": format!("{base}/diffuse"),
                    "ImageSecondaryURL": format!("{base}/gone")
                }
            }]
        }),
    );

    let (pipeline, store) = setup(output.path()).await;
    let summary = pipeline
        .run(input.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.assets_downloaded, 1);
    assert_eq!(summary.assets_failed, 1);
    assert_eq!(summary.modules_ingested, 1);
    let rows = store.list_files_by_module(77).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].url.ends_with("/diffuse"));
}

#[tokio::test]
async fn test_pipeline_counts_bad_exports_and_ignores_other_files() {
    let server = mock_assets().await;
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_export(input.path(), "1.json", &module_document(&server.uri()));
    std::fs::write(input.path().join("2.json"), "{ not json").unwrap();
    write_export(
        input.path(),
        "3.json",
        &json!({"SaveName": "Undated", "Date": "yesterday"}),
    );
    std::fs::write(input.path().join("notes.json"), "{}").unwrap();
    std::fs::write(input.path().join("4.json.bak"), "{}").unwrap();

    let (pipeline, store) = setup(output.path()).await;
    let summary = pipeline
        .run(input.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.modules_scanned, 1);
    assert_eq!(summary.modules_ingested, 1);
    assert_eq!(summary.modules_failed, 2);
    let modules = store.list_modules().await.unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].id, 1);
}

#[tokio::test]
async fn test_pipeline_deduplicates_across_objects() {
    let server = mock_assets().await;
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let base = server.uri();
    write_export(
        input.path(),
        "5.json",
        &json!({
            "SaveName": "Dupes",
            "Date": "01/02/2024 15:04:05",
            "ObjectStates": [
                {"CustomImage": {"ImageURL": format!("{base}/diffuse")}},
                {"States": {"1": {"CustomImage": {"ImageURL": format!("{base}/diffuse")}}}}
            ]
        }),
    );

    let (pipeline, _store) = setup(output.path()).await;
    let summary = pipeline
        .run(input.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.assets_discovered, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pipeline_cancel_mid_module_keeps_finished_rows_without_watermark() {
    let server = mock_assets().await;
    let stalled = support::stalled_body_server(100_000, 20_000).await;
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let fast_url = format!("{}/mesh", server.uri());
    let slow_url = format!("{stalled}/collider");
    write_export(
        input.path(),
        "42.json",
        &json!({
            "SaveName": "Interrupted",
            "Date": "01/02/2024 15:04:05",
            "ObjectStates": [{
                "CustomMesh": {"MeshURL": fast_url.as_str(), "ColliderURL": slow_url.as_str()}
            }]
        }),
    );
    let fast_path = layout::local_path(
        output.path(),
        &ModuleFile::new(AssetCategory::Model, &fast_url).unwrap(),
    );
    let slow_path = layout::local_path(
        output.path(),
        &ModuleFile::new(AssetCategory::Model, &slow_url).unwrap(),
    );

    let (pipeline, store) = setup(output.path()).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watched = fast_path.clone();
    tokio::spawn(async move {
        for _ in 0..400 {
            if watched.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        trigger.cancel();
    });

    let summary = pipeline.run(input.path(), &cancel).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.modules_scanned, 1);
    assert_eq!(summary.modules_ingested, 0);
    assert_eq!(summary.assets_downloaded, 1);
    let rows = store.list_files_by_module(42).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].url, fast_url);
    assert_eq!(store.get_module(42).await.unwrap(), None);
    assert!(fast_path.exists());
    assert!(!slow_path.exists());
    let models: Vec<_> = std::fs::read_dir(output.path().join("Models"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(models, [fast_path]);
}
