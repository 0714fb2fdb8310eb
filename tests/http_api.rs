use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use docpipe::api::{self, AppState};
use docpipe::config;
use docpipe::embedding::get_embedding_client;
use docpipe::extract::HttpExtractor;
use docpipe::metrics::IngestMetrics;
use docpipe::pipeline::{FileJournal, Orchestrator};
use docpipe::qdrant::QdrantIndex;
use docpipe::search::HybridSearchService;
use httpmock::{
    Method::{GET, POST, PUT},
    Mock, MockServer,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

static INIT: OnceCell<()> = OnceCell::const_new();
static QDRANT_SERVER: OnceCell<&'static MockServer> = OnceCell::const_new();
static EXTRACTOR_SERVER: OnceCell<&'static MockServer> = OnceCell::const_new();
static UPSERT_MOCK: OnceCell<Mock<'static>> = OnceCell::const_new();

fn set_env(key: &str, value: &str) {
    // SAFETY: Tests run in a single process and establish deterministic configuration upfront.
    unsafe { std::env::set_var(key, value) }
}

async fn init_harness() {
    INIT.get_or_init(|| async {
        let qdrant: &'static MockServer = Box::leak(Box::new(MockServer::start_async().await));
        let extractor: &'static MockServer = Box::leak(Box::new(MockServer::start_async().await));
        let storage = std::env::temp_dir().join(format!("docpipe-e2e-{}", std::process::id()));

        set_env("QDRANT_URL", &qdrant.base_url());
        set_env("QDRANT_INDEX_NAME", "docs");
        set_env("EXTRACTOR_URL", &extractor.base_url());
        set_env("EMBEDDING_PROVIDER", "local");
        set_env("EMBEDDING_MODEL", "local-hash");
        set_env("EMBEDDING_DIMENSION", "16");
        set_env("STORAGE_PATH", &storage.to_string_lossy());
        set_env("JOURNAL_PATH", &storage.join("journal").to_string_lossy());
        set_env("CHUNK_TARGET_SIZE", "200");
        set_env("CHUNK_OVERLAP", "50");
        set_env("RETRY_INITIAL_BACKOFF_SECS", "0");
        set_env("RETRY_MAX_BACKOFF_SECS", "0");
        set_env("ACTIVITY_TIMEOUT_SECS", "5");
        set_env("INDEX_BOOTSTRAP_ATTEMPTS", "1");
        set_env("INDEX_BOOTSTRAP_DELAY_SECS", "0");

        // The collection already exists with a matching dimension, so the
        // bootstrap check passes without a create call.
        qdrant
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "config": { "params": { "vectors": { "size": 16 } } }
                    }
                }));
            })
            .await;
        let upsert = qdrant
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs/points");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": { "operation_id": 1, "status": "completed" }
                }));
            })
            .await;
        qdrant
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/query");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "11111111-1111-1111-1111-111111111111",
                                "score": 0.95,
                                "payload": {
                                    "text": "Refund policy overview for enterprise plans.",
                                    "doc_id": "doc-1",
                                    "chunk_id": 0,
                                    "char_length": 44,
                                    "file_type": "pdf"
                                }
                            },
                            {
                                "id": "22222222-2222-2222-2222-222222222222",
                                "score": 0.40,
                                "payload": {
                                    "text": "Unrelated text below the threshold.",
                                    "doc_id": "doc-1",
                                    "chunk_id": 1,
                                    "char_length": 35,
                                    "file_type": "pdf"
                                }
                            }
                        ]
                    }
                }));
            })
            .await;

        extractor
            .mock_async(|when, then| {
                when.method(POST).path("/page-count");
                then.status(200).json_body(json!({ "page_count": 1 }));
            })
            .await;
        extractor
            .mock_async(|when, then| {
                when.method(POST).path("/extract");
                then.status(200)
                    .json_body(json!({ "text": "Extracted page text for the pipeline." }));
            })
            .await;
        extractor
            .mock_async(|when, then| {
                when.method(POST).path("/thumbnail");
                then.status(200).body("PNGBYTES");
            })
            .await;

        QDRANT_SERVER.set(qdrant).ok();
        EXTRACTOR_SERVER.set(extractor).ok();
        UPSERT_MOCK.set(upsert).ok();

        config::init_config();
    })
    .await;
}

async fn build_app() -> Router {
    init_harness().await;
    let settings = config::get_config();

    let qdrant = QdrantIndex::new().expect("qdrant client");
    qdrant
        .ensure_ready(
            &settings.qdrant_index_name,
            settings.embedding_dimension as u64,
            settings.index_bootstrap_attempts,
            Duration::from_secs(settings.index_bootstrap_delay_secs),
        )
        .await
        .expect("index ready");
    let index = Arc::new(qdrant);

    let extractor = Arc::new(HttpExtractor::new().expect("extractor client"));
    let embedder = get_embedding_client();
    let journal = Arc::new(FileJournal::new(settings.journal_path.clone()));
    let metrics = Arc::new(IngestMetrics::new());

    let orchestrator = Arc::new(Orchestrator::new(
        extractor,
        embedder.clone(),
        index.clone(),
        journal,
        metrics.clone(),
    ));
    let search = Arc::new(HybridSearchService::new(
        embedder,
        index,
        settings.qdrant_index_name.clone(),
    ));

    api::create_router(Arc::new(AppState {
        orchestrator,
        search,
        metrics,
    }))
}

async fn json_response(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    use tower::ServiceExt;
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    // Error responses carry plain-text bodies.
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn document_run_completes_against_external_services() {
    let app = build_app().await;

    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("report.pdf");
    tokio::fs::write(&source, b"%PDF-1.7").await.expect("source");

    let (status, body) = json_response(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/documents")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "file_path": source.to_string_lossy() }).to_string(),
            ))
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["run_id"].as_str().expect("run id").to_string();

    let upsert_hits_before = UPSERT_MOCK.get().expect("upsert mock").hits_async().await;
    let mut completed = false;
    for _ in 0..400 {
        let (status, body) = json_response(
            &app,
            Request::builder()
                .uri(format!("/documents/{run_id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        match body["status"].as_str().expect("status") {
            "running" => tokio::time::sleep(Duration::from_millis(5)).await,
            "success" => {
                assert_eq!(body["summary"]["page_count"], 1);
                assert_eq!(body["summary"]["chunk_count"], 1);
                assert_eq!(
                    body["summary"]["thumbnail_paths"]
                        .as_array()
                        .expect("thumbnails")
                        .len(),
                    1
                );
                completed = true;
                break;
            }
            other => panic!("run failed with status {other}: {body}"),
        }
    }
    assert!(completed, "run did not complete in time");

    let upsert_hits_after = UPSERT_MOCK.get().expect("upsert mock").hits_async().await;
    assert!(upsert_hits_after > upsert_hits_before);
}

#[tokio::test]
async fn search_applies_threshold_and_keyword_filters() {
    let app = build_app().await;

    let (status, body) = json_response(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/search")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "query": "refund policy",
                    "required_keywords": ["refund", "ENTERPRISE"]
                })
                .to_string(),
            ))
            .expect("request"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().expect("results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["doc_id"], "doc-1");
    assert_eq!(results[0]["chunk_index"], 0);
    assert_eq!(results[0]["metadata"]["file_type"], "pdf");
    assert!(results[0]["metadata"].get("text").is_none());
}

#[tokio::test]
async fn cancel_endpoint_rejects_unknown_runs() {
    let app = build_app().await;
    let (status, _) = json_response(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/documents/does-not-exist/cancel")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
