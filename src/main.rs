use docpipe::api::{self, AppState};
use docpipe::config;
use docpipe::embedding::get_embedding_client;
use docpipe::extract::HttpExtractor;
use docpipe::logging;
use docpipe::metrics::IngestMetrics;
use docpipe::pipeline::{FileJournal, Orchestrator};
use docpipe::qdrant::QdrantIndex;
use docpipe::search::HybridSearchService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let qdrant = QdrantIndex::new().expect("Failed to build Qdrant client");
    qdrant
        .ensure_ready(
            &config.qdrant_index_name,
            config.embedding_dimension as u64,
            config.index_bootstrap_attempts,
            Duration::from_secs(config.index_bootstrap_delay_secs),
        )
        .await
        .expect("Vector index unavailable or misconfigured");
    let index = Arc::new(qdrant);

    let extractor = Arc::new(HttpExtractor::new().expect("Failed to build extractor client"));
    let embedder = get_embedding_client();
    let journal = Arc::new(FileJournal::new(config.journal_path.clone()));
    let metrics = Arc::new(IngestMetrics::new());

    let orchestrator = Arc::new(Orchestrator::new(
        extractor,
        embedder.clone(),
        index.clone(),
        journal,
        metrics.clone(),
    ));
    match orchestrator.resume_incomplete().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "Resumed interrupted pipeline runs"),
        Err(error) => tracing::warn!(error = %error, "Journal scan for interrupted runs failed"),
    }
    let search = Arc::new(HybridSearchService::new(
        embedder,
        index,
        config.qdrant_index_name.clone(),
    ));

    let app = api::create_router(Arc::new(AppState {
        orchestrator,
        search,
        metrics,
    }));

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8000-8099",
    ))
}
