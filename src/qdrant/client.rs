//! HTTP client wrapper for interacting with Qdrant.

use crate::config::get_config;
use crate::qdrant::VectorIndex;
use crate::qdrant::payload::{build_payload, point_id};
use crate::qdrant::types::{
    CollectionInfoResponse, IndexRecord, QdrantError, QueryResponse, QueryResponseResult,
    ScoredMatch,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;

/// Upsert sub-batch ceiling per request.
const UPSERT_BATCH: usize = 100;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantIndex {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantIndex {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, QdrantError> {
        let config = get_config();
        let client = Client::builder().user_agent("docpipe/0.1").build()?;

        let base_url = normalize_base_url(&config.qdrant_url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %config
                .qdrant_api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.qdrant_api_key.clone(),
        })
    }

    /// Bounded startup bootstrap: retry `ensure_index` with a fixed delay.
    ///
    /// A dimension mismatch aborts immediately since retrying cannot fix a
    /// misconfigured index; transient connection failures are retried until
    /// the attempt budget is exhausted.
    pub async fn ensure_ready(
        &self,
        name: &str,
        dimension: u64,
        attempts: u32,
        delay: Duration,
    ) -> Result<(), QdrantError> {
        let mut last_error = String::new();
        for attempt in 1..=attempts.max(1) {
            match self.ensure_index(name, dimension, "Cosine").await {
                Ok(()) => {
                    tracing::info!(index = name, dimension, "Vector index ready");
                    return Ok(());
                }
                Err(error @ QdrantError::DimensionMismatch { .. }) => return Err(error),
                Err(error) => {
                    tracing::warn!(
                        index = name,
                        attempt,
                        attempts,
                        error = %error,
                        "Index bootstrap attempt failed"
                    );
                    last_error = error.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(QdrantError::BootstrapExhausted {
            attempts,
            last_error,
        })
    }

    async fn collection_dimension(&self, name: &str) -> Result<Option<u64>, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{name}"))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let payload: CollectionInfoResponse = response.json().await?;
                Ok(Some(payload.result.config.params.vectors.size))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(index = name, error = %error, "Index existence check failed");
                Err(error)
            }
        }
    }

    async fn create_index(
        &self,
        name: &str,
        dimension: u64,
        metric: &str,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": dimension,
                "distance": metric,
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{name}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(index = name, dimension, metric, "Index created");
        })
        .await
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, QdrantError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_index(
        &self,
        name: &str,
        dimension: u64,
        metric: &str,
    ) -> Result<(), QdrantError> {
        match self.collection_dimension(name).await? {
            Some(existing) if existing == dimension => Ok(()),
            Some(existing) => Err(QdrantError::DimensionMismatch {
                index: existing,
                configured: dimension,
            }),
            None => self.create_index(name, dimension, metric).await,
        }
    }

    async fn upsert(&self, name: &str, records: Vec<IndexRecord>) -> Result<usize, QdrantError> {
        if records.is_empty() {
            return Ok(0);
        }

        let total = records.len();
        let batches = total.div_ceil(UPSERT_BATCH);
        for (batch_number, batch) in records.chunks(UPSERT_BATCH).enumerate() {
            let points: Vec<Value> = batch
                .iter()
                .map(|record| {
                    json!({
                        "id": point_id(&record.doc_id, record.chunk_index),
                        "vector": record.vector,
                        "payload": build_payload(record),
                    })
                })
                .collect();

            let response = self
                .request(Method::PUT, &format!("collections/{name}/points"))?
                .query(&[("wait", true)])
                .json(&json!({ "points": points }))
                .send()
                .await?;

            self.ensure_success(response, || {
                tracing::debug!(
                    index = name,
                    batch = batch_number + 1,
                    batches,
                    points = batch.len(),
                    "Points upserted"
                );
            })
            .await?;
        }

        Ok(total)
    }

    async fn query(
        &self,
        name: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, QdrantError> {
        let body = json!({
            "query": vector,
            "limit": top_k,
            "with_payload": true,
        });

        let response = self
            .request(Method::POST, &format!("collections/{name}/points/query"))?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(index = name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| ScoredMatch {
                score: point.score,
                payload: point.payload,
            })
            .collect())
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
