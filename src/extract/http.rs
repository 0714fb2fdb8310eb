//! HTTP adapter for the external extraction service.

use crate::config::get_config;
use crate::extract::{DocumentExtractor, ExtractError, FileKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Client for a text-extraction service exposing `page-count`, `extract`,
/// and `thumbnail` endpoints.
pub struct HttpExtractor {
    pub(crate) client: Client,
    pub(crate) base_url: String,
}

#[derive(Serialize)]
struct PageRequest<'a> {
    path: &'a str,
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_index: Option<usize>,
}

#[derive(Deserialize)]
struct PageCountResponse {
    page_count: usize,
}

#[derive(Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    text: Option<String>,
}

impl HttpExtractor {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, ExtractError> {
        let config = get_config();
        let client = Client::builder().user_agent("docpipe/0.1").build()?;
        let base_url = config.extractor_url.trim_end_matches('/').to_string();
        tracing::debug!(url = %base_url, "Initialized extractor HTTP client");
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn page_request<'a>(path: &'a str, page_index: Option<usize>) -> Result<PageRequest<'a>, ExtractError> {
        let kind = FileKind::from_path(path)?;
        Ok(PageRequest {
            path,
            kind: kind.as_str(),
            page_index,
        })
    }

    async fn fail_on_status(response: reqwest::Response) -> Result<reqwest::Response, ExtractError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ExtractError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Extractor request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl DocumentExtractor for HttpExtractor {
    async fn page_count(&self, path: &str) -> Result<usize, ExtractError> {
        let request = Self::page_request(path, None)?;
        let response = self
            .client
            .post(self.endpoint("page-count"))
            .json(&request)
            .send()
            .await?;
        let response = Self::fail_on_status(response).await?;
        let payload: PageCountResponse = response.json().await?;
        Ok(payload.page_count)
    }

    async fn extract_page(
        &self,
        path: &str,
        page_index: usize,
    ) -> Result<Option<String>, ExtractError> {
        let request = Self::page_request(path, Some(page_index))?;
        let response = self
            .client
            .post(self.endpoint("extract"))
            .json(&request)
            .send()
            .await?;
        let response = Self::fail_on_status(response).await?;
        let payload: ExtractResponse = response.json().await?;
        // Whitespace-only extractions count as "no text".
        Ok(payload
            .text
            .filter(|text| !text.trim().is_empty()))
    }

    async fn render_thumbnail(
        &self,
        path: &str,
        page_index: usize,
    ) -> Result<Vec<u8>, ExtractError> {
        let request = Self::page_request(path, Some(page_index))?;
        let response = self
            .client
            .post(self.endpoint("thumbnail"))
            .json(&request)
            .send()
            .await?;
        let response = Self::fail_on_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
