//! # Capability Adapters
//!
//! Blocking HTTP clients for the embedding, reranking and extraction
//! services. Each implements the matching weft-core capability trait.
//!
//! Unreachable services and 5xx answers map to `ProviderUnavailable`,
//! expired requests to `ProviderTimeout`.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use weft_core::{Embedder, ExtractedGraph, Extractor, RerankScore, Reranker, WeftError};

/// Shared client for one service base URL.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: String,
}

impl ServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WeftError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeftError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, path: &str) -> RequestBuilder {
        self.http.post(format!("{}{}", self.base_url, path))
    }

    /// POST a JSON body and decode the JSON answer.
    fn call<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, WeftError> {
        let resp = self.send(self.request(path).json(body))?;
        Self::handle_response(resp)
    }

    fn send(&self, req: RequestBuilder) -> Result<Response, WeftError> {
        req.send().map_err(|e| {
            if e.is_timeout() {
                WeftError::ProviderTimeout(format!("{}: {e}", self.base_url))
            } else {
                WeftError::ProviderUnavailable(format!("{}: {e}", self.base_url))
            }
        })
    }

    fn handle_response<T: DeserializeOwned>(resp: Response) -> Result<T, WeftError> {
        let status = resp.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let body = resp.text().unwrap_or_default();
            return Err(WeftError::ProviderUnavailable(format!("status {status}: {body}")));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(WeftError::Parse(format!("status {status}: {body}")));
        }
        resp.json::<T>().map_err(|e| {
            if e.is_timeout() {
                WeftError::ProviderTimeout(e.to_string())
            } else {
                WeftError::Deserialization(e.to_string())
            }
        })
    }
}

// =============================================================================
// EMBEDDING
// =============================================================================

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(alias = "embedding")]
    vector: Vec<f32>,
}

/// `POST {url}/embed {text}` -> `{vector}`.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: ServiceClient,
}

impl HttpEmbedder {
    #[must_use]
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, WeftError> {
        let resp: EmbedResponse = self.client.call("/embed", &TextRequest { text })?;
        Ok(resp.vector)
    }
}

// =============================================================================
// RERANKING
// =============================================================================

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RerankResponse {
    Scores(Vec<RerankScore>),
    Wrapped { results: Vec<RerankScore> },
}

/// `POST {url}/rerank {query, documents}` -> `[{index, score}]`.
#[derive(Debug, Clone)]
pub struct HttpReranker {
    client: ServiceClient,
}

impl HttpReranker {
    #[must_use]
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

impl Reranker for HttpReranker {
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankScore>, WeftError> {
        let resp: RerankResponse = self
            .client
            .call("/rerank", &RerankRequest { query, documents })?;
        Ok(match resp {
            RerankResponse::Scores(scores) | RerankResponse::Wrapped { results: scores } => scores,
        })
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// `POST {url}/extract {text}` -> `{entities, relationships}`.
#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: ServiceClient,
}

impl HttpExtractor {
    #[must_use]
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

impl Extractor for HttpExtractor {
    fn extract(&self, text: &str) -> Result<ExtractedGraph, WeftError> {
        self.client.call("/extract", &TextRequest { text })
    }
}
