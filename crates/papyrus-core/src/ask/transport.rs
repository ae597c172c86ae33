//! Transport seam between the consumer and the backend.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use papyrus_types::{QuerySettings, Source};
use serde::{Deserialize, Serialize};

use super::error::{AskError, AskErrorKind, AskResult, classify_reqwest_error};

const STREAM_PATH: &str = "/query/stream";
const QUERY_PATH: &str = "/query";
const USER_AGENT: &str = concat!("papyrus/", env!("CARGO_PKG_VERSION"));

/// Raw body chunks of an open answer stream.
pub type ChunkStream = BoxStream<'static, AskResult<Bytes>>;

/// Body of both query endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(flatten)]
    pub settings: QuerySettings,
    /// Sent as `false` on the streaming endpoint; omitted on the fallback,
    /// where the backend defaults it to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_sources: Option<bool>,
}

impl QueryRequest {
    pub fn streaming(query: impl Into<String>, settings: &QuerySettings) -> Self {
        Self {
            query: query.into(),
            settings: settings.clone(),
            include_sources: Some(false),
        }
    }

    pub fn fallback(query: impl Into<String>, settings: &QuerySettings) -> Self {
        Self {
            query: query.into(),
            settings: settings.clone(),
            include_sources: None,
        }
    }
}

/// Body of a successful non-streaming answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub retrieval_time: f64,
    #[serde(default)]
    pub generation_time: f64,
}

/// The two exchanges the consumer needs from a backend.
pub trait QueryTransport: Send + Sync {
    /// Opens the streaming exchange.
    ///
    /// Any failure here is reported as [`AskErrorKind::TransportOpen`] so the
    /// consumer can fall back.
    fn open_stream(
        &self,
        request: &QueryRequest,
    ) -> impl Future<Output = AskResult<ChunkStream>> + Send;

    /// Issues the single non-streaming request.
    fn query(&self, request: &QueryRequest)
    -> impl Future<Output = AskResult<QueryResponse>> + Send;
}

/// HTTP backend client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// `base_url` already includes the API prefix, e.g.
    /// `http://localhost:8000/api/v1`. A zero timeout means none.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> AskResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| AskError::new(AskErrorKind::Transport, format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl QueryTransport for HttpTransport {
    async fn open_stream(&self, request: &QueryRequest) -> AskResult<ChunkStream> {
        let url = self.url(STREAM_PATH);
        tracing::debug!(%url, "opening answer stream");

        let response = self
            .http
            .post(&url)
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(AskErrorKind::TransportOpen, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let mut err = AskError::from_status(status.as_u16(), &body);
            err.kind = AskErrorKind::TransportOpen;
            return Err(err);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| classify_reqwest_error(AskErrorKind::Transport, &e)));
        Ok(stream.boxed())
    }

    async fn query(&self, request: &QueryRequest) -> AskResult<QueryResponse> {
        let url = self.url(QUERY_PATH);
        tracing::debug!(%url, "sending fallback query");

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(AskErrorKind::Transport, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(AskErrorKind::Transport, &e))?;
        if !status.is_success() {
            return Err(AskError::from_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| AskError {
            kind: AskErrorKind::Parse,
            message: format!("Invalid query response: {e}"),
            details: Some(body),
        })
    }
}
