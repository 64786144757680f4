// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{
    ACCEPT, CONTENT_LENGTH, ETAG, HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
    RANGE, USER_AGENT,
};

use crate::error::FetchError;

/// `Accept` header sent with feed requests
pub const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

/// Maximum number of redirects followed for one request
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
}

/// A single outgoing request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    /// Wall-clock limit covering DNS, TLS, redirects and body transfer
    pub timeout: Duration,
    pub user_agent: String,
    pub accept: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    /// Inclusive byte range (`Range: bytes=start-end`)
    pub range: Option<(u64, u64)>,
    /// Abort the transfer once the body grows beyond this many bytes
    pub max_body_bytes: Option<u64>,
}

impl FetchRequest {
    pub fn get(url: &str, timeout: Duration, user_agent: &str) -> Self {
        Self {
            url: url.to_string(),
            method: Method::Get,
            timeout,
            user_agent: user_agent.to_string(),
            accept: None,
            if_none_match: None,
            if_modified_since: None,
            range: None,
            max_body_bytes: None,
        }
    }

    pub fn head(url: &str, timeout: Duration, user_agent: &str) -> Self {
        Self {
            method: Method::Head,
            ..Self::get(url, timeout, user_agent)
        }
    }

    pub fn with_accept(mut self, accept: &str) -> Self {
        self.accept = Some(accept.to_string());
        self
    }

    pub fn with_validators(
        mut self,
        if_none_match: Option<String>,
        if_modified_since: Option<String>,
    ) -> Self {
        self.if_none_match = if_none_match.filter(|v| !v.is_empty());
        self.if_modified_since = if_modified_since.filter(|v| !v.is_empty());
        self
    }

    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.range = Some((start, end));
        self
    }

    pub fn with_max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }
}

/// Outcome of a request that reached an HTTP server
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    /// URL after following redirects
    pub effective_url: String,
    /// Absent for `304 Not Modified` and `HEAD` responses
    pub body: Option<Bytes>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// `Content-Length` of the final response in a redirect chain
    pub content_length: Option<u64>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    pub fn is_partial_content(&self) -> bool {
        self.status == 206
    }
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform one request. Never retries; transport failures surface as
    /// `FetchError` and HTTP error statuses as a normal response.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Conditionally fetch a feed document.
///
/// On `304` the response carries no body and the caller keeps its cached copy.
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    timeout: Duration,
    user_agent: &str,
    if_none_match: Option<String>,
    if_modified_since: Option<String>,
) -> Result<FetchResponse, FetchError> {
    let request = FetchRequest::get(url, timeout, user_agent)
        .with_accept(FEED_ACCEPT)
        .with_validators(if_none_match, if_modified_since);
    client.fetch(&request).await
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient that follows redirects
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn execute(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = reqwest::Url::parse(&request.url).map_err(|e| FetchError::InvalidUrl {
            url: request.url.clone(),
            source: e,
        })?;

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Head => self.client.head(url),
        }
        .timeout(request.timeout)
        .header(USER_AGENT, request.user_agent.as_str());

        if let Some(accept) = &request.accept {
            builder = builder.header(ACCEPT, accept.as_str());
        }
        if let Some(etag) = &request.if_none_match {
            builder = builder.header(IF_NONE_MATCH, etag.as_str());
        }
        if let Some(since) = &request.if_modified_since {
            builder = builder.header(IF_MODIFIED_SINCE, since.as_str());
        }
        if let Some((start, end)) = request.range {
            builder = builder.header(RANGE, format!("bytes={start}-{end}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(request, e))?;

        let status = response.status().as_u16();
        let effective_url = response.url().to_string();
        let headers = response.headers();
        let etag = header_string(headers, ETAG);
        let last_modified = header_string(headers, LAST_MODIFIED);
        let content_length =
            header_string(headers, CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok());

        let body = if status == 304 || request.method == Method::Head {
            None
        } else {
            Some(read_body(request, response).await?)
        };

        Ok(FetchResponse {
            status,
            effective_url,
            body,
            etag,
            last_modified,
            content_length,
        })
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        // Outer deadline so a stalled body stream cannot outlive the budget.
        match tokio::time::timeout(request.timeout, self.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: request.url.clone(),
                seconds: request.timeout.as_secs(),
            }),
        }
    }
}

async fn read_body(
    request: &FetchRequest,
    response: reqwest::Response,
) -> Result<Bytes, FetchError> {
    let mut stream = response.bytes_stream();
    let mut body = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| transport_error(request, e))?;
        body.extend_from_slice(&chunk);

        if let Some(limit) = request.max_body_bytes
            && body.len() as u64 > limit
        {
            return Err(FetchError::BodyTooLarge {
                url: request.url.clone(),
                limit,
            });
        }
    }

    Ok(body.freeze())
}

fn transport_error(request: &FetchRequest, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: request.url.clone(),
            seconds: request.timeout.as_secs(),
        }
    } else {
        FetchError::Transport {
            url: request.url.clone(),
            source: error,
        }
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reqwest_client_can_be_created() {
        let _client = ReqwestClient::new();
        let _client_default = ReqwestClient::default();
    }

    #[test]
    fn reqwest_client_can_be_cloned() {
        let client = ReqwestClient::new();
        let _cloned = client.clone();
    }

    #[test]
    fn empty_validators_are_dropped() {
        let request = FetchRequest::get("https://example.com/feed", Duration::from_secs(5), "ua")
            .with_validators(Some(String::new()), Some("Mon, 01 Jan 2024 00:00:00 GMT".into()));

        assert!(request.if_none_match.is_none());
        assert_eq!(
            request.if_modified_since.as_deref(),
            Some("Mon, 01 Jan 2024 00:00:00 GMT")
        );
    }

    #[test]
    fn head_request_keeps_settings() {
        let request = FetchRequest::head("https://example.com/a.mp4", Duration::from_secs(7), "ua");
        assert_eq!(request.method, Method::Head);
        assert_eq!(request.timeout, Duration::from_secs(7));
        assert_eq!(request.user_agent, "ua");
    }

    #[test]
    fn response_status_helpers() {
        let response = FetchResponse {
            status: 206,
            ..Default::default()
        };
        assert!(response.is_success());
        assert!(response.is_partial_content());
        assert!(!response.is_not_modified());
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let client = ReqwestClient::new();
        let request = FetchRequest::get("not a url", Duration::from_secs(1), "ua");
        let result = client.fetch(&request).await;
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
    }
}
