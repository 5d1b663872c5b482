//! HTTP transport with a process-wide session cookie jar.

mod response;
mod user_agent;

pub use response::{parse_content_disposition_filename, FetchedPage};
pub use user_agent::{resolve_user_agent, USER_AGENT};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use tracing::debug;

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Errors from the transport.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: &'static str,
        url: String,
        status: StatusCode,
    },
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error("No scripted response for {0}")]
    Unscripted(String),
}

/// HTTP method of a page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A page visit: method, URL and (for POST) url-encoded form fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub method: Method,
    pub url: String,
    pub form: Vec<(String, String)>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            form: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            form,
        }
    }

    /// Value of a form field, if submitted.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Issues page requests against the portal.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchedPage, FetchError>;
}

/// HTTP client holding the authenticated session.
///
/// Cookies live in the client's jar for the whole run; every request the
/// navigator issues goes through this one client.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_delay: Duration,
}

impl HttpClient {
    pub fn new(
        user_agent: Option<&str>,
        timeout: Duration,
        request_delay: Duration,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));

        let client = Client::builder()
            .user_agent(resolve_user_agent(user_agent))
            .default_headers(headers)
            .cookie_store(true)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            request_delay,
        })
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, request: &PageRequest) -> Result<FetchedPage, FetchError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url).form(&request.form),
        };

        let start = Instant::now();
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().to_string();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        let body = response.bytes().await?.to_vec();
        debug!(
            "{} {} -> {} ({} bytes, {:?})",
            request.method.as_str(),
            request.url,
            status,
            body.len(),
            start.elapsed()
        );

        // Apply base delay between requests
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                method: request.method.as_str(),
                url: request.url.clone(),
                status,
            });
        }

        Ok(FetchedPage {
            url,
            status,
            headers,
            body,
        })
    }
}
