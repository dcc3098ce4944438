//! HTTP value types and the upstream fetch capability.
//!
//! The dispatch logic only ever sees [`ProxyRequest`] / [`ProxyResponse`]
//! and talks to the network through [`HttpClient`], so it can be driven by
//! a scripted client in tests. [`ReqwestClient`] is the production
//! implementation.

use async_trait::async_trait;
use axum::body::HttpBody;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use url::Url;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Lazily consumed stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// Request or response payload.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Full(Bytes),
    Stream(BodyStream),
}

impl Body {
    /// Buffer the whole body.
    pub async fn into_bytes(self) -> Result<Bytes, FetchError> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| FetchError::Body(e.to_string()))?;
                    buf.extend_from_slice(&chunk);
                }
                Ok(buf.freeze())
            }
        }
    }

    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Body::Stream(Box::pin(stream.map_err(|e| -> BoxError { e.into() })))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Full(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Body> for axum::body::Body {
    fn from(body: Body) -> Self {
        match body {
            Body::Empty => axum::body::Body::empty(),
            Body::Full(bytes) => axum::body::Body::from(bytes),
            Body::Stream(stream) => axum::body::Body::from_stream(stream),
        }
    }
}

impl From<axum::body::Body> for Body {
    fn from(body: axum::body::Body) -> Self {
        // Keep bodiless requests bodiless so GET/HEAD are not sent chunked.
        if body.size_hint().exact() == Some(0) {
            return Body::Empty;
        }
        Body::from_stream(body.into_data_stream())
    }
}

/// Whether the transport should follow upstream redirects itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectPolicy {
    #[default]
    Follow,
    Manual,
}

/// Outbound request to an upstream registry or auth server.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
    pub redirect: RedirectPolicy,
}

impl ProxyRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::Empty,
            redirect: RedirectPolicy::Follow,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_redirect(mut self, redirect: RedirectPolicy) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Response from an upstream, or one synthesized by the proxy.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl ProxyResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// JSON body with `application/json` content type.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .with_body(Bytes::from(body)))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Add `Access-Control-Allow-Origin: *`.
    pub fn allow_any_origin(mut self) -> Self {
        self.headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        self
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(axum::body::Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = strip_hop_by_hop(self.headers);
        response
    }
}

/// Drop connection-scoped headers before a message crosses the proxy.
pub fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    headers
}

/// Network access used by the proxy. Implementations enforce their own
/// timeouts; a slow upstream surfaces as an `Err`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn fetch(&self, request: ProxyRequest) -> Result<ProxyResponse, FetchError>;
}

/// [`HttpClient`] backed by two pooled reqwest clients, one per redirect policy.
pub struct ReqwestClient {
    following: reqwest::Client,
    manual: reqwest::Client,
}

impl ReqwestClient {
    /// `timeout` bounds the wait for each read from the upstream, including
    /// the response head. A transfer that keeps delivering data is never cut
    /// off, whatever its total length.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let build = |policy: reqwest::redirect::Policy| {
            reqwest::Client::builder()
                .user_agent(concat!("registry-proxy/", env!("CARGO_PKG_VERSION")))
                .redirect(policy)
                .connect_timeout(Duration::from_secs(10))
                .read_timeout(timeout)
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .map_err(|e| FetchError::Client(e.to_string()))
        };

        Ok(Self {
            following: build(reqwest::redirect::Policy::limited(10))?,
            manual: build(reqwest::redirect::Policy::none())?,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn fetch(&self, request: ProxyRequest) -> Result<ProxyResponse, FetchError> {
        let client = match request.redirect {
            RedirectPolicy::Follow => &self.following,
            RedirectPolicy::Manual => &self.manual,
        };

        let mut headers = strip_hop_by_hop(request.headers);
        headers.remove(header::HOST);

        tracing::debug!(method = %request.method, url = %request.url, "Fetching upstream");

        let mut builder = client.request(request.method, request.url).headers(headers);
        builder = match request.body {
            Body::Empty => builder,
            Body::Full(bytes) => builder.body(bytes),
            Body::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        Ok(ProxyResponse {
            status,
            headers,
            body: Body::from_stream(response.bytes_stream()),
        })
    }
}
