//! Common test utilities and helpers
//!
//! [`ScriptedClient`] stands in for the network: responses are registered
//! per URL (query ignored) and every request is recorded for inspection.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use registry_proxy::cache::MemoryTokenCache;
use registry_proxy::http::{FetchError, RedirectPolicy};
use registry_proxy::{
    Body, EmbeddedDocs, HttpClient, InboundRequest, Mode, ProxyConfig, ProxyRequest,
    ProxyResponse, RequestDispatcher,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const DOCKER_HOST: &str = "docker.example.com";
pub const GHCR_HOST: &str = "ghcr.example.com";
pub const DOCKER_PROBE: &str = "https://registry-1.docker.io/v2/";
pub const DOCKER_TOKEN_REALM: &str = "https://auth.docker.io/token";
pub const DOCKER_CHALLENGE: &str =
    r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io""#;

/// A canned upstream response.
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, &'static str)>,
    pub body: &'static str,
}

impl Canned {
    pub fn new(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    pub fn ok(body: &'static str) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    fn to_response(&self) -> ProxyResponse {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), HeaderValue::from_static(value));
        }
        ProxyResponse {
            status: self.status,
            headers,
            body: Body::from(self.body),
        }
    }
}

/// What the proxy sent upstream.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub url: String,
    pub authorization: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub redirect: RedirectPolicy,
}

#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<HashMap<String, Canned>>,
    calls: Mutex<Vec<Recorded>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every request to `url` (query ignored) with `response`.
    pub fn respond(&self, url: &str, response: Canned) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    /// Requests whose URL, query ignored, equals `url`.
    pub fn calls_to(&self, url: &str) -> Vec<Recorded> {
        self.calls()
            .into_iter()
            .filter(|c| c.url.split('?').next() == Some(url))
            .collect()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn fetch(&self, request: ProxyRequest) -> Result<ProxyResponse, FetchError> {
        let mut key = request.url.clone();
        key.set_query(None);

        let authorization = request.header(&header::AUTHORIZATION).map(str::to_string);
        let body = request.body.into_bytes().await?;
        self.calls.lock().unwrap().push(Recorded {
            method: request.method,
            url: request.url.to_string(),
            authorization,
            headers: request.headers,
            body,
            redirect: request.redirect,
        });

        let canned = self.responses.lock().unwrap().get(key.as_str()).cloned();
        match canned {
            Some(canned) => Ok(canned.to_response()),
            None => Err(FetchError::Transport(format!("connection refused: {key}"))),
        }
    }
}

pub fn production_config() -> ProxyConfig {
    ProxyConfig {
        custom_domain: "example.com".to_string(),
        ..ProxyConfig::default()
    }
}

pub fn debug_config(target: &str) -> ProxyConfig {
    ProxyConfig {
        mode: Mode::Debug,
        target_upstream: Some(target.to_string()),
        ..production_config()
    }
}

pub fn dispatcher_with(config: ProxyConfig, client: Arc<ScriptedClient>) -> RequestDispatcher {
    RequestDispatcher::new(
        Arc::new(config),
        client,
        Arc::new(MemoryTokenCache::new()),
        Arc::new(EmbeddedDocs),
    )
}

/// Docker Hub probe answering with the usual bearer challenge.
pub fn script_docker_challenge(client: &ScriptedClient) {
    client.respond(
        DOCKER_PROBE,
        Canned::new(StatusCode::UNAUTHORIZED, r#"{"errors":[]}"#)
            .header(header::WWW_AUTHENTICATE, DOCKER_CHALLENGE),
    );
}

pub fn inbound(method: Method, host: &str, path: &str, authorization: Option<&str>) -> InboundRequest {
    let mut headers = HeaderMap::new();
    headers.insert(header::HOST, HeaderValue::from_str(host).unwrap());
    if let Some(auth) = authorization {
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
    }
    InboundRequest::new(method, path.parse().unwrap(), headers, Body::Empty)
}

/// Dispatch and render a GET, panicking on proxy errors.
pub async fn get(
    dispatcher: &RequestDispatcher,
    host: &str,
    path: &str,
    authorization: Option<&str>,
) -> ProxyResponse {
    dispatcher
        .dispatch(inbound(Method::GET, host, path, authorization))
        .await
        .and_then(|outcome| outcome.render())
        .expect("request should not fail")
}

pub async fn body_text(response: ProxyResponse) -> String {
    let bytes = response.body.into_bytes().await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: ProxyResponse) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
