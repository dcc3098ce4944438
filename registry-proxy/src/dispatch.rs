//! Per-request control flow.
//!
//! Paths are matched in a fixed order, first match wins:
//!
//! 1. `/` renders the landing page
//! 2. unknown host answers 404 with the route table
//! 3. `/v2/_catalog` on Docker Hub answers 404 `UNSUPPORTED`
//! 4. `/v2/` probes the upstream
//! 5. `/v2/auth` issues a token
//! 6. Docker Hub short names (`/v2/<name>/<kind>/<ref>`) redirect under `library/`
//! 7. everything else is forwarded

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde::Serialize;
use tracing::debug;

use crate::cache::TokenCache;
use crate::config::ProxyConfig;
use crate::docs::StaticDocProvider;
use crate::error::{ProxyResult, RegistryErrorBody};
use crate::forward::{ForwardRequest, ResponseForwarder};
use crate::http::{Body, HttpClient, ProxyResponse};
use crate::outcome::{challenge_realm, Outcome, AUTH_PATH};
use crate::routes::{normalize_host, RouteTable, Router};
use crate::token::{TokenBroker, TokenRequest};

const CATALOG_PATH: &str = "/v2/_catalog";
const PROBE_PATH: &str = "/v2/";

/// Body of the 404 returned for unknown hosts.
#[derive(Debug, Serialize)]
struct RouteListing<'a> {
    routes: &'a RouteTable,
}

/// A request as received from a client.
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    /// Raw `Host` value, port included.
    pub host: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl InboundRequest {
    /// The host comes from the `Host` header, or the URI authority for
    /// HTTP/2 requests that carry none.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Body) -> Self {
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.as_str().to_string()))
            .unwrap_or_default();
        Self {
            method,
            uri,
            host,
            headers,
            body,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.headers.get(header::AUTHORIZATION)
    }
}

/// Routes inbound requests to the landing page, the token broker or the
/// forwarder.
pub struct RequestDispatcher {
    config: Arc<ProxyConfig>,
    router: Router,
    broker: TokenBroker,
    forwarder: ResponseForwarder,
    docs: Arc<dyn StaticDocProvider>,
}

impl RequestDispatcher {
    pub fn new(
        config: Arc<ProxyConfig>,
        client: Arc<dyn HttpClient>,
        cache: Arc<dyn TokenCache>,
        docs: Arc<dyn StaticDocProvider>,
    ) -> Self {
        Self {
            router: Router::from_config(&config),
            broker: TokenBroker::new(client.clone(), cache),
            forwarder: ResponseForwarder::new(client),
            docs,
            config,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn dispatch(&self, request: InboundRequest) -> ProxyResult<Outcome> {
        debug!(method = %request.method, host = %request.host, path = %request.path(), "Dispatching request");

        if request.path() == "/" {
            let html = self.docs.render(&self.config.custom_domain)?;
            let response = ProxyResponse::new(StatusCode::OK)
                .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))
                .with_body(html);
            return Ok(Outcome::Direct(response));
        }

        let hostname = normalize_host(&request.host);
        let Some(upstream) = self.router.resolve_upstream(&hostname) else {
            debug!(host = %hostname, "No route for host");
            let body = RouteListing {
                routes: self.router.table(),
            };
            let response = ProxyResponse::json(StatusCode::NOT_FOUND, &body)?.allow_any_origin();
            return Ok(Outcome::Direct(response));
        };

        if upstream.is_docker_hub() && request.path() == CATALOG_PATH {
            let body = RegistryErrorBody::single(
                "UNSUPPORTED",
                "The catalog API is not supported by Docker Hub",
                Some(
                    "Docker Hub has disabled the /v2/_catalog endpoint due to performance \
                     considerations. Please use specific image names instead."
                        .to_string(),
                ),
            );
            let response = ProxyResponse::json(StatusCode::NOT_FOUND, &body)?.allow_any_origin();
            return Ok(Outcome::Direct(response));
        }

        let realm = challenge_realm(self.config.mode, &request.host, &hostname);
        let authorization = request.authorization().cloned();

        if request.path() == PROBE_PATH {
            return self
                .forwarder
                .probe(&upstream, authorization.as_ref(), realm)
                .await;
        }

        if request.path() == AUTH_PATH {
            let scope = request.query_param("scope");
            return self
                .broker
                .issue(TokenRequest {
                    hostname: &hostname,
                    upstream: &upstream,
                    scope: scope.as_deref(),
                    authorization: authorization.as_ref(),
                })
                .await;
        }

        if upstream.is_docker_hub() {
            if let Some(path) = library_path(request.path()) {
                let location = match request.uri.query() {
                    Some(query) => format!("{path}?{query}"),
                    None => path,
                };
                debug!(location = %location, "Redirecting short image name");
                return Ok(Outcome::Redirect { location });
            }
        }

        let path_and_query = request
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.path().to_string());
        let forward = ForwardRequest {
            method: request.method,
            path_and_query,
            headers: request.headers,
            body: request.body,
        };
        self.forwarder.forward(&upstream, forward, realm).await
    }
}

/// `/v2/<name>/<kind>/<ref>` → `/v2/library/<name>/<kind>/<ref>`. Only paths
/// of exactly five `/`-separated segments (the leading empty one included)
/// qualify.
pub fn library_path(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = path.split('/').collect();
    if segments.len() != 5 {
        return None;
    }
    segments.insert(2, "library");
    Some(segments.join("/"))
}
