//! Relaying registry API calls to the upstream.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::error::ProxyResult;
use crate::http::{Body, HttpClient, ProxyRequest, RedirectPolicy};
use crate::outcome::Outcome;
use crate::routes::Upstream;

/// Parts of an inbound request that are relayed upstream.
#[derive(Debug)]
pub struct ForwardRequest {
    pub method: Method,
    /// Path plus optional query, starting with `/`.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Body,
}

pub struct ResponseForwarder {
    client: Arc<dyn HttpClient>,
}

impl ResponseForwarder {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// `GET /v2/` against the upstream with the client's credentials. A 401
    /// becomes a challenge for this proxy, anything else passes through.
    pub async fn probe(
        &self,
        upstream: &Upstream,
        authorization: Option<&HeaderValue>,
        realm: String,
    ) -> ProxyResult<Outcome> {
        let mut request = ProxyRequest::get(Url::parse(&upstream.url_for("/v2/"))?);
        if let Some(auth) = authorization {
            request = request.with_header(header::AUTHORIZATION, auth.clone());
        }

        let response = self.client.fetch(request).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            return Ok(Outcome::Challenge { realm });
        }
        Ok(Outcome::Direct(response))
    }

    /// Relay an arbitrary registry call.
    ///
    /// Docker Hub answers blob downloads with a 307 to object storage, so
    /// redirects are handled here for it instead of by the transport.
    pub async fn forward(
        &self,
        upstream: &Upstream,
        request: ForwardRequest,
        realm: String,
    ) -> ProxyResult<Outcome> {
        let url = Url::parse(&upstream.url_for(&request.path_and_query))?;
        let has_credentials = request.headers.contains_key(header::AUTHORIZATION);
        let redirect = if upstream.is_docker_hub() {
            RedirectPolicy::Manual
        } else {
            RedirectPolicy::Follow
        };

        let outbound = ProxyRequest::new(request.method, url.clone())
            .with_headers(request.headers)
            .with_body(request.body)
            .with_redirect(redirect);
        let response = self.client.fetch(outbound).await?;

        if response.status == StatusCode::UNAUTHORIZED {
            if has_credentials {
                // Credentials were presented and still refused: the upstream
                // error (denied, unknown repository) is the real answer.
                debug!(url = %url, "Upstream rejected supplied credentials");
                return Ok(Outcome::Forward(response));
            }
            return Ok(Outcome::Challenge { realm });
        }

        if upstream.is_docker_hub() && response.status == StatusCode::TEMPORARY_REDIRECT {
            let Some(location) = response.header(&header::LOCATION) else {
                warn!(url = %url, "Redirect without Location, relaying as-is");
                return Ok(Outcome::Forward(response));
            };
            let target = url.join(location)?;
            debug!(target = %target.host_str().unwrap_or_default(), "Following blob redirect");

            // The pre-signed target must not see the client's credentials.
            let blob = self
                .client
                .fetch(ProxyRequest::get(target).with_redirect(RedirectPolicy::Follow))
                .await?;
            return Ok(Outcome::Direct(blob));
        }

        Ok(Outcome::Forward(response))
    }
}
