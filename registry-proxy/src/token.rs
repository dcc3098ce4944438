//! Registry v2 bearer-token exchange performed on behalf of clients.
//!
//! A `GET /v2/auth?scope=...` is answered by discovering the upstream's
//! token realm from its `/v2/` challenge, then requesting a token there with
//! the client's credentials. Successful token responses are cached for
//! [`TOKEN_TTL`] under a key that never contains the credentials
//! themselves.

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{cache_key, CachedToken, TokenCache, TOKEN_TTL};
use crate::challenge::AuthChallenge;
use crate::error::ProxyResult;
use crate::http::{HttpClient, ProxyRequest};
use crate::outcome::Outcome;
use crate::routes::Upstream;
use crate::scope::normalize_scope;

/// Parameters of one token request.
#[derive(Debug, Clone, Copy)]
pub struct TokenRequest<'a> {
    /// Normalized inbound hostname, part of the cache key.
    pub hostname: &'a str,
    pub upstream: &'a Upstream,
    /// Raw `scope` query parameter.
    pub scope: Option<&'a str>,
    pub authorization: Option<&'a HeaderValue>,
}

pub struct TokenBroker {
    client: Arc<dyn HttpClient>,
    cache: Arc<dyn TokenCache>,
}

impl TokenBroker {
    pub fn new(client: Arc<dyn HttpClient>, cache: Arc<dyn TokenCache>) -> Self {
        Self { client, cache }
    }

    pub async fn issue(&self, request: TokenRequest<'_>) -> ProxyResult<Outcome> {
        let probe_url = Url::parse(&request.upstream.url_for("/v2/"))?;
        let probe = self.client.fetch(ProxyRequest::get(probe_url)).await?;

        if probe.status != StatusCode::UNAUTHORIZED {
            debug!(status = %probe.status, "Upstream does not require auth");
            return Ok(Outcome::Direct(probe));
        }
        let Some(header_value) = probe.headers.get(header::WWW_AUTHENTICATE) else {
            debug!("Upstream 401 without challenge, passing through");
            return Ok(Outcome::Direct(probe));
        };
        let challenge = AuthChallenge::parse(&String::from_utf8_lossy(header_value.as_bytes()))?;

        let scope = normalize_scope(request.scope, request.upstream.is_docker_hub());
        let key = cache_key(
            request.hostname,
            scope.as_deref(),
            request.authorization.map(HeaderValue::as_bytes),
        );

        if let Some(cached) = self.cache.get(&key).await {
            debug!(key = %key, "Token cache hit");
            return Ok(Outcome::Direct(cached.to_response()));
        }

        let token_url = token_url(&challenge, scope.as_deref())?;
        debug!(realm = %challenge.realm, service = %challenge.service, scope = ?scope, "Requesting token");

        let mut token_request = ProxyRequest::get(token_url);
        if let Some(auth) = request.authorization {
            token_request = token_request.with_header(header::AUTHORIZATION, auth.clone());
        }
        let response = self.client.fetch(token_request).await?;

        if response.status != StatusCode::OK {
            warn!(status = %response.status, realm = %challenge.realm, "Token request rejected");
            return Ok(Outcome::Forward(response));
        }

        let mut headers = response.headers;
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=240"),
        );
        let token = CachedToken {
            status: response.status,
            headers,
            body: response.body.into_bytes().await?,
        };

        self.cache.put(&key, token.clone(), TOKEN_TTL).await;
        info!(key = %key, "Cached new token");

        Ok(Outcome::Direct(token.to_response()))
    }
}

/// Realm URL with `service` and, when present, `scope` set as query
/// parameters. Existing values of either are replaced.
pub fn token_url(challenge: &AuthChallenge, scope: Option<&str>) -> ProxyResult<Url> {
    let mut url = Url::parse(&challenge.realm)?;
    set_query_param(&mut url, "service", &challenge.service);
    if let Some(scope) = scope {
        set_query_param(&mut url, "scope", scope);
    }
    Ok(url)
}

fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    pairs.extend_pairs(retained);
    pairs.append_pair(name, value);
}
