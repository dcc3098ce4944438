//! Tagged results of the per-path handlers and the single stage that turns
//! them into client responses.

use crate::config::Mode;
use crate::error::ProxyResult;
use crate::http::ProxyResponse;
use axum::http::{header, HeaderValue, StatusCode};
use serde_json::json;

/// `service` advertised in challenges issued by this proxy.
pub const PROXY_SERVICE: &str = "cloudflare-docker-proxy";

/// Path of the token endpoint served by this proxy.
pub const AUTH_PATH: &str = "/v2/auth";

#[derive(Debug)]
pub enum Outcome {
    /// Upstream response relayed with `Access-Control-Allow-Origin: *`.
    Forward(ProxyResponse),
    /// Response sent exactly as built.
    Direct(ProxyResponse),
    /// 401 pointing the client at this proxy's token endpoint.
    Challenge { realm: String },
    /// 301 to `location`.
    Redirect { location: String },
}

impl Outcome {
    pub fn render(self) -> ProxyResult<ProxyResponse> {
        match self {
            Outcome::Forward(response) => Ok(response.allow_any_origin()),
            Outcome::Direct(response) => Ok(response),
            Outcome::Challenge { realm } => {
                let challenge = format!("Bearer realm=\"{realm}\",service=\"{PROXY_SERVICE}\"");
                Ok(
                    ProxyResponse::json(StatusCode::UNAUTHORIZED, &json!({"message": "UNAUTHORIZED"}))?
                        .with_header(header::WWW_AUTHENTICATE, HeaderValue::from_str(&challenge)?)
                        .allow_any_origin(),
                )
            }
            Outcome::Redirect { location } => Ok(ProxyResponse::new(StatusCode::MOVED_PERMANENTLY)
                .with_header(header::LOCATION, HeaderValue::from_str(&location)?)),
        }
    }
}

/// Token realm clients are sent to. Debug deployments run without TLS and
/// keep the port of the inbound `Host`; production uses the bare hostname.
pub fn challenge_realm(mode: Mode, host_header: &str, hostname: &str) -> String {
    match mode {
        Mode::Debug => format!("http://{host_header}{AUTH_PATH}"),
        Mode::Production => format!("https://{hostname}{AUTH_PATH}"),
    }
}
