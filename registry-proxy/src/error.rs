//! # Error Handling
//!
//! Failures that abort a single request. Expected traffic shapes (unknown
//! host, blocked catalog, upstream auth rejections) are ordinary responses
//! and never pass through here.
//!
//! Errors render in the registry v2 error envelope so Docker clients can
//! surface them:
//!
//! ```json
//! {"errors": [{"code": "UPSTREAM_UNAVAILABLE", "message": "...", "detail": "..."}]}
//! ```

use crate::challenge::ChallengeError;
use crate::http::FetchError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// One entry of a registry v2 error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Registry v2 error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryErrorBody {
    pub errors: Vec<RegistryErrorDetail>,
}

impl RegistryErrorBody {
    pub fn single(code: &str, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            errors: vec![RegistryErrorDetail {
                code: code.to_string(),
                message: message.into(),
                detail,
            }],
        }
    }
}

/// Machine-readable classification of a [`ProxyError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidChallenge,
    UpstreamUnavailable,
    Configuration,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidChallenge => "INVALID_CHALLENGE",
            ErrorCode::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            ErrorCode::Configuration => "CONFIGURATION",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCode::InvalidChallenge | ErrorCode::Configuration | ErrorCode::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream sent a malformed authentication challenge: {0}")]
    ChallengeParse(#[from] ChallengeError),

    #[error("upstream request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] axum::http::header::InvalidHeaderValue),

    #[error("failed to render landing page: {0}")]
    Template(#[from] tera::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProxyError::ChallengeParse(_) => ErrorCode::InvalidChallenge,
            ProxyError::Fetch(_) => ErrorCode::UpstreamUnavailable,
            ProxyError::Config(_) => ErrorCode::Configuration,
            ProxyError::InvalidUrl(_)
            | ProxyError::InvalidHeader(_)
            | ProxyError::Template(_)
            | ProxyError::Json(_) => ErrorCode::Internal,
        }
    }

    pub fn to_error_body(&self) -> RegistryErrorBody {
        let code = self.error_code();
        let message = match code {
            ErrorCode::InvalidChallenge => "upstream authentication challenge could not be parsed",
            ErrorCode::UpstreamUnavailable => "upstream registry could not be reached",
            ErrorCode::Configuration => "proxy is misconfigured",
            ErrorCode::Internal => "internal proxy error",
        };
        RegistryErrorBody::single(code.as_str(), message, Some(self.to_string()))
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();
        tracing::error!(error = %self, code = code.as_str(), "Request failed");

        let mut response = (status, axum::Json(self.to_error_body())).into_response();
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        response
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
