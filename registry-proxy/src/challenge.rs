//! `WWW-Authenticate` challenge parsing.
//!
//! Registries answer an unauthenticated `/v2/` probe with
//! `Bearer realm="https://auth.example.com/token",service="registry.example.com"`.
//! Only the first two quoted values are used, in the order realm then
//! service, which is how every registry emits them.

use once_cell::sync::Lazy;
use regex::Regex;

// A quoted value directly after `=`, honouring backslash escapes.
static QUOTED_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"="((?:\\.|[^"\\])*)""#).expect("valid challenge regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("expected realm and service in '{header}', found {found} quoted value(s)")]
    MissingValues { found: usize, header: String },

    #[error("empty {field} in '{header}'")]
    EmptyValue { field: &'static str, header: String },
}

/// Where and for which service a bearer token must be requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: String,
}

impl AuthChallenge {
    /// Parse a single `WWW-Authenticate` header value.
    pub fn parse(header: &str) -> Result<Self, ChallengeError> {
        let mut values = QUOTED_VALUE
            .captures_iter(header)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()));

        let (realm, service) = match (values.next(), values.next()) {
            (Some(realm), Some(service)) => (realm, service),
            (first, _) => {
                return Err(ChallengeError::MissingValues {
                    found: usize::from(first.is_some()),
                    header: header.to_string(),
                })
            }
        };

        for (field, value) in [("realm", realm), ("service", service)] {
            if value.is_empty() {
                return Err(ChallengeError::EmptyValue {
                    field,
                    header: header.to_string(),
                });
            }
        }

        Ok(Self {
            realm: realm.to_string(),
            service: service.to_string(),
        })
    }
}
