//! # Configuration
//!
//! Deployment settings for the proxy. A [`ProxyConfig`] is built once at
//! startup and shared read-only with the router and dispatcher.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! CLI flags / environment variables (`CUSTOM_DOMAIN`, `MODE`,
//! `TARGET_UPSTREAM`, `PROXY_HOST`, `PROXY_PORT`, `UPSTREAM_TIMEOUT_SECS`).
//!
//! ```json
//! {
//!   "custom_domain": "example.com",
//!   "mode": "production",
//!   "server": { "host": "0.0.0.0", "port": 8080 },
//!   "upstream_timeout_secs": 60
//! }
//! ```

use crate::error::{ProxyError, ProxyResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_DOMAIN: &str = "example.com";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

/// Operating mode of the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Mode {
    #[default]
    Production,
    /// Unknown hosts fall back to `target_upstream` and challenges advertise
    /// a plain `http` realm.
    Debug,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Production => "production",
            Mode::Debug => "debug",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "debug" => Ok(Mode::Debug),
            other => Err(ProxyError::Config(format!(
                "unknown mode '{other}', expected 'production' or 'debug'"
            ))),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = ProxyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Immutable deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Suffix the per-registry hostnames are derived from, e.g. `docker.<domain>`.
    pub custom_domain: String,
    #[serde(default)]
    pub mode: Mode,
    /// Catch-all upstream for unknown hosts, honoured in debug mode only.
    #[serde(default)]
    pub target_upstream: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    /// Longest wait for a single upstream read.
    #[serde(default = "default_timeout_secs")]
    pub upstream_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            custom_domain: DEFAULT_DOMAIN.to_string(),
            mode: Mode::default(),
            target_upstream: None,
            server: ServerConfig::default(),
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
        }
    }
}

/// Values supplied on the command line or through the environment. `None`
/// means "not given" so the file or default value survives.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub custom_domain: Option<String>,
    pub mode: Option<Mode>,
    pub target_upstream: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub upstream_timeout_secs: Option<u64>,
}

impl ProxyConfig {
    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> ProxyResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ProxyError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Apply overrides on top of this configuration and validate the result.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> ProxyResult<Self> {
        if let Some(domain) = overrides.custom_domain {
            self.custom_domain = domain;
        }
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if let Some(target) = overrides.target_upstream {
            self.target_upstream = Some(target);
        }
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(secs) = overrides.upstream_timeout_secs {
            self.upstream_timeout_secs = secs;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ProxyResult<()> {
        let domain = self.custom_domain.trim();
        if domain.is_empty() {
            return Err(ProxyError::Config("custom domain cannot be empty".into()));
        }
        if domain.contains('/') || domain.contains(':') {
            return Err(ProxyError::Config(format!(
                "custom domain '{domain}' must be a bare hostname"
            )));
        }

        if self.mode == Mode::Debug {
            if let Some(target) = self.fallback_target() {
                let url = Url::parse(target).map_err(|e| {
                    ProxyError::Config(format!("invalid target upstream '{target}': {e}"))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ProxyError::Config(format!(
                        "target upstream '{target}' must use http or https"
                    )));
                }
            }
        }

        if self.upstream_timeout_secs == 0 {
            return Err(ProxyError::Config(
                "upstream timeout must be at least one second".into(),
            ));
        }

        Ok(())
    }

    pub fn is_debug(&self) -> bool {
        self.mode == Mode::Debug
    }

    /// Debug fallback target; empty values count as unset.
    pub fn fallback_target(&self) -> Option<&str> {
        self.target_upstream
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
