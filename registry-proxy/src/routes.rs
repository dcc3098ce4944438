//! Hostname to upstream registry routing.

use crate::config::ProxyConfig;
use indexmap::IndexMap;
use serde::Serialize;

/// Docker Hub registry endpoint. Several behaviours (catalog blocking,
/// `library/` rewriting, manual blob redirects) key off this exact value.
pub const DOCKER_HUB: &str = "https://registry-1.docker.io";

/// Subdomain prefixes and the registries they front, in table order.
const REGISTRIES: &[(&str, &str)] = &[
    ("docker", DOCKER_HUB),
    ("quay", "https://quay.io"),
    ("gcr", "https://gcr.io"),
    ("k8s-gcr", "https://k8s.gcr.io"),
    ("k8s", "https://registry.k8s.io"),
    ("ghcr", "https://ghcr.io"),
    ("cloudsmith", "https://docker.cloudsmith.io"),
    ("ecr", "https://public.ecr.aws"),
    ("docker-staging", DOCKER_HUB),
];

/// Insertion-ordered hostname → upstream base URL map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RouteTable(IndexMap<String, String>);

impl RouteTable {
    /// Build the standard table for `domain`.
    pub fn for_domain(domain: &str) -> Self {
        let domain = domain.trim().to_ascii_lowercase();
        Self(
            REGISTRIES
                .iter()
                .map(|(prefix, upstream)| (format!("{prefix}.{domain}"), upstream.to_string()))
                .collect(),
        )
    }

    pub fn get(&self, hostname: &str) -> Option<&str> {
        self.0.get(hostname).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(h, u)| (h.as_str(), u.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A resolved upstream registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub base_url: String,
}

impl Upstream {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn is_docker_hub(&self) -> bool {
        self.base_url == DOCKER_HUB
    }

    /// Absolute upstream URL for `path_and_query`, which must start with `/`.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

/// Lower-case a `Host` value and drop any `:port` suffix.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if let Some(rest) = host.strip_prefix('[') {
        // IPv6 literal
        rest.split(']').next().unwrap_or(rest)
    } else {
        host.rsplit_once(':')
            .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
            .map(|(name, _)| name)
            .unwrap_or(host)
    };
    without_port.trim_end_matches('.').to_ascii_lowercase()
}

/// Resolves inbound hostnames against the route table.
#[derive(Debug, Clone)]
pub struct Router {
    table: RouteTable,
    fallback: Option<Upstream>,
}

impl Router {
    pub fn new(table: RouteTable, fallback: Option<Upstream>) -> Self {
        Self { table, fallback }
    }

    /// Build the router for a deployment. The fallback only exists in debug
    /// mode with a non-empty target.
    pub fn from_config(config: &ProxyConfig) -> Self {
        let fallback = if config.is_debug() {
            config.fallback_target().map(Upstream::new)
        } else {
            None
        };
        Self::new(RouteTable::for_domain(&config.custom_domain), fallback)
    }

    /// `None` means the host is unknown and there is no debug fallback.
    pub fn resolve_upstream(&self, hostname: &str) -> Option<Upstream> {
        let host = normalize_host(hostname);
        match self.table.get(&host) {
            Some(upstream) => Some(Upstream::new(upstream)),
            None => self.fallback.clone(),
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }
}
