//! # Registry Proxy
//!
//! A reverse proxy that fronts public container registries under one custom
//! domain, one subdomain per registry (`docker.<domain>`, `ghcr.<domain>`,
//! ...), so clients that cannot reach the registries directly can still
//! pull images.
//!
//! ## Features
//!
//! - **Host routing**: subdomain to upstream registry table, with a debug-mode fallback
//! - **Token broker**: answers `/v2/auth` by exchanging credentials with the upstream's realm
//! - **Token cache**: successful token responses reused for 240 seconds per credential
//! - **Docker Hub quirks**: `library/` short names, blocked catalog, blob redirects
//!
//! ## Usage
//!
//! ```rust,no_run
//! use registry_proxy::{run_server, ProxyConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! run_server(ProxyConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod challenge;
pub mod config;
pub mod dispatch;
pub mod docs;
pub mod error;
pub mod forward;
pub mod http;
pub mod outcome;
pub mod routes;
pub mod scope;
pub mod server;
pub mod token;

// Re-export main types
pub use cache::{MemoryTokenCache, TokenCache, TOKEN_TTL};
pub use challenge::AuthChallenge;
pub use config::{ConfigOverrides, Mode, ProxyConfig};
pub use dispatch::{InboundRequest, RequestDispatcher};
pub use docs::{EmbeddedDocs, StaticDocProvider};
pub use error::{ProxyError, ProxyResult};
pub use http::{Body, HttpClient, ProxyRequest, ProxyResponse, ReqwestClient};
pub use outcome::Outcome;
pub use routes::{RouteTable, Router, Upstream};

// Re-export server functions
pub use server::{build_app, build_dispatcher, run_server, run_server_with_shutdown};
