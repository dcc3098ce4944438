//! HTTP front end.
//!
//! Every request lands on a single fallback handler; routing by host and
//! path happens in [`RequestDispatcher`], not in the axum router.

use crate::cache::MemoryTokenCache;
use crate::config::ProxyConfig;
use crate::dispatch::{InboundRequest, RequestDispatcher};
use crate::docs::EmbeddedDocs;
use crate::http::{Body, ReqwestClient};
use crate::outcome::Outcome;
use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<RequestDispatcher>,
}

/// Dispatcher wired to the network client, an in-memory token cache and the
/// embedded landing page.
pub fn build_dispatcher(config: &ProxyConfig) -> Result<RequestDispatcher> {
    let client = ReqwestClient::new(config.upstream_timeout())
        .context("Failed to build upstream HTTP client")?;
    Ok(RequestDispatcher::new(
        Arc::new(config.clone()),
        Arc::new(client),
        Arc::new(MemoryTokenCache::new()),
        Arc::new(EmbeddedDocs),
    ))
}

/// axum application serving every path through `dispatcher`.
pub fn build_app(dispatcher: Arc<RequestDispatcher>) -> Router {
    Router::new()
        .fallback(proxy_request)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { dispatcher })
}

/// Run the proxy with optional graceful shutdown. Without a receiver the
/// server stops on Ctrl-C.
pub async fn run_server_with_shutdown(
    config: ProxyConfig,
    shutdown_receiver: Option<tokio::sync::oneshot::Receiver<()>>,
) -> Result<()> {
    let dispatcher = build_dispatcher(&config)?;
    info!(
        domain = %config.custom_domain,
        mode = %config.mode,
        routes = dispatcher.router().table().len(),
        "Starting registry proxy"
    );
    let app = build_app(Arc::new(dispatcher));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Registry proxy listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match shutdown_receiver {
                Some(shutdown_rx) => {
                    shutdown_rx.await.ok();
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            info!("Received shutdown signal, stopping registry proxy gracefully");
        })
        .await
        .context("Server error")?;

    Ok(())
}

pub async fn run_server(config: ProxyConfig) -> Result<()> {
    run_server_with_shutdown(config, None).await
}

async fn proxy_request(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let inbound = InboundRequest::new(parts.method, parts.uri, parts.headers, Body::from(body));

    match state
        .dispatcher
        .dispatch(inbound)
        .await
        .and_then(Outcome::render)
    {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}
