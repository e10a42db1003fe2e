//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler as catch-all
//! - Wire up middleware (tracing, timeout)
//! - Classify each request as standard or upgrade
//! - Dispatch matched requests to the forwarder or the upgrade bridge
//! - Hand unmatched requests to the fallback collaborator
//! - Graceful shutdown with a bounded grace period

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower::ServiceExt;
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ProxyConfig, ServerConfig};
use crate::http::forward::Forwarder;
use crate::http::request::is_upgrade_request;
use crate::http::upgrade::UpgradeBridge;
use crate::net::listener::{self, ListenerError};
use crate::net::{SessionTracker, UpstreamDialer};
use crate::routing::RouteTable;

/// Fatal server errors. Per-session failures never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub forwarder: Forwarder,
    pub bridge: UpgradeBridge,
    pub sessions: SessionTracker,
    pub fallback: Router,
}

/// HTTP server for the development proxy.
pub struct HttpServer {
    config: ProxyConfig,
    routes: Arc<RouteTable>,
    sessions: SessionTracker,
    fallback: Router,
}

impl HttpServer {
    /// Create a server for a compiled, immutable route table.
    pub fn new(config: ProxyConfig, routes: RouteTable) -> Self {
        let fallback = default_fallback(&config.server);
        Self {
            config,
            routes: Arc::new(routes),
            sessions: SessionTracker::new(),
            fallback,
        }
    }

    /// Replace the collaborator that answers requests no route matches.
    pub fn with_fallback(mut self, fallback: Router) -> Self {
        self.fallback = fallback;
        self
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Proxied exchanges are bounded by the connect and response timeouts
    /// only, so slow uploads and long-lived upgrades are never cut off.
    /// `request_secs` applies to requests answered by the fallback.
    fn build_router(&self) -> Router {
        let dialer = UpstreamDialer::new(Duration::from_secs(self.config.timeouts.connect_secs));
        let response_timeout = Duration::from_secs(self.config.timeouts.response_secs);

        let state = AppState {
            routes: Arc::clone(&self.routes),
            forwarder: Forwarder::new(dialer.clone(), response_timeout),
            bridge: UpgradeBridge::new(dialer, response_timeout),
            sessions: self.sessions.clone(),
            fallback: self.fallback.clone().layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(self.config.timeouts.request_secs),
            )),
        };

        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn bind_and_run(self, shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let listener = listener::bind(&self.config.server).await?;
        self.run(listener, shutdown).await
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// After `shutdown` fires no new connections are accepted; in-flight
    /// sessions get `shutdown_grace_secs` to finish before they are closed.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.routes.len(),
            "HTTP server starting"
        );
        for rule in self.routes.rules() {
            tracing::info!(
                route = %rule.name,
                prefix = %rule.prefix(),
                target = %rule.target,
                upgrade_enabled = rule.upgrade_enabled,
                rewrite_host_header = rule.rewrite_host_header,
                "Proxy route active"
            );
        }

        let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);
        let sessions = self.sessions.clone();
        let app = self
            .build_router()
            .into_make_service_with_connect_info::<SocketAddr>();

        let (signalled_tx, mut signalled_rx) = watch::channel(false);
        let signal = async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received, draining connections");
            let _ = signalled_tx.send(true);
        };
        let deadline = async move {
            let _ = signalled_rx.wait_for(|signalled| *signalled).await;
            tokio::time::sleep(grace).await;
        };

        let drain_sessions = sessions.clone();
        let serve = async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await?;
            drain_sessions.wait_idle().await;
            Ok::<_, std::io::Error>(())
        };

        tokio::select! {
            result = serve => result?,
            _ = deadline => {
                tracing::warn!(
                    active_sessions = sessions.active_count(),
                    grace_secs = grace.as_secs(),
                    "Grace period elapsed, closing remaining sessions"
                );
            }
        }
        sessions.force_close();

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Static directory when configured, plain 404 otherwise.
fn default_fallback(server: &ServerConfig) -> Router {
    match &server.static_dir {
        Some(dir) => Router::new().fallback_service(ServeDir::new(dir)),
        None => Router::new().fallback(not_found),
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "No matching route found")
}

/// Main proxy handler.
/// Looks up the route, classifies the request and forwards it.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // 1. Match Route
    let rule = match state.routes.match_path(&path) {
        Some(rule) => Arc::clone(rule),
        None => {
            tracing::debug!(method = %method, path = %path, "No route matched, using fallback");
            let response: Result<Response, Infallible> = state.fallback.oneshot(request).await;
            return match response {
                Ok(response) => response,
                Err(never) => match never {},
            };
        }
    };

    // 2. Classify
    let upgrade = is_upgrade_request(request.headers());
    if upgrade && !rule.upgrade_enabled {
        tracing::warn!(route = %rule.name, path = %path, "Upgrade request on route without upgrade forwarding");
        return (
            StatusCode::NOT_IMPLEMENTED,
            "Upgrade forwarding is disabled for this route",
        )
            .into_response();
    }

    let session = state.sessions.open(peer, &rule.name);
    let session_id = session.id();
    tracing::debug!(
        session_id = %session_id,
        peer = %peer,
        method = %method,
        path = %path,
        route = %rule.name,
        upgrade,
        "Proxying request"
    );

    // 3. Dispatch
    let result = if upgrade {
        state.bridge.negotiate(request, &rule, session).await
    } else {
        state.forwarder.forward(request, &rule, session).await
    };

    match result {
        Ok(response) => {
            tracing::debug!(
                session_id = %session_id,
                status = %response.status(),
                "Upstream responded"
            );
            response
        }
        Err(e) => {
            tracing::error!(
                session_id = %session_id,
                route = %rule.name,
                target = %rule.target,
                reason = e.reason(),
                error = %e,
                "Upstream request failed"
            );
            e.into_response()
        }
    }
}
