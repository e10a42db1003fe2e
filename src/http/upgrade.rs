//! Upgrade (WebSocket) proxying.
//!
//! # Responsibilities
//! - Forward the client's `Upgrade` handshake to the upstream
//! - Relay the upstream's answer (101 or rejection) to the client
//! - Bridge the two upgraded connections byte-for-byte
//!
//! # State Machine
//! ```text
//! Negotiating ──101──▶ Bridged ──EOF / error / shutdown──▶ Closed
//!      │
//!      └──non-101 / dial failure──▶ Closed
//! ```
//!
//! # Design Decisions
//! - No frame inspection: after the handshake the streams are opaque bytes
//! - Either side ending closes both (no half-open lingering)
//! - Rejections are relayed verbatim, then the client connection is closed

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONNECTION;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::Response;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::http::body::TrackedBody;
use crate::http::forward::{drive_connection, send_request};
use crate::http::request::upstream_request;
use crate::http::response::{relay, ForwardError};
use crate::net::{ProxySession, SessionId, UpstreamDialer};
use crate::routing::RouteRule;

/// How long closing each side of a finished bridge may take.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Named bridge states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Negotiating,
    Bridged,
    Closed,
}

/// Why a bridge reached `Closed`.
#[derive(Debug)]
pub enum CloseReason {
    /// Client reached end-of-stream.
    ClientClosed,
    /// Upstream reached end-of-stream.
    UpstreamClosed,
    /// I/O error in either direction.
    Io(io::Error),
    /// Server shutdown forced the bridge closed.
    Shutdown,
}

/// Failure completing the upgrade on one side after a 101.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("client upgrade failed: {0}")]
    ClientUpgrade(#[source] hyper::Error),

    #[error("upstream upgrade failed: {0}")]
    UpstreamUpgrade(#[source] hyper::Error),
}

/// Per-session bridge, carrying its state through the transitions.
struct Bridge {
    session: ProxySession,
    state: BridgeState,
}

impl Bridge {
    fn new(session: ProxySession) -> Self {
        Self {
            session,
            state: BridgeState::Negotiating,
        }
    }

    fn transition(&mut self, next: BridgeState) {
        tracing::debug!(
            session_id = %self.session.id(),
            from = ?self.state,
            to = ?next,
            "Bridge state change"
        );
        self.state = next;
    }

    /// Await both upgraded connections, then relay until one side ends.
    async fn run(mut self, client: OnUpgrade, upstream: OnUpgrade) {
        let upgraded = tokio::try_join!(
            async { client.await.map_err(BridgeError::ClientUpgrade) },
            async { upstream.await.map_err(BridgeError::UpstreamUpgrade) },
        );
        let (client, upstream) = match upgraded {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(session_id = %self.session.id(), error = %e, "Upgrade could not be completed");
                self.transition(BridgeState::Closed);
                return;
            }
        };

        self.transition(BridgeState::Bridged);
        let session_id = self.session.id();
        let (reason, bytes) = relay_streams(
            TokioIo::new(client),
            TokioIo::new(upstream),
            self.session.closed(),
        )
        .await;
        self.transition(BridgeState::Closed);

        match reason {
            CloseReason::Io(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "Bridge ended with I/O error")
            }
            reason => tracing::debug!(
                session_id = %session_id,
                route = %self.session.route(),
                reason = ?reason,
                bytes,
                duration_ms = self.session.elapsed().as_millis() as u64,
                "Bridge ended"
            ),
        }
    }
}

/// Forwards upgrade handshakes and owns the resulting bridges.
#[derive(Debug, Clone)]
pub struct UpgradeBridge {
    dialer: UpstreamDialer,
    response_timeout: Duration,
}

impl UpgradeBridge {
    pub fn new(dialer: UpstreamDialer, response_timeout: Duration) -> Self {
        Self {
            dialer,
            response_timeout,
        }
    }

    /// Negotiate the upgrade with the rule's target.
    ///
    /// On `101 Switching Protocols` the upstream's response head is returned
    /// for the client and a task bridges both connections once the server
    /// has written it. Any other upstream response is relayed as-is, with
    /// the session held until that response has been streamed.
    pub async fn negotiate(
        &self,
        mut request: Request<Body>,
        rule: &RouteRule,
        session: ProxySession,
    ) -> Result<Response, ForwardError> {
        let mut bridge = Bridge::new(session);
        let client_upgrade = hyper::upgrade::on(&mut request);

        let (mut response, conn) = match self.exchange(request, rule, bridge.session.id()).await {
            Ok(exchanged) => exchanged,
            Err(e) => {
                bridge.transition(BridgeState::Closed);
                return Err(e);
            }
        };
        let session_id = bridge.session.id();

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            tracing::info!(
                session_id = %session_id,
                status = %response.status(),
                target = %rule.target,
                "Upstream rejected upgrade"
            );
            bridge.transition(BridgeState::Closed);
            if let Some(conn) = conn {
                tokio::spawn(drive_connection(conn, bridge.session));
            }

            let mut rejection = relay(response);
            rejection
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
            return Ok(rejection);
        }

        let upstream_upgrade = hyper::upgrade::on(&mut response);
        let (parts, _body) = response.into_parts();

        // Resolves as soon as the connection is handed over to the upgrade.
        if let Some(conn) = conn {
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::debug!(session_id = %session_id, error = %e, "Upstream handshake connection error");
                }
            });
        }
        tokio::spawn(bridge.run(client_upgrade, upstream_upgrade));

        Ok(Response::from_parts(parts, Body::empty()))
    }

    /// Send the handshake over a fresh upgrade-capable connection.
    ///
    /// The connection is driven here until the response head arrives and is
    /// then returned, so the caller decides which task owns it. `None` means
    /// the connection already finished.
    async fn exchange(
        &self,
        request: Request<Body>,
        rule: &RouteRule,
        session_id: SessionId,
    ) -> Result<(Response<Incoming>, Option<UpstreamConnection>), ForwardError> {
        let (parts, body) = request.into_parts();
        let (body, sent) = TrackedBody::new(body);
        let upstream = upstream_request(parts, rule, body)?;

        let stream = self.dialer.dial(&rule.target).await?;
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(ForwardError::Handshake)?;
        let mut conn: UpstreamConnection = Box::pin(conn.with_upgrades());

        tracing::trace!(
            session_id = %session_id,
            uri = %upstream.uri(),
            target = %rule.target,
            "Sending upgrade handshake"
        );

        let send = send_request(&mut sender, upstream, sent, self.response_timeout);
        tokio::pin!(send);

        let mut finished = false;
        let response = tokio::select! {
            result = &mut send => result?,
            result = &mut conn => {
                finished = true;
                result.map_err(ForwardError::Upstream)?;
                (&mut send).await?
            }
        };
        Ok((response, (!finished).then_some(conn)))
    }
}

/// Upstream connection carrying an upgrade handshake.
type UpstreamConnection = Pin<Box<dyn Future<Output = hyper::Result<()>> + Send>>;

/// Copy bytes both ways until either side ends or `shutdown` resolves,
/// then shut both sides down.
///
/// Returns why the relay stopped and how many bytes the finishing
/// direction carried.
pub async fn relay_streams<C, U, S>(client: C, upstream: U, shutdown: S) -> (CloseReason, u64)
where
    C: AsyncRead + AsyncWrite,
    U: AsyncRead + AsyncWrite,
    S: Future<Output = ()>,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let outcome = tokio::select! {
        result = tokio::io::copy(&mut client_read, &mut upstream_write) => match result {
            Ok(bytes) => (CloseReason::ClientClosed, bytes),
            Err(e) => (CloseReason::Io(e), 0),
        },
        result = tokio::io::copy(&mut upstream_read, &mut client_write) => match result {
            Ok(bytes) => (CloseReason::UpstreamClosed, bytes),
            Err(e) => (CloseReason::Io(e), 0),
        },
        _ = shutdown => (CloseReason::Shutdown, 0),
    };

    let _ = tokio::time::timeout(CLOSE_TIMEOUT, upstream_write.shutdown()).await;
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, client_write.shutdown()).await;

    outcome
}
