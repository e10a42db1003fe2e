//! Standard request/response forwarding.
//!
//! # Data Flow
//! ```text
//! client request
//!     → request.rs (rewrite URI, optional Host rewrite)
//!     → dialer (fresh upstream connection)
//!     → hyper HTTP/1 client connection (driven by its own task)
//!     → response.rs (stream status, headers and body back)
//! ```
//!
//! No retries: a failed exchange is reported to the client once.

use std::future::Future;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;

use crate::http::body::{BodySent, TrackedBody};
use crate::http::request::upstream_request;
use crate::http::response::{relay, ForwardError};
use crate::net::{ProxySession, UpstreamDialer};
use crate::routing::RouteRule;

/// Forwards ordinary HTTP exchanges to a route's target.
#[derive(Debug, Clone)]
pub struct Forwarder {
    dialer: UpstreamDialer,
    response_timeout: Duration,
}

impl Forwarder {
    pub fn new(dialer: UpstreamDialer, response_timeout: Duration) -> Self {
        Self {
            dialer,
            response_timeout,
        }
    }

    /// Send `request` to the rule's target and return the upstream response.
    ///
    /// The session moves into the task driving the upstream connection and
    /// ends once the response body has been relayed (or shutdown forces it).
    pub async fn forward(
        &self,
        request: Request<Body>,
        rule: &RouteRule,
        session: ProxySession,
    ) -> Result<Response, ForwardError> {
        let (parts, body) = request.into_parts();
        let (body, sent) = TrackedBody::new(body);
        let upstream = upstream_request(parts, rule, body)?;

        let stream = self.dialer.dial(&rule.target).await?;
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(ForwardError::Handshake)?;

        let session_id = session.id();
        tokio::spawn(drive_connection(conn, session));

        tracing::trace!(
            session_id = %session_id,
            uri = %upstream.uri(),
            target = %rule.target,
            "Sending upstream request"
        );

        let response = send_request(&mut sender, upstream, sent, self.response_timeout).await?;
        Ok(relay(response))
    }
}

/// Send `request` and wait for the response head.
///
/// The request body streams for as long as the client takes to upload it;
/// `response_timeout` starts once the body has been sent.
pub(crate) async fn send_request(
    sender: &mut http1::SendRequest<TrackedBody>,
    request: Request<TrackedBody>,
    sent: BodySent,
    response_timeout: Duration,
) -> Result<hyper::Response<Incoming>, ForwardError> {
    let response = sender.send_request(request);
    tokio::pin!(response);

    tokio::select! {
        result = &mut response => return result.map_err(ForwardError::Upstream),
        _ = sent => {}
    }

    tokio::time::timeout(response_timeout, response)
        .await
        .map_err(|_| ForwardError::ResponseTimeout(response_timeout))?
        .map_err(ForwardError::Upstream)
}

/// Run an upstream connection until it finishes or the session is force-closed.
pub(crate) async fn drive_connection<C>(conn: C, mut session: ProxySession)
where
    C: Future<Output = hyper::Result<()>>,
{
    tokio::select! {
        result = conn => {
            if let Err(e) = result {
                tracing::debug!(session_id = %session.id(), error = %e, "Upstream connection error");
            }
        }
        _ = session.closed() => {
            tracing::debug!(session_id = %session.id(), "Upstream connection closed by shutdown");
        }
    }
}
