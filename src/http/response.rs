//! Response relaying and error mapping.
//!
//! # Responsibilities
//! - Hand the upstream response back to the client unchanged
//! - Map upstream failures to gateway status codes
//!
//! # Design Decisions
//! - Streaming responses avoid buffering the entire body
//! - Unreachable or broken upstreams surface as 502 Bad Gateway
//! - An upstream that never sends a response head surfaces as 504 Gateway Timeout

use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::net::DialError;

/// Failure while forwarding a request upstream. Isolated to one session.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error(transparent)]
    Dial(#[from] DialError),

    #[error("upstream handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper::Error),

    #[error("upstream sent no response within {0:?}")]
    ResponseTimeout(Duration),

    #[error("could not build upstream request: {0}")]
    Request(#[from] axum::http::Error),
}

impl ForwardError {
    /// Status returned to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Dial(_) | ForwardError::Handshake(_) | ForwardError::Upstream(_) => {
                StatusCode::BAD_GATEWAY
            }
            ForwardError::ResponseTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::Request(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for logs.
    pub fn reason(&self) -> &'static str {
        match self {
            ForwardError::Dial(e) => e.reason(),
            ForwardError::Handshake(_) => "handshake-failed",
            ForwardError::Upstream(_) => "upstream-error",
            ForwardError::ResponseTimeout(_) => "response-timeout",
            ForwardError::Request(_) => "invalid-request",
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let message = match self.status() {
            StatusCode::BAD_GATEWAY => "Upstream request failed",
            StatusCode::GATEWAY_TIMEOUT => "Upstream timed out",
            _ => "Proxy error",
        };
        (self.status(), message).into_response()
    }
}

/// Convert an upstream response into one the server can send, streaming the body.
pub fn relay(response: Response<hyper::body::Incoming>) -> Response {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}
