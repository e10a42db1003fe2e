//! Request classification and upstream request construction.
//!
//! # Responsibilities
//! - Detect `Upgrade` handshakes (WebSocket and friends)
//! - Build the request sent upstream from the client's request
//!
//! # Design Decisions
//! - Headers are forwarded as received; the only optional rewrite is `Host`
//! - The URI becomes origin-form: rewritten path plus the original query
//! - Upstream is always spoken as HTTP/1.x

use axum::http::header::{CONNECTION, HOST, UPGRADE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request, Version};

use crate::routing::RouteRule;

/// True when the request asks to switch protocols: an `Upgrade` header
/// plus the `upgrade` token in `Connection`.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    if !headers.contains_key(UPGRADE) {
        return false;
    }
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Build the upstream request for `rule` from the client's request parts.
pub fn upstream_request<B>(
    parts: Parts,
    rule: &RouteRule,
    body: B,
) -> Result<Request<B>, axum::http::Error> {
    let path_and_query = rule.upstream_path_and_query(parts.uri.path(), parts.uri.query());
    let version = match parts.version {
        Version::HTTP_09 | Version::HTTP_10 => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut request = Request::builder()
        .method(parts.method)
        .uri(path_and_query)
        .version(version)
        .body(body)?;

    let mut headers = parts.headers;
    if rule.rewrite_host_header {
        headers.insert(HOST, HeaderValue::from_str(&rule.target.authority())?);
    } else if !headers.contains_key(HOST) {
        // HTTP/2 clients carry the authority in the URI instead of a header.
        if let Some(authority) = parts.uri.authority() {
            headers.insert(HOST, HeaderValue::from_str(authority.as_str())?);
        }
    }
    *request.headers_mut() = headers;

    Ok(request)
}
