//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Prepare the client request for forwarding to an origin
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The body is streamed through untouched

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, HOST};
use axum::http::request::Parts;
use axum::http::{Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::http::response::strip_hop_by_hop;
use crate::pool::OriginEndpoint;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Makes a fresh UUID v4 for requests that arrive without an ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Request ID of an inbound request, `-` when missing.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

/// Rewrite a client request for `endpoint`.
///
/// The URI becomes origin-form, hop-by-hop headers are dropped, `Host` is
/// filled in when the client sent none and the client address is appended to
/// `X-Forwarded-For`.
pub fn origin_request(
    mut parts: Parts,
    body: Body,
    endpoint: &OriginEndpoint,
    client: Option<SocketAddr>,
) -> Result<Request<Body>, axum::http::Error> {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned());
    parts.uri = Uri::try_from(path_and_query)?;

    strip_hop_by_hop(&mut parts.headers);

    if !parts.headers.contains_key(HOST) {
        let host = HeaderValue::from_str(endpoint.authority())?;
        parts.headers.insert(HOST, host);
    }

    if let Some(client) = client {
        let forwarded = match parts.headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, client.ip()),
            None => client.ip().to_string(),
        };
        parts.headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(&forwarded)?);
    }

    Ok(Request::from_parts(parts, body))
}
