//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Keep the serving generation alive until the response body is sent
//! - Map every origin failure to `502 Bad Gateway`

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use hyper::body::{Body as HttpBody, Frame, SizeHint};

use crate::registry::Generation;

pub const X_PROXY_ERROR: HeaderName = HeaderName::from_static("x-proxy-error");

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in named.iter().map(String::as_str).chain(HOP_BY_HOP) {
        headers.remove(name);
    }
}

/// Response for a request no origin could answer.
pub fn bad_gateway(kind: &'static str, message: impl Into<String>) -> Response {
    let mut response = (StatusCode::BAD_GATEWAY, message.into()).into_response();
    response
        .headers_mut()
        .insert(X_PROXY_ERROR, HeaderValue::from_static(kind));
    response
}

/// Origin response body that pins the generation it was routed by.
///
/// The generation is released when the body has been fully streamed or the
/// client goes away, whichever happens first.
pub struct LeasedBody<B> {
    inner: B,
    _generation: Arc<Generation>,
}

impl<B> LeasedBody<B> {
    pub fn new(inner: B, generation: Arc<Generation>) -> Self {
        Self {
            inner,
            _generation: generation,
        }
    }
}

impl<B> HttpBody for LeasedBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Wrap an origin response for the client.
pub fn client_response<B>(response: axum::http::Response<B>, generation: Arc<Generation>) -> Response
where
    B: HttpBody<Data = Bytes> + Unpin + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(LeasedBody::new(body, generation)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Candidate, GenerationId, Registry};
    use crate::topology::Topology;

    #[test]
    fn strips_listed_and_connection_named_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close, x-internal"));
        headers.insert("x-internal", HeaderValue::from_static("1"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("content-type"));
    }

    #[test]
    fn bad_gateway_carries_error_kind() {
        let response = bad_gateway("timeout", "origin timed out");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[X_PROXY_ERROR], "timeout");
    }

    #[tokio::test]
    async fn body_holds_generation_until_consumed() {
        let registry = Registry::new();
        registry
            .publish(Candidate::new(GenerationId::INITIAL, Topology::default(), Vec::new()))
            .unwrap();

        let origin = axum::http::Response::new(http_body_full("payload"));
        let response = client_response(origin, registry.current());

        registry
            .publish(Candidate::new(GenerationId::new(1), Topology::default(), Vec::new()))
            .unwrap();
        assert_eq!(registry.draining(), vec![GenerationId::new(1)]);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"payload");
        assert!(registry.draining().is_empty());
    }

    fn http_body_full(text: &'static str) -> Body {
        Body::from(text)
    }
}
