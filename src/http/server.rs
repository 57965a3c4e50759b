//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router for the serving path
//! - Wire up middleware (tracing, timeout, request ID)
//! - Resolve each request against the live generation
//! - Forward to an origin and stream the response back

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::request::{origin_request, request_id, UuidRequestId, X_REQUEST_ID};
use crate::http::response::{bad_gateway, client_response};
use crate::observability::metrics;
use crate::registry::Registry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

/// Client-facing proxy server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(registry: Arc<Registry>, request_timeout: Duration) -> Self {
        let state = AppState { registry };
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id(request),
                )
            }))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until shutdown is signalled.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy listener started");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(address = %addr, "Proxy listener stopped");
        Ok(())
    }
}

/// Route one request through the live generation.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    // Held until the response body is done; this keeps the generation from
    // being released while the exchange is in flight.
    let generation = state.registry.current();

    let Some(object) = generation.resolve(request.uri().path()).cloned() else {
        tracing::debug!(generation = %generation.id(), "No application matches path");
        metrics::record_request(metrics::UNROUTED, 502, started.elapsed());
        return bad_gateway("no-route", "No application matches this path");
    };
    let application = object.id();
    let pool = object.pool();

    let Some(endpoint) = pool.select() else {
        metrics::record_request(application, 502, started.elapsed());
        return bad_gateway("no-origin", "No origin available");
    };

    let connection = match pool.connect(&endpoint).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(
                application = %application,
                origin = %endpoint.id(),
                generation = %generation.id(),
                kind = e.kind(),
                error = %e,
                "Origin connection failed"
            );
            metrics::record_connect_error(application, e.kind());
            metrics::record_request(application, 502, started.elapsed());
            return bad_gateway(e.kind(), "Origin connection failed");
        }
    };

    let (parts, body) = request.into_parts();
    let outbound = match origin_request(parts, body, &endpoint, client) {
        Ok(outbound) => outbound,
        Err(e) => {
            tracing::warn!(application = %application, error = %e, "Request could not be forwarded");
            metrics::record_request(application, 502, started.elapsed());
            return bad_gateway("bad-request", "Request could not be forwarded");
        }
    };

    match connection.send(outbound).await {
        Ok(response) => {
            let status = response.status();
            tracing::debug!(
                application = %application,
                origin = %endpoint.id(),
                generation = %generation.id(),
                status = status.as_u16(),
                "Origin responded"
            );
            metrics::record_request(application, status.as_u16(), started.elapsed());
            client_response(response, generation.clone())
        }
        Err(e) => {
            tracing::warn!(
                application = %application,
                origin = %endpoint.id(),
                error = %e,
                "Origin exchange failed"
            );
            metrics::record_request(application, 502, started.elapsed());
            bad_gateway("exchange", "Origin exchange failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Candidate;
    use crate::routing::{build, BuildContext};
    use crate::topology::{parse, DefinitionDocument};
    use axum::http::StatusCode;
    use std::time::SystemTime;
    use tower::ServiceExt;

    fn server_with(text: &str) -> (Arc<Registry>, HttpServer) {
        let registry = Arc::new(Registry::new());
        let document = DefinitionDocument::new(text.to_string(), SystemTime::now());
        let topology = parse(&document).unwrap();
        let objects = build(&topology, &BuildContext::default()).unwrap();
        registry
            .publish(Candidate::new(registry.current().id(), topology, objects))
            .unwrap();
        let server = HttpServer::new(registry.clone(), Duration::from_secs(5));
        (registry, server)
    }

    #[tokio::test]
    async fn unmatched_path_is_bad_gateway() {
        let (_, server) = server_with(
            r#"- { id: api, path: "/api", origins: [{ id: o1, host: "127.0.0.1:9" }] }"#,
        );

        let response = server
            .router()
            .oneshot(Request::get("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()["x-proxy-error"], "no-route");
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn unnegotiable_tls_is_bad_gateway() {
        let (_, server) = server_with(
            r#"
- id: legacy
  path: "/"
  tlsSettings: { trustAllCerts: true, protocols: [TLSv1.1] }
  origins: [{ id: l1, host: "127.0.0.1:9" }]
"#,
        );

        let response = server
            .router()
            .oneshot(
                Request::get("/")
                    .header(X_REQUEST_ID, "fixed-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()["x-proxy-error"], "protocol-mismatch");
        assert_eq!(response.headers()[X_REQUEST_ID], "fixed-id");
    }

    #[tokio::test]
    async fn empty_registry_serves_bad_gateway() {
        let server = HttpServer::new(Arc::new(Registry::new()), Duration::from_secs(5));
        let response = server
            .router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
