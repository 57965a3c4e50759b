//! Read-only admin API.
//!
//! # Endpoints
//! - `GET /admin/status`: version, live generation, reload report
//! - `GET /admin/routing/objects`: snapshot of the live routing objects

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};

use crate::registry::Registry;
use crate::reload::ReloadReport;

use self::auth::admin_auth_middleware;
use self::handlers::{get_routing_objects, get_status};

/// Shared state of the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<Registry>,
    pub reports: watch::Receiver<ReloadReport>,
    /// Required bearer token; `None` leaves the API open.
    pub api_key: Option<Arc<str>>,
}

impl AdminState {
    pub fn new(registry: Arc<Registry>, reports: watch::Receiver<ReloadReport>, api_key: &str) -> Self {
        Self {
            registry,
            reports,
            api_key: (!api_key.is_empty()).then(|| Arc::from(api_key)),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routing/objects", get(get_routing_objects))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API on `listener` until shutdown is signalled.
pub async fn serve_admin(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin listener started");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!(address = %addr, "Admin listener stopped");
    Ok(())
}
