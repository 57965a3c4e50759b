//! Startup orchestration.
//!
//! # Responsibilities
//! - Create the registry and the reconfiguration coordinator
//! - Try the first topology before any listener accepts traffic
//! - Start the watcher and coordinator tasks
//! - Bind the proxy and admin listeners
//!
//! # Design Decisions
//! - Bind failures are fatal; topology failures are not
//! - Subsystems initialize in order, not concurrently

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::admin::{serve_admin, AdminState};
use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::net::tls;
use crate::lifecycle::Shutdown;
use crate::registry::Registry;
use crate::reload::{document_channel, Coordinator, DefinitionSource, FileSource, ReloadReport, SourceWatcher};
use crate::routing::BuildContext;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {role} listener on {address}: {source}")]
    Bind {
        role: &'static str,
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// A running proxy.
pub struct ProxyHandle {
    registry: Arc<Registry>,
    coordinator: Arc<Coordinator>,
    proxy_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl ProxyHandle {
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn proxy_addr(&self) -> SocketAddr {
        self.proxy_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    /// Reload reports, updated at every state change.
    pub fn reports(&self) -> watch::Receiver<ReloadReport> {
        self.coordinator.reports()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Stop all listeners and tasks and wait for them to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Task ended abnormally during shutdown");
            }
        }
        tracing::info!("Shutdown complete");
    }
}

/// Start the proxy with the origins file named in `config`.
pub async fn start(config: &ProxyConfig) -> Result<ProxyHandle, StartupError> {
    let source = Arc::new(FileSource::new(config.origins.path.clone()));
    start_with_source(config, source).await
}

/// Start the proxy reading topology definitions from `source`.
pub async fn start_with_source(
    config: &ProxyConfig,
    source: Arc<dyn DefinitionSource>,
) -> Result<ProxyHandle, StartupError> {
    let registry = Arc::new(Registry::new());
    let context = BuildContext {
        connect_timeout: config.timeouts.connect(),
    };
    let coordinator = Arc::new(Coordinator::new(registry.clone(), context));
    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    if let Err(e) = tokio::task::spawn_blocking(tls::preload_native_roots).await {
        tracing::warn!(error = %e, "Native root certificate preload failed");
    }

    let mut watcher =
        SourceWatcher::new(source, config.origins.poll_interval()).monitor(config.origins.monitor);
    match watcher.poll().await {
        Some(document) => {
            if let Err(e) = coordinator.reconfigure(&document) {
                tracing::error!(error = %e, "Initial topology rejected, serving empty topology");
            }
        }
        None => tracing::warn!(source = %watcher.location(), "No initial topology available"),
    }

    let (documents_tx, documents_rx) = document_channel();
    tasks.push(tokio::spawn(coordinator.clone().run(documents_rx, shutdown.subscribe())));
    tasks.push(tokio::spawn(watcher.run(documents_tx, shutdown.subscribe())));

    let proxy_listener = bind("proxy", &config.listener.bind_address).await?;
    let proxy_addr = local_addr("proxy", &proxy_listener)?;
    let server = HttpServer::new(registry.clone(), config.timeouts.request());
    let proxy_shutdown = shutdown.subscribe();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = server.run(proxy_listener, proxy_shutdown).await {
            tracing::error!(error = %e, "Proxy listener failed");
        }
    }));

    let admin_addr = if config.admin.enabled {
        let listener = bind("admin", &config.admin.bind_address).await?;
        let addr = local_addr("admin", &listener)?;
        let state = AdminState::new(registry.clone(), coordinator.reports(), &config.admin.api_key);
        let admin_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = serve_admin(listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin listener failed");
            }
        }));
        Some(addr)
    } else {
        None
    };

    tracing::info!(
        proxy = %proxy_addr,
        admin = ?admin_addr,
        generation = %registry.current().id(),
        "Proxy started"
    );

    Ok(ProxyHandle {
        registry,
        coordinator,
        proxy_addr,
        admin_addr,
        shutdown,
        tasks,
    })
}

async fn bind(role: &'static str, address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            role,
            address: address.to_string(),
            source,
        })
}

fn local_addr(role: &'static str, listener: &TcpListener) -> Result<SocketAddr, StartupError> {
    listener.local_addr().map_err(|source| StartupError::Bind {
        role,
        address: "local address".to_string(),
        source,
    })
}
