//! Origin endpoint descriptors.
//!
//! # Responsibilities
//! - Represent a single origin server of one pool
//! - Track connections currently open to it (visible in introspection)

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::topology::OriginSpec;

/// A single origin server.
#[derive(Debug)]
pub struct OriginEndpoint {
    id: String,
    host: String,
    port: u16,
    /// Pre-rendered `host:port` for Host headers and logs.
    authority: String,
    /// Number of currently open connections.
    active_connections: AtomicUsize,
}

impl OriginEndpoint {
    pub fn new(spec: &OriginSpec) -> Self {
        Self {
            id: spec.id.clone(),
            host: spec.host.clone(),
            port: spec.port,
            authority: spec.authority(),
            active_connections: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Get the current number of open connections.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Count a connection for as long as the returned lease lives.
    pub fn lease(self: &Arc<Self>) -> OriginLease {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        OriginLease {
            endpoint: self.clone(),
        }
    }
}

/// A RAII guard that manages the open connection count.
#[derive(Debug)]
pub struct OriginLease {
    endpoint: Arc<OriginEndpoint>,
}

impl Deref for OriginLease {
    type Target = OriginEndpoint;
    fn deref(&self) -> &Self::Target {
        &self.endpoint
    }
}

impl Drop for OriginLease {
    fn drop(&mut self) {
        self.endpoint.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
