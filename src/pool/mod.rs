//! Origin pool subsystem.
//!
//! # Data Flow
//! ```text
//! RoutingObject resolved for a request
//!     → mod.rs OriginPool::select (round_robin.rs rotation)
//!     → net::connector (TLS per pool policy)
//!     → endpoint.rs lease held for the connection's lifetime
//! ```
//!
//! # Design Decisions
//! - A pool belongs to exactly one routing object of one generation
//! - Pools are never reconfigured in place; a new generation builds new pools
//! - Connection counts are the only state that changes after build

pub mod endpoint;
pub mod round_robin;

use std::sync::Arc;

use crate::net::connector::{Connection, ConnectError, OriginConnector};
use crate::topology::TlsPolicy;

pub use endpoint::{OriginEndpoint, OriginLease};
pub use round_robin::RoundRobin;

/// Compiled origins and TLS policy of one application.
#[derive(Debug)]
pub struct OriginPool {
    application: String,
    endpoints: Vec<Arc<OriginEndpoint>>,
    rotation: RoundRobin,
    connector: OriginConnector,
    tls: Option<TlsPolicy>,
}

impl OriginPool {
    pub fn new(
        application: impl Into<String>,
        endpoints: Vec<Arc<OriginEndpoint>>,
        connector: OriginConnector,
        tls: Option<TlsPolicy>,
    ) -> Self {
        Self {
            application: application.into(),
            endpoints,
            rotation: RoundRobin::new(),
            connector,
            tls,
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn endpoints(&self) -> &[Arc<OriginEndpoint>] {
        &self.endpoints
    }

    pub fn tls_policy(&self) -> Option<&TlsPolicy> {
        self.tls.as_ref()
    }

    /// False when the TLS policy admits no version this proxy can speak.
    pub fn is_negotiable(&self) -> bool {
        self.connector.is_negotiable()
    }

    /// Pick the next origin to try.
    pub fn select(&self) -> Option<Arc<OriginEndpoint>> {
        let selected = self.rotation.next(&self.endpoints);
        if selected.is_none() {
            tracing::debug!(application = %self.application, "Origin pool is empty");
        }
        selected
    }

    /// Open a connection to `endpoint` under this pool's TLS policy.
    pub async fn connect(&self, endpoint: &Arc<OriginEndpoint>) -> Result<Connection, ConnectError> {
        self.connector.connect(endpoint).await
    }
}
