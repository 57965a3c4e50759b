//! Serializable view of the live generation for the admin API.

use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::registry::generation::{Generation, GenerationId};
use crate::routing::RoutingObject;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub generation: GenerationId,
    pub published_at_ms: u64,
    pub fingerprint: Option<String>,
    /// Superseded generations still serving in-flight requests.
    pub draining: Vec<GenerationId>,
    /// Routing objects in definition order.
    pub objects: Vec<RoutingObjectView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingObjectView {
    pub id: String,
    pub path_prefix: String,
    pub origins: Vec<OriginView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginView {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub active_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsView {
    pub trust_all_certs: bool,
    pub provider: String,
    pub protocols: Vec<String>,
    pub cipher_suites: Vec<String>,
    /// False when no allowed protocol can be negotiated by this proxy.
    pub negotiable: bool,
}

impl RegistrySnapshot {
    pub(crate) fn capture(generation: &Generation, draining: Vec<GenerationId>) -> Self {
        let objects = generation
            .topology()
            .applications()
            .iter()
            .filter_map(|app| generation.object(&app.id))
            .map(|object| RoutingObjectView::from(object.as_ref()))
            .collect();

        Self {
            generation: generation.id(),
            published_at_ms: generation
                .published_at()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            fingerprint: generation.fingerprint().map(|f| f.to_hex()),
            draining,
            objects,
        }
    }

    pub fn object(&self, id: &str) -> Option<&RoutingObjectView> {
        self.objects.iter().find(|object| object.id == id)
    }
}

impl From<&RoutingObject> for RoutingObjectView {
    fn from(object: &RoutingObject) -> Self {
        let pool = object.pool();
        Self {
            id: object.id().to_string(),
            path_prefix: object.path_prefix().to_string(),
            origins: pool
                .endpoints()
                .iter()
                .map(|endpoint| OriginView {
                    id: endpoint.id().to_string(),
                    host: endpoint.host().to_string(),
                    port: endpoint.port(),
                    active_connections: endpoint.active_connections(),
                })
                .collect(),
            tls: pool.tls_policy().map(|policy| TlsView {
                trust_all_certs: policy.trust_all_certs,
                provider: policy.provider.to_string(),
                protocols: policy.protocols.iter().map(|p| p.as_str().to_string()).collect(),
                cipher_suites: policy.cipher_suites.clone(),
                negotiable: pool.is_negotiable(),
            }),
        }
    }
}
