//! Routing object compilation.
//!
//! # Responsibilities
//! - One routing object and one origin pool per application
//! - Compile each pool's TLS policy into a connector
//!
//! # Design Decisions
//! - Never touches the registry; the result is a complete candidate
//! - Same topology in, equivalent objects out (no hidden inputs besides the context)

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::net::connector::OriginConnector;
use crate::pool::{OriginEndpoint, OriginPool};
use crate::routing::router::RoutingObject;
use crate::topology::{ApplicationSpec, TlsProvider, Topology};

/// Failure to create the resources of a candidate generation.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("application '{application}': TLS provider '{provider}' is not available")]
    UnsupportedProvider {
        application: String,
        provider: TlsProvider,
    },

    #[error("application '{application}': TLS configuration rejected: {source}")]
    Tls {
        application: String,
        #[source]
        source: rustls::Error,
    },
}

/// Settings applied to every object built, taken from the process config.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub connect_timeout: Duration,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Compile every application of `topology`.
pub fn build(topology: &Topology, context: &BuildContext) -> Result<Vec<RoutingObject>, BuildError> {
    topology
        .applications()
        .iter()
        .map(|app| build_object(app, context))
        .collect()
}

fn build_object(app: &ApplicationSpec, context: &BuildContext) -> Result<RoutingObject, BuildError> {
    if let Some(policy) = &app.tls {
        if policy.provider != TlsProvider::Builtin {
            return Err(BuildError::UnsupportedProvider {
                application: app.id.clone(),
                provider: policy.provider,
            });
        }
    }

    let connector = OriginConnector::for_policy(app.tls.as_ref(), context.connect_timeout).map_err(
        |source| BuildError::Tls {
            application: app.id.clone(),
            source,
        },
    )?;

    if !connector.is_negotiable() {
        tracing::warn!(
            application = %app.id,
            "TLS policy allows no protocol version this proxy supports; requests will fail until it changes"
        );
    }

    let endpoints = app
        .origins
        .iter()
        .map(|origin| Arc::new(OriginEndpoint::new(origin)))
        .collect();

    let pool = OriginPool::new(app.id.clone(), endpoints, connector, app.tls.clone());
    Ok(RoutingObject::new(app.id.clone(), app.path_prefix.clone(), pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{parse, DefinitionDocument};
    use std::time::SystemTime;

    fn topology(text: &str) -> Topology {
        parse(&DefinitionDocument::new(text.to_string(), SystemTime::now())).unwrap()
    }

    #[test]
    fn one_object_per_application() {
        let topology = topology(r#"
- id: appA
  path: "/"
  origins:
  - { id: "appA-01", host: "localhost:9001" }
  - { id: "appA-02", host: "localhost:9002" }
- id: appB
  path: "/b"
  origins:
  - { id: "appB-01", host: "localhost:9003" }
"#);
        let objects = build(&topology, &BuildContext::default()).unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].id(), "appA");
        assert_eq!(objects[0].pool().endpoints().len(), 2);
        assert_eq!(objects[1].path_prefix(), "/b");
        assert!(objects[1].pool().tls_policy().is_none());
    }

    #[test]
    fn builds_are_independent() {
        let topology = topology("- id: appA\n  path: /\n  origins: [{ id: o1, host: 'localhost:1' }]\n");
        let first = build(&topology, &BuildContext::default()).unwrap();
        let second = build(&topology, &BuildContext::default()).unwrap();

        let a = &first[0].pool().endpoints()[0];
        let b = &second[0].pool().endpoints()[0];
        assert!(!Arc::ptr_eq(a, b));
        assert_eq!(a.authority(), b.authority());
    }

    #[test]
    fn unsupported_provider_is_build_error() {
        let topology = topology(r#"
- id: appTls
  path: "/"
  tlsSettings: { sslProvider: OPENSSL }
  origins: [{ id: "o1", host: "localhost:1" }]
"#);
        let err = build(&topology, &BuildContext::default()).err().unwrap();
        assert!(matches!(err, BuildError::UnsupportedProvider { ref application, .. } if application == "appTls"));
    }

    #[test]
    fn legacy_protocol_policy_still_builds() {
        let topology = topology(r#"
- id: appTls
  path: "/"
  tlsSettings: { trustAllCerts: true, protocols: [TLSv1.1] }
  origins: [{ id: "o1", host: "localhost:1" }]
"#);
        let objects = build(&topology, &BuildContext::default()).unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn unusable_cipher_selection_is_build_error() {
        let topology = topology(r#"
- id: appTls
  path: "/"
  tlsSettings:
    trustAllCerts: true
    protocols: [TLSv1.2]
    cipherSuites: [TLS13_AES_128_GCM_SHA256]
  origins: [{ id: "o1", host: "localhost:1" }]
"#);
        let err = build(&topology, &BuildContext::default()).err().unwrap();
        assert!(matches!(err, BuildError::Tls { .. }));
    }
}
