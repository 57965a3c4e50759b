//! Validated topology types.
//!
//! Values in this module only exist after `parser::parse` accepted a
//! document, so the invariants listed on each type always hold.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Cipher suite names accepted in `tlsSettings.cipherSuites`.
pub const KNOWN_CIPHER_SUITES: &[&str] = &[
    "TLS13_AES_256_GCM_SHA384",
    "TLS13_AES_128_GCM_SHA256",
    "TLS13_CHACHA20_POLY1305_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_AES_128_GCM_SHA256",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
];

/// A complete, validated set of applications from one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Topology {
    applications: Vec<ApplicationSpec>,
}

impl Topology {
    pub(crate) fn new(applications: Vec<ApplicationSpec>) -> Self {
        Self { applications }
    }

    /// Applications in document order.
    pub fn applications(&self) -> &[ApplicationSpec] {
        &self.applications
    }

    pub fn application(&self, id: &str) -> Option<&ApplicationSpec> {
        self.applications.iter().find(|app| app.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }
}

/// One application: a path prefix routed to an ordered set of origins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub id: String,
    pub path_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsPolicy>,
    pub origins: Vec<OriginSpec>,
}

/// A single origin server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginSpec {
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl OriginSpec {
    /// `host:port`, with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// TLS policy applied to every origin of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsPolicy {
    pub trust_all_certs: bool,
    pub provider: TlsProvider,
    /// Never empty; deduplicated, in document order.
    pub protocols: Vec<TlsProtocol>,
    /// Empty means the provider's defaults.
    pub cipher_suites: Vec<String>,
}

/// TLS protocol versions a policy may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TlsProtocol {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsProtocol::Tls10 => "TLSv1",
            TlsProtocol::Tls11 => "TLSv1.1",
            TlsProtocol::Tls12 => "TLSv1.2",
            TlsProtocol::Tls13 => "TLSv1.3",
        }
    }

    /// Versions used when a policy does not list any.
    pub fn defaults() -> Vec<TlsProtocol> {
        vec![TlsProtocol::Tls12, TlsProtocol::Tls13]
    }
}

impl FromStr for TlsProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TLSv1" | "TLSv1.0" => Ok(TlsProtocol::Tls10),
            "TLSv1.1" => Ok(TlsProtocol::Tls11),
            "TLSv1.2" => Ok(TlsProtocol::Tls12),
            "TLSv1.3" => Ok(TlsProtocol::Tls13),
            other => Err(format!("unknown TLS protocol '{}'", other)),
        }
    }
}

impl fmt::Display for TlsProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TlsProtocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// TLS implementation requested by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsProvider {
    /// The in-process rustls implementation (`JDK`, `DEFAULT` and `RUSTLS` all select it).
    Builtin,
    /// Accepted by the parser but not available in this build.
    OpenSsl,
}

impl FromStr for TlsProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JDK" | "DEFAULT" | "RUSTLS" => Ok(TlsProvider::Builtin),
            "OPENSSL" => Ok(TlsProvider::OpenSsl),
            _ => Err(format!("unknown TLS provider '{}'", s)),
        }
    }
}

impl fmt::Display for TlsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsProvider::Builtin => f.write_str("builtin"),
            TlsProvider::OpenSsl => f.write_str("openssl"),
        }
    }
}
