//! Origin connections.
//!
//! # Responsibilities
//! - Dial an origin with the pool's connect timeout
//! - Run the TLS handshake when the pool has a TLS policy
//! - Hand back an HTTP/1.1 sender bound to that one connection
//! - Report protocol/cipher disagreement as `ProtocolMismatch`
//!
//! # Design Decisions
//! - One connection per request; no pooling across requests, so a new
//!   generation never reuses a connection negotiated under an old policy
//! - The connection task holds the origin lease until the exchange ends

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::net::tls;
use crate::pool::OriginEndpoint;
use crate::topology::{TlsPolicy, TlsProtocol};

/// Failure to open a connection to an origin.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("timed out connecting to origin {origin} after {timeout:?}")]
    Timeout { origin: String, timeout: Duration },

    #[error("origin {origin} unreachable: {source}")]
    Unreachable {
        origin: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS protocol mismatch with origin {origin} (allowed: {allowed}): {detail}")]
    ProtocolMismatch {
        origin: String,
        allowed: String,
        detail: String,
    },

    #[error("TLS handshake with origin {origin} failed: {source}")]
    Tls {
        origin: String,
        #[source]
        source: io::Error,
    },

    #[error("origin host {0} is not a valid TLS server name")]
    InvalidServerName(String),

    #[error("HTTP handshake with origin {origin} failed: {source}")]
    Handshake {
        origin: String,
        #[source]
        source: hyper::Error,
    },
}

impl ConnectError {
    /// Short label for metrics and response headers.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectError::Timeout { .. } => "timeout",
            ConnectError::Unreachable { .. } => "unreachable",
            ConnectError::ProtocolMismatch { .. } => "protocol-mismatch",
            ConnectError::Tls { .. } => "tls",
            ConnectError::InvalidServerName(_) => "invalid-server-name",
            ConnectError::Handshake { .. } => "handshake",
        }
    }

    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(self, ConnectError::ProtocolMismatch { .. })
    }
}

/// Byte stream to an origin, plain or TLS.
trait OriginIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> OriginIo for T {}

#[derive(Clone)]
enum TlsMode {
    Plain,
    Tls {
        connector: TlsConnector,
        protocols: Vec<TlsProtocol>,
    },
    /// The policy allows only versions this client cannot speak.
    Unnegotiable { protocols: Vec<TlsProtocol> },
}

impl std::fmt::Debug for TlsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsMode::Plain => f.write_str("Plain"),
            TlsMode::Tls { protocols, .. } => f.debug_struct("Tls").field("protocols", protocols).finish(),
            TlsMode::Unnegotiable { protocols } => {
                f.debug_struct("Unnegotiable").field("protocols", protocols).finish()
            }
        }
    }
}

/// Opens connections for one origin pool.
#[derive(Debug, Clone)]
pub struct OriginConnector {
    tls: TlsMode,
    connect_timeout: Duration,
}

impl OriginConnector {
    /// Connector for origins without TLS.
    pub fn plain(connect_timeout: Duration) -> Self {
        Self {
            tls: TlsMode::Plain,
            connect_timeout,
        }
    }

    /// Connector honoring `policy`, plain when there is none.
    pub fn for_policy(policy: Option<&TlsPolicy>, connect_timeout: Duration) -> Result<Self, rustls::Error> {
        let Some(policy) = policy else {
            return Ok(Self::plain(connect_timeout));
        };

        let protocols = policy.protocols.clone();
        let tls = match tls::client_config(policy)? {
            Some(config) => TlsMode::Tls {
                connector: TlsConnector::from(config),
                protocols,
            },
            None => TlsMode::Unnegotiable { protocols },
        };

        Ok(Self {
            tls,
            connect_timeout,
        })
    }

    /// False when every connection attempt will end in `ProtocolMismatch`.
    pub fn is_negotiable(&self) -> bool {
        !matches!(self.tls, TlsMode::Unnegotiable { .. })
    }

    /// Open a connection to `endpoint`.
    pub async fn connect(&self, endpoint: &Arc<OriginEndpoint>) -> Result<Connection, ConnectError> {
        if let TlsMode::Unnegotiable { protocols } = &self.tls {
            return Err(ConnectError::ProtocolMismatch {
                origin: endpoint.id().to_string(),
                allowed: join(protocols),
                detail: "no allowed protocol version is supported by this client".to_string(),
            });
        }

        tokio::time::timeout(self.connect_timeout, self.establish(endpoint))
            .await
            .map_err(|_| ConnectError::Timeout {
                origin: endpoint.id().to_string(),
                timeout: self.connect_timeout,
            })?
    }

    async fn establish(&self, endpoint: &Arc<OriginEndpoint>) -> Result<Connection, ConnectError> {
        let origin = endpoint.id().to_string();
        let tcp = TcpStream::connect((endpoint.host(), endpoint.port()))
            .await
            .map_err(|source| ConnectError::Unreachable {
                origin: origin.clone(),
                source,
            })?;
        let _ = tcp.set_nodelay(true);

        let io: Box<dyn OriginIo> = match &self.tls {
            TlsMode::Plain => Box::new(tcp),
            TlsMode::Tls { connector, protocols } => {
                let server_name = ServerName::try_from(endpoint.host().to_string())
                    .map_err(|_| ConnectError::InvalidServerName(endpoint.host().to_string()))?;
                let stream = connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(|source| handshake_error(&origin, protocols, source))?;
                Box::new(stream)
            }
            TlsMode::Unnegotiable { protocols } => {
                return Err(ConnectError::ProtocolMismatch {
                    origin,
                    allowed: join(protocols),
                    detail: "no allowed protocol version is supported by this client".to_string(),
                });
            }
        };

        let (sender, connection) = http1::handshake::<_, Body>(TokioIo::new(io))
            .await
            .map_err(|source| ConnectError::Handshake {
                origin: origin.clone(),
                source,
            })?;

        let lease = endpoint.lease();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(origin = %lease.id(), error = %e, "Origin connection closed with error");
            }
            drop(lease);
        });

        tracing::trace!(origin = %origin, tls = self.is_tls(), "Origin connection established");
        Ok(Connection {
            sender,
            origin: endpoint.clone(),
        })
    }

    fn is_tls(&self) -> bool {
        matches!(self.tls, TlsMode::Tls { .. })
    }
}

fn handshake_error(origin: &str, protocols: &[TlsProtocol], source: io::Error) -> ConnectError {
    if tls::is_protocol_mismatch(&source) {
        ConnectError::ProtocolMismatch {
            origin: origin.to_string(),
            allowed: join(protocols),
            detail: source.to_string(),
        }
    } else {
        ConnectError::Tls {
            origin: origin.to_string(),
            source,
        }
    }
}

fn join(protocols: &[TlsProtocol]) -> String {
    protocols
        .iter()
        .map(TlsProtocol::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// An open HTTP/1.1 connection to one origin, good for a single exchange.
pub struct Connection {
    sender: http1::SendRequest<Body>,
    origin: Arc<OriginEndpoint>,
}

impl Connection {
    pub fn origin(&self) -> &Arc<OriginEndpoint> {
        &self.origin
    }

    /// Send `request` and wait for the response head.
    pub async fn send(mut self, request: Request<Body>) -> Result<Response<Incoming>, hyper::Error> {
        self.sender.send_request(request).await
    }
}
