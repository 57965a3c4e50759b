//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use topology_proxy::config::ProxyConfig;
use topology_proxy::registry::GenerationId;
use topology_proxy::reload::ReloadReport;

/// Start a plain HTTP origin that answers every request with `body`.
pub async fn start_mock_origin(body: &'static str) -> SocketAddr {
    start_slow_origin(body, Duration::ZERO).await
}

/// Plain HTTP origin that waits `delay` before answering.
pub async fn start_slow_origin(body: &'static str, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = respond(socket, body, delay).await;
            });
        }
    });

    addr
}

/// TLS origin that only speaks TLSv1.2, with a self-signed certificate
/// for `localhost`.
pub async fn start_tls12_origin(body: &'static str) -> SocketAddr {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = CertificateDer::from(certified.cert.der().to_vec());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS12])
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(stream) = acceptor.accept(socket).await {
                    let _ = respond(stream, body, Duration::ZERO).await;
                }
            });
        }
    });

    addr
}

async fn respond<S>(mut socket: S, body: &str, delay: Duration) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Read the request head so the client never sees a reset mid-write.
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// Replace `path` atomically so the watcher never reads a half-written file.
pub fn write_origins(path: &Path, content: &str) {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content).unwrap();
    std::fs::rename(&tmp, path).unwrap();
}

/// Proxy config on ephemeral ports with a fast poll interval.
pub fn test_config(origins: &Path) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.admin.bind_address = "127.0.0.1:0".to_string();
    config.origins.path = origins.to_path_buf();
    config.origins.poll_interval_ms = 20;
    config.timeouts.connect_secs = 2;
    config.timeouts.request_secs = 5;
    config
}

/// Wait until the coordinator has finished `cycles` reload cycles.
pub async fn wait_for_cycles(reports: &mut watch::Receiver<ReloadReport>, cycles: u64) -> ReloadReport {
    tokio::time::timeout(Duration::from_secs(5), reports.wait_for(|r| r.cycles >= cycles))
        .await
        .expect("reload cycle did not complete")
        .expect("coordinator stopped")
        .clone()
}

pub fn generation(n: u64) -> GenerationId {
    GenerationId::new(n)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
