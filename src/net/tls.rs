//! Origin TLS policy compilation.
//!
//! # Responsibilities
//! - Map policy protocol tokens onto the versions rustls can speak
//! - Restrict the cipher suite list when a policy names suites
//! - Pick the certificate verifier (system roots or trust-all)
//! - Recognize handshake failures caused by protocol/cipher disagreement

use std::io;
use std::sync::{Arc, OnceLock};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    AlertDescription, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
    SupportedProtocolVersion,
};

use crate::topology::{TlsPolicy, TlsProtocol};

/// Versions from `protocols` that this client implements.
///
/// TLSv1 and TLSv1.1 are valid policy tokens but rustls does not speak them,
/// so they contribute nothing here.
pub fn client_versions(protocols: &[TlsProtocol]) -> Vec<&'static SupportedProtocolVersion> {
    protocols
        .iter()
        .filter_map(|protocol| match protocol {
            TlsProtocol::Tls12 => Some(&rustls::version::TLS12),
            TlsProtocol::Tls13 => Some(&rustls::version::TLS13),
            TlsProtocol::Tls10 | TlsProtocol::Tls11 => None,
        })
        .collect()
}

/// Build the client configuration for a policy.
///
/// Returns `Ok(None)` when the policy allows no version this client can
/// negotiate; such a pool can never complete a handshake.
pub fn client_config(policy: &TlsPolicy) -> Result<Option<Arc<ClientConfig>>, rustls::Error> {
    let versions = client_versions(&policy.protocols);
    if versions.is_empty() {
        return Ok(None);
    }

    let provider = Arc::new(provider_for(policy));
    let builder =
        ClientConfig::builder_with_provider(provider.clone()).with_protocol_versions(&versions)?;

    let mut config = if policy.trust_all_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(TrustAllVerifier(provider)))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(native_roots())
            .with_no_client_auth()
    };
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Some(Arc::new(config)))
}

fn provider_for(policy: &TlsPolicy) -> CryptoProvider {
    let mut provider = ring::default_provider();
    if !policy.cipher_suites.is_empty() {
        provider.cipher_suites.retain(|suite| {
            let name = format!("{:?}", suite.suite());
            policy
                .cipher_suites
                .iter()
                .any(|wanted| rustls_suite_name(wanted) == name)
        });
    }
    provider
}

/// rustls names TLS 1.3 suites with a `TLS13_` prefix; IANA names them
/// `TLS_AES_*` and `TLS_CHACHA20_*`.
fn rustls_suite_name(name: &str) -> &str {
    match name {
        "TLS_AES_128_GCM_SHA256" => "TLS13_AES_128_GCM_SHA256",
        "TLS_AES_256_GCM_SHA384" => "TLS13_AES_256_GCM_SHA384",
        "TLS_CHACHA20_POLY1305_SHA256" => "TLS13_CHACHA20_POLY1305_SHA256",
        other => other,
    }
}

/// Load the system trust store now instead of on the first verifying
/// policy. Blocking; call from `spawn_blocking`.
pub fn preload_native_roots() {
    native_roots();
}

fn native_roots() -> Arc<RootCertStore> {
    static ROOTS: OnceLock<Arc<RootCertStore>> = OnceLock::new();
    ROOTS
        .get_or_init(|| {
            let loaded = rustls_native_certs::load_native_certs();
            for error in &loaded.errors {
                tracing::warn!(error = %error, "Failed to load native root certificates");
            }
            let mut store = RootCertStore::empty();
            let (added, ignored) = store.add_parsable_certificates(loaded.certs);
            tracing::debug!(added, ignored, "Native root certificates loaded");
            Arc::new(store)
        })
        .clone()
}

/// True if a TLS handshake error means the two sides share no protocol
/// version or cipher suite.
pub fn is_protocol_mismatch(error: &io::Error) -> bool {
    let Some(tls) = error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    else {
        return false;
    };

    matches!(
        tls,
        rustls::Error::PeerIncompatible(_)
            | rustls::Error::AlertReceived(
                AlertDescription::ProtocolVersion
                    | AlertDescription::HandshakeFailure
                    | AlertDescription::InsufficientSecurity
            )
    )
}

/// Accepts any origin certificate; signatures are still checked so the
/// handshake itself stays sound.
#[derive(Debug)]
struct TrustAllVerifier(Arc<CryptoProvider>);

impl ServerCertVerifier for TrustAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TlsProvider;

    fn policy(protocols: Vec<TlsProtocol>, cipher_suites: Vec<&str>) -> TlsPolicy {
        TlsPolicy {
            trust_all_certs: true,
            provider: TlsProvider::Builtin,
            protocols,
            cipher_suites: cipher_suites.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn legacy_only_policy_has_no_client_config() {
        let config = client_config(&policy(vec![TlsProtocol::Tls11], vec![])).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn versions_restricted_to_policy() {
        let versions: Vec<_> = client_versions(&[TlsProtocol::Tls12, TlsProtocol::Tls11])
            .into_iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(versions, vec![rustls::ProtocolVersion::TLSv1_2]);

        let config = client_config(&policy(vec![TlsProtocol::Tls12], vec![])).unwrap();
        assert!(config.is_some());
    }

    #[test]
    fn iana_tls13_suite_names_select_rustls_suites() {
        let provider = provider_for(&policy(
            vec![TlsProtocol::Tls13],
            vec!["TLS_AES_128_GCM_SHA256", "TLS_CHACHA20_POLY1305_SHA256"],
        ));
        let names: Vec<_> = provider
            .cipher_suites
            .iter()
            .map(|suite| format!("{:?}", suite.suite()))
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"TLS13_AES_128_GCM_SHA256".to_string()));
        assert!(names.contains(&"TLS13_CHACHA20_POLY1305_SHA256".to_string()));

        let config = client_config(&policy(vec![TlsProtocol::Tls13], vec!["TLS_AES_256_GCM_SHA384"]));
        assert!(config.unwrap().is_some());
    }

    #[test]
    fn cipher_restriction_without_usable_suite_fails() {
        let result = client_config(&policy(
            vec![TlsProtocol::Tls12],
            vec!["TLS13_AES_128_GCM_SHA256"],
        ));
        assert!(result.is_err());
    }

    #[test]
    fn mismatch_classification() {
        let alert = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::AlertReceived(AlertDescription::ProtocolVersion),
        );
        assert!(is_protocol_mismatch(&alert));

        let cert = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::AlertReceived(AlertDescription::BadCertificate),
        );
        assert!(!is_protocol_mismatch(&cert));

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(!is_protocol_mismatch(&reset));
    }
}
