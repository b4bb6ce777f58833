//! TLS client over an already-established socket
//!
//! The connector opens a plain socket to the relay, writes the handshake and
//! then runs the TLS handshake for the real destination over that same
//! socket. This module owns the rustls configuration for that step.

use crate::config::TlsConfig;
use anyhow::{Context, Result};
use std::io::BufReader;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

/// TLS stream type alias
pub type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Server name to verify and announce for `host`
///
/// Literal IP addresses map to an IP server name, for which rustls sends no
/// SNI extension. Everything else is announced as a DNS name.
pub fn server_name_for(host: &str) -> Result<ServerName<'static>> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(ServerName::from(ip));
    }
    ServerName::try_from(bare.to_string()).with_context(|| format!("Invalid hostname: {}", host))
}

/// TLS client used by the tunnel connector
#[derive(Clone)]
pub struct TlsClient {
    connector: TlsConnector,
}

impl std::fmt::Debug for TlsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsClient").finish_non_exhaustive()
    }
}

impl Default for TlsClient {
    /// Client trusting the platform's native roots
    fn default() -> Self {
        TlsClient::with_client_config(Arc::new(
            ClientConfig::builder()
                .with_root_certificates(native_roots())
                .with_no_client_auth(),
        ))
    }
}

impl TlsClient {
    /// Wrap an existing rustls client configuration
    pub fn with_client_config(config: Arc<ClientConfig>) -> Self {
        TlsClient {
            connector: TlsConnector::from(config),
        }
    }

    /// Build a client from configuration
    pub fn from_config(config: &TlsConfig) -> Result<Self> {
        if config.skip_verify {
            // Accepts any certificate; only meant for testing against local upstreams
            let tls_config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth();
            return Ok(TlsClient::with_client_config(Arc::new(tls_config)));
        }

        let mut root_store = native_roots();

        if let Some(ref root_path) = config.trusted_root {
            let file = std::fs::File::open(root_path)
                .with_context(|| format!("Failed to open certificate file: {}", root_path))?;
            let mut reader = BufReader::new(file);
            let certs = rustls_pemfile::certs(&mut reader)
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to parse certificates from: {}", root_path))?;
            for cert in certs {
                root_store
                    .add(cert)
                    .with_context(|| "Failed to add certificate to store")?;
            }
        }

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(TlsClient::with_client_config(Arc::new(tls_config)))
    }

    /// Run the TLS client handshake for `host` over `stream`
    pub async fn handshake(&self, stream: TcpStream, host: &str) -> Result<TlsStream> {
        let server_name = server_name_for(host)?;

        let tls_stream = self
            .connector
            .connect(server_name, stream)
            .await
            .with_context(|| format!("TLS handshake failed with {}", host))?;

        tracing::debug!("TLS session established with {}", host);

        Ok(tls_stream)
    }
}

fn native_roots() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    let native_certs = rustls_native_certs::load_native_certs();
    for error in &native_certs.errors {
        tracing::warn!("Failed to load a native certificate: {}", error);
    }
    for cert in native_certs.certs {
        root_store.add(cert).ok();
    }
    root_store
}

/// Certificate verifier that accepts all certificates (dangerous!)
#[derive(Debug)]
struct NoVerifier;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: tokio_rustls::rustls::pki_types::UnixTime,
    ) -> Result<tokio_rustls::rustls::client::danger::ServerCertVerified, tokio_rustls::rustls::Error>
    {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA384,
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA512,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA256,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA384,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA512,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}
