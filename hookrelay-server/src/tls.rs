//! TLS for the external listener.

use crate::error::{Result, ServerError};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// TLS configuration for the HTTPS listener
#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub server_config: Arc<ServerConfig>,
}

impl TlsConfig {
    /// Load a PEM certificate chain and private key.
    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let certs = parse_certs(&mut open(cert_path.as_ref())?)?;
        let key = parse_private_key(&mut open(key_path.as_ref())?)?;
        Self::from_parts(certs, key)
    }

    /// Same as [`TlsConfig::from_pem_files`] from in-memory PEM.
    pub fn from_pem_bytes(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certs = parse_certs(&mut &cert_pem[..])?;
        let key = parse_private_key(&mut &key_pem[..])?;
        Self::from_parts(certs, key)
    }

    fn from_parts(certs: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Result<Self> {
        if certs.is_empty() {
            return Err(ServerError::Tls("No certificates found".to_string()));
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ServerError::Tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::Tls(format!("Failed to create TLS config: {}", e)))?;

        // Websocket upgrades need HTTP/1.1
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            server_config: Arc::new(config),
        })
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.server_config.clone())
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ServerError::Tls(format!("Failed to open {}: {}", path.display(), e)))
}

fn parse_certs(reader: &mut dyn BufRead) -> Result<Vec<CertificateDer<'static>>> {
    certs(reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("Failed to parse certificates: {}", e)))
}

fn parse_private_key(reader: &mut dyn BufRead) -> Result<PrivateKeyDer<'static>> {
    private_key(reader)
        .map_err(|e| ServerError::Tls(format!("Failed to read private key: {}", e)))?
        .ok_or_else(|| ServerError::Tls("No private key found".to_string()))
}
