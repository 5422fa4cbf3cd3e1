//! Client TLS profile for MySQL connections.
//!
//! Builds a verified `rustls::ClientConfig` from PEM files and applies the
//! same material to sqlx connect options.
//!
//! ```ignore
//! let profile = TlsProfile::build("certs/db_ca.pem", Some(cert), Some(key))?;
//! let opts = profile.apply(dsn.connect_options());
//! ```

use std::fs;
use std::io::{self, BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustls::client::ResolvesClientCert;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use thiserror::Error;
use tracing::debug;

use crate::config::TlsConfig;

/// TLS-related errors
#[derive(Debug, Error)]
pub enum TlsError {
    /// No CA path configured
    #[error("No trusted root certificates for TLS were provided")]
    MissingRootCa,

    /// CA file holds no usable PEM certificate
    #[error("Failed to process certificate from file {path:?}: {reason}")]
    InvalidRootCa { path: PathBuf, reason: String },

    /// Current time is after the certificate's notAfter
    #[error("Certificate provided has expired (notAfter {not_after})")]
    CertificateExpired { not_after: DateTime<Utc> },

    /// Current time is before the certificate's notBefore
    #[error("Certificate provided not valid until later date (notBefore {not_before})")]
    CertificateNotYetValid { not_before: DateTime<Utc> },

    /// Client certificate is not a decodable PEM/X.509 certificate
    #[error("Invalid certificate format: {0}")]
    InvalidCertificate(String),

    /// Client certificate given without its key
    #[error("Client certificate {0:?} has no matching private key")]
    MissingPrivateKey(PathBuf),

    #[error("Invalid private key format: {0}")]
    InvalidPrivateKey(String),

    /// File not found or unreadable
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("TLS configuration error: {0}")]
    Config(String),
}

pub type TlsResult<T> = std::result::Result<T, TlsError>;

/// Validated TLS material for the MySQL connector
#[derive(Clone)]
pub struct TlsProfile {
    client_config: Arc<ClientConfig>,
    ca_cert: PathBuf,
    identity: Option<(PathBuf, PathBuf)>,
}

impl std::fmt::Debug for TlsProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsProfile")
            .field("ca_cert", &self.ca_cert)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl TlsProfile {
    /// Build from the `[tls]` section of the database config
    pub fn from_config(config: &TlsConfig) -> TlsResult<Self> {
        config.validate()?;
        Self::build(&config.ca_cert, config.client_cert(), config.client_key())
    }

    /// Build a profile from a CA file and an optional client cert/key pair.
    ///
    /// The client certificate's validity window is checked against the
    /// current time before anything else is loaded.
    pub fn build(
        ca_cert: impl AsRef<Path>,
        cert: Option<&Path>,
        key: Option<&Path>,
    ) -> TlsResult<Self> {
        let ca_cert = ca_cert.as_ref();

        let identity = match cert {
            Some(cert_path) => {
                let cert_pem = read_file(cert_path)?;
                check_certificate_dates(&cert_pem)?;

                let key_path = key.ok_or_else(|| TlsError::MissingPrivateKey(cert_path.into()))?;
                let chain = parse_pem_certificates(&cert_pem)
                    .map_err(TlsError::InvalidCertificate)?;
                let private_key = parse_pem_private_key(&read_file(key_path)?)?;
                Some((chain, private_key, cert_path.to_path_buf(), key_path.to_path_buf()))
            }
            None => None,
        };

        if ca_cert.as_os_str().is_empty() {
            return Err(TlsError::MissingRootCa);
        }
        let roots = load_root_store(ca_cert)?;

        let builder = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Config(e.to_string()))?
        .with_root_certificates(roots);

        let (client_config, identity) = match identity {
            Some((chain, private_key, cert_path, key_path)) => {
                let config = builder
                    .with_client_auth_cert(chain, private_key)
                    .map_err(|e| TlsError::InvalidPrivateKey(e.to_string()))?;
                (config, Some((cert_path, key_path)))
            }
            None => (builder.with_no_client_auth(), None),
        };

        debug!(
            "Built TLS profile (ca: {}, client cert: {})",
            ca_cert.display(),
            identity.is_some()
        );

        Ok(Self {
            client_config: Arc::new(client_config),
            ca_cert: ca_cert.to_path_buf(),
            identity,
        })
    }

    /// Whether the verified config will present a client certificate
    pub fn has_client_identity(&self) -> bool {
        self.client_config.client_auth_cert_resolver.has_certs()
    }

    /// Require TLS with CA verification on `opts`
    pub fn apply(&self, opts: MySqlConnectOptions) -> MySqlConnectOptions {
        let opts = opts.ssl_mode(MySqlSslMode::VerifyCa).ssl_ca(&self.ca_cert);
        match &self.identity {
            Some((cert, key)) => opts.ssl_client_cert(cert).ssl_client_key(key),
            None => opts,
        }
    }
}

/// Check a PEM certificate's validity window against the current UTC time
pub fn check_certificate_dates(cert_pem: &[u8]) -> TlsResult<()> {
    check_certificate_dates_at(cert_pem, Utc::now())
}

pub fn check_certificate_dates_at(cert_pem: &[u8], now: DateTime<Utc>) -> TlsResult<()> {
    let certs = parse_pem_certificates(cert_pem).map_err(TlsError::InvalidCertificate)?;
    let (_, cert) = x509_parser::parse_x509_certificate(certs[0].as_ref())
        .map_err(|e| TlsError::InvalidCertificate(format!("Error parsing certificate {}", e)))?;

    let validity = cert.validity();
    let not_after = to_utc(validity.not_after.timestamp())?;
    if now > not_after {
        return Err(TlsError::CertificateExpired { not_after });
    }

    let not_before = to_utc(validity.not_before.timestamp())?;
    if now < not_before {
        return Err(TlsError::CertificateNotYetValid { not_before });
    }

    Ok(())
}

fn to_utc(timestamp: i64) -> TlsResult<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
        TlsError::InvalidCertificate(format!("validity timestamp {} out of range", timestamp))
    })
}

fn read_file(path: &Path) -> TlsResult<Vec<u8>> {
    fs::read(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_root_store(path: &Path) -> TlsResult<RootCertStore> {
    let data = read_file(path)?;
    let certs = parse_pem_certificates(&data).map_err(|reason| TlsError::InvalidRootCa {
        path: path.to_path_buf(),
        reason,
    })?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(TlsError::InvalidRootCa {
            path: path.to_path_buf(),
            reason: format!("none of {} certificates could be used", ignored),
        });
    }
    Ok(roots)
}

/// Parse PEM-encoded certificates; at least one is required
fn parse_pem_certificates(data: &[u8]) -> Result<Vec<CertificateDer<'static>>, String> {
    let mut reader = BufReader::new(Cursor::new(data));
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to parse PEM: {}", e))?;

    if certs.is_empty() {
        return Err("Failed to PEM decode certificate".to_string());
    }

    Ok(certs)
}

fn parse_pem_private_key(data: &[u8]) -> TlsResult<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(Cursor::new(data));

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::InvalidPrivateKey(format!("Failed to parse PEM: {}", e)))?
        .ok_or_else(|| TlsError::InvalidPrivateKey("No private key found in PEM data".to_string()))
}
