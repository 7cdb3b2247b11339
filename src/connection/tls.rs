//! TLS configuration for mutually-authenticated client connections.
//!
//! [`TlsConfig`] describes how the server is trusted. The client side of the
//! handshake (certificate chain and key) comes from the connection's certificate
//! material and is combined with this configuration when the connection opens.

use crate::identity::ClientIdentity;
use crate::{Error, Result};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::Item;
use std::fs;
use std::sync::Arc;

/// Server trust configuration for TLS connections.
///
/// By default, server certificates are validated against the platform root
/// certificates, falling back to the bundled Mozilla roots when the platform
/// store is empty.
///
/// # Examples
///
/// ```ignore
/// use tls_conduit::connection::TlsConfig;
///
/// // With system root certificates (production)
/// let tls = TlsConfig::builder().build()?;
///
/// // With custom CA certificate
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/path/to/ca.pem")
///     .build()?;
///
/// // For development (danger: disables verification)
/// let tls = TlsConfig::builder()
///     .danger_accept_invalid_certs(true)
///     .build()?;
/// ```
#[derive(Clone, Default)]
pub struct TlsConfig {
    /// Path to CA certificate file (None = use system roots)
    ca_cert_path: Option<String>,
    /// Inline PEM CA certificates
    ca_cert_pem: Option<String>,
    /// Whether to accept invalid certificates (development only)
    danger_accept_invalid_certs: bool,
    /// ALPN protocols offered during the handshake
    alpn_protocols: Vec<Vec<u8>>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Check if invalid certificates are accepted (development only).
    pub fn danger_accept_invalid_certs(&self) -> bool {
        self.danger_accept_invalid_certs
    }

    /// Whether custom roots replace the platform roots.
    pub fn has_custom_roots(&self) -> bool {
        self.ca_cert_path.is_some() || self.ca_cert_pem.is_some()
    }

    /// ALPN protocols offered during the handshake
    pub fn alpn_protocols(&self) -> &[Vec<u8>] {
        &self.alpn_protocols
    }

    /// Build the rustls `ClientConfig` presenting `identity` to the server.
    ///
    /// # Errors
    ///
    /// * [`Error::Config`] if root certificates cannot be loaded
    /// * [`Error::KeyMaterial`] if rustls rejects the key (unsupported algorithm,
    ///   key does not match the certificate)
    pub fn client_config(&self, identity: ClientIdentity) -> Result<Arc<ClientConfig>> {
        let builder = if self.danger_accept_invalid_certs {
            tracing::warn!("server certificate verification is disabled");
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(danger::NoVerifier::new()))
        } else {
            ClientConfig::builder().with_root_certificates(self.root_store()?)
        };

        let (chain, key) = identity.into_parts();
        let mut config = builder
            .with_client_auth_cert(chain, key)
            .map_err(|e| Error::KeyMaterial(format!("client key rejected: {}", e)))?;
        config.alpn_protocols = self.alpn_protocols.clone();

        Ok(Arc::new(config))
    }

    /// Assemble the root store used to verify the server.
    pub fn root_store(&self) -> Result<RootCertStore> {
        let mut store = RootCertStore::empty();

        if self.has_custom_roots() {
            if let Some(ca_path) = &self.ca_cert_path {
                let data = fs::read(ca_path).map_err(|e| {
                    Error::Config(format!(
                        "Failed to read CA certificate file '{}': {}",
                        ca_path, e
                    ))
                })?;
                add_pem_roots(&mut store, &data, ca_path)?;
            }
            if let Some(pem) = &self.ca_cert_pem {
                add_pem_roots(&mut store, pem.as_bytes(), "inline PEM")?;
            }
            return Ok(store);
        }

        let result = rustls_native_certs::load_native_certs();
        for cert in result.certs {
            let _ = store.add_parsable_certificates(std::iter::once(cert));
        }

        if store.is_empty() {
            if !result.errors.is_empty() {
                tracing::debug!(
                    errors = result.errors.len(),
                    "no platform root certificates loaded"
                );
            }
            tracing::debug!("falling back to bundled webpki roots");
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        Ok(store)
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("ca_cert_pem", &self.ca_cert_pem.as_ref().map(|_| "<PEM>"))
            .field(
                "danger_accept_invalid_certs",
                &self.danger_accept_invalid_certs,
            )
            .field("alpn_protocols", &self.alpn_protocols.len())
            .finish()
    }
}

/// Builder for TLS configuration.
#[derive(Default)]
pub struct TlsConfigBuilder {
    ca_cert_path: Option<String>,
    ca_cert_pem: Option<String>,
    danger_accept_invalid_certs: bool,
    alpn_protocols: Vec<Vec<u8>>,
}

impl TlsConfigBuilder {
    /// Set the path to a custom CA certificate file (PEM format).
    ///
    /// If neither this nor [`ca_cert_pem`](Self::ca_cert_pem) is set, system root
    /// certificates are used.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Trust the CA certificates in a PEM string.
    pub fn ca_cert_pem(mut self, pem: impl Into<String>) -> Self {
        self.ca_cert_pem = Some(pem.into());
        self
    }

    /// ⚠️ **DANGER**: Accept invalid certificates (development only).
    ///
    /// **NEVER use in production.** This disables server certificate validation
    /// entirely, making the connection vulnerable to man-in-the-middle attacks.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    /// Offer an ALPN protocol (may be called repeatedly, in preference order).
    pub fn alpn_protocol(mut self, protocol: impl Into<Vec<u8>>) -> Self {
        self.alpn_protocols.push(protocol.into());
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if custom roots are combined with
    /// `danger_accept_invalid_certs`, since the roots would never be consulted.
    pub fn build(self) -> Result<TlsConfig> {
        if self.danger_accept_invalid_certs
            && (self.ca_cert_path.is_some() || self.ca_cert_pem.is_some())
        {
            return Err(Error::Config(
                "custom CA certificates conflict with danger_accept_invalid_certs".into(),
            ));
        }

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            ca_cert_pem: self.ca_cert_pem,
            danger_accept_invalid_certs: self.danger_accept_invalid_certs,
            alpn_protocols: self.alpn_protocols,
        })
    }
}

/// Add every certificate in a PEM blob to `store`.
fn add_pem_roots(store: &mut RootCertStore, data: &[u8], source: &str) -> Result<()> {
    let mut reader = std::io::Cursor::new(data);
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let (added, _) = store.add_parsable_certificates(std::iter::once(cert));
                found_certs += added;
            }
            Ok(Some(_)) => {
                // Skip non-certificate items (private keys, etc.)
            }
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(format!(
                    "Failed to parse CA certificate from '{}'",
                    source
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config(format!(
            "No valid certificates found in '{}'",
            source
        )));
    }

    Ok(())
}

/// Parse server name from hostname for TLS SNI (Server Name Indication).
///
/// Accepts DNS names (a trailing dot is dropped) and IP address literals.
///
/// # Errors
///
/// Returns [`Error::InvalidEndpoint`] if the hostname is not a valid server name.
pub fn parse_server_name(hostname: &str) -> Result<ServerName<'static>> {
    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::InvalidEndpoint(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    ServerName::try_from(hostname.to_string()).map_err(|_| {
        Error::InvalidEndpoint(format!("Invalid hostname for TLS: '{}'", hostname))
    })
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::CryptoProvider;
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};
    use std::sync::Arc;

    /// Accepts any server certificate; handshake signatures are still checked.
    #[derive(Debug)]
    pub struct NoVerifier(Arc<CryptoProvider>);

    impl NoVerifier {
        pub fn new() -> Self {
            let provider = CryptoProvider::get_default()
                .cloned()
                .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
            Self(provider)
        }
    }

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
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
        ) -> Result<HandshakeSignatureValid, Error> {
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
}
