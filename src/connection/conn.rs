//! Core connection type

use super::endpoint::{Endpoint, IntoEndpoint};
use super::state::{ConnectionState, Lifecycle};
use super::tls::{parse_server_name, TlsConfig};
use super::transport::{self, TlsSession};
use crate::identity::ClientIdentity;
use crate::{Error, Result};
use bytes::BytesMut;
use rustls::ProtocolVersion;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Connection configuration
///
/// Holds the key passphrase plus socket and TLS options. Timeouts default to
/// `None`, leaving the operating system defaults in place.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Passphrase decrypting the private key (default: empty)
    pub passphrase: String,
    /// TCP connection timeout, per resolved address
    pub connect_timeout: Option<Duration>,
    /// Socket read timeout (also bounds each handshake read)
    pub read_timeout: Option<Duration>,
    /// Socket write timeout
    pub write_timeout: Option<Duration>,
    /// Disable Nagle's algorithm so each write goes out immediately (default: true)
    pub nodelay: bool,
    /// Server trust configuration
    pub tls: TlsConfig,
}

impl ConnectionConfig {
    /// Create configuration with the given passphrase and defaults elsewhere
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
            ..Self::default()
        }
    }

    /// Create a builder for advanced configuration
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ConnectionConfig::builder()
    ///     .passphrase("secret")
    ///     .connect_timeout(Duration::from_secs(10))
    ///     .build();
    /// ```
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: Self::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            passphrase: String::new(),
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            nodelay: true,
            tls: TlsConfig::default(),
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("passphrase", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("nodelay", &self.nodelay)
            .field("tls", &self.tls)
            .finish()
    }
}

/// Builder for creating `ConnectionConfig`
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Set the private key passphrase
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.config.passphrase = passphrase.into();
        self
    }

    /// Set TCP connection timeout
    ///
    /// Default: None (OS default)
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.config.connect_timeout = Some(duration);
        self
    }

    /// Set socket read timeout
    ///
    /// Default: None (block indefinitely)
    pub fn read_timeout(mut self, duration: Duration) -> Self {
        self.config.read_timeout = Some(duration);
        self
    }

    /// Set socket write timeout
    ///
    /// Default: None (block indefinitely)
    pub fn write_timeout(mut self, duration: Duration) -> Self {
        self.config.write_timeout = Some(duration);
        self
    }

    /// Enable or disable `TCP_NODELAY`
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Set server trust configuration
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = tls;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

/// Mutually-authenticated TLS connection over TCP
///
/// Starts closed. [`open`](Self::open) connects the socket, loads the client
/// identity and completes the handshake; [`close`](Self::close) tears both down.
/// Both are no-ops when the connection is already in the target state.
///
/// # Examples
///
/// ```no_run
/// # fn example(pem: &str) -> tls_conduit::Result<()> {
/// use tls_conduit::Connection;
///
/// let mut conn = Connection::new("https://push.example.com:2195", pem, "secret")?;
/// conn.open()?;
/// conn.write(b"payload")?;
/// conn.close();
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    endpoint: Endpoint,
    certificate: String,
    config: ConnectionConfig,
    lifecycle: Lifecycle,
}

impl Connection {
    /// Create a closed connection. No network or cryptographic work happens here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if `endpoint` is not a URI with a host and port.
    pub fn new(
        endpoint: impl IntoEndpoint,
        certificate: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Result<Self> {
        Self::with_config(endpoint, certificate, ConnectionConfig::new(passphrase))
    }

    /// Create a closed connection with explicit configuration
    pub fn with_config(
        endpoint: impl IntoEndpoint,
        certificate: impl Into<String>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into_endpoint()?,
            certificate: certificate.into(),
            config,
            lifecycle: Lifecycle::Closed,
        })
    }

    /// Open a connection, run `block` with it, then close it.
    ///
    /// The connection is closed on every exit path, including an error returned by
    /// `block` or a panic unwinding through it. When `block` is `None` nothing is
    /// constructed or connected and `Ok(None)` is returned.
    pub fn open_scoped<F, T, E>(
        endpoint: impl IntoEndpoint,
        certificate: impl Into<String>,
        passphrase: impl Into<String>,
        block: Option<F>,
    ) -> std::result::Result<Option<T>, E>
    where
        F: FnOnce(&mut Connection) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        Self::open_scoped_with_config(
            endpoint,
            certificate,
            ConnectionConfig::new(passphrase),
            block,
        )
    }

    /// [`open_scoped`](Self::open_scoped) with explicit configuration
    pub fn open_scoped_with_config<F, T, E>(
        endpoint: impl IntoEndpoint,
        certificate: impl Into<String>,
        config: ConnectionConfig,
        block: Option<F>,
    ) -> std::result::Result<Option<T>, E>
    where
        F: FnOnce(&mut Connection) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let Some(block) = block else {
            return Ok(None);
        };

        let mut connection = Self::with_config(endpoint, certificate, config)?;
        connection.open()?;

        // Dropping `connection` during a panic closes it as well
        let result = block(&mut connection);
        connection.close();

        result.map(Some)
    }

    /// Connect, load the client identity and complete the TLS handshake.
    ///
    /// Returns `Ok(true)` when the connection was opened and `Ok(false)` when it
    /// was already open (nothing is touched in that case).
    ///
    /// # Errors
    ///
    /// * [`Error::KeyMaterial`] - key missing, undecodable, or wrong passphrase
    /// * [`Error::Certificate`] - certificate missing or undecodable
    /// * [`Error::EndpointUnreachable`] - TCP connect failed
    /// * [`Error::Handshake`] - TLS negotiation failed
    ///
    /// On error the connection stays closed and no socket is left behind.
    pub fn open(&mut self) -> Result<bool> {
        if !self.state().can_transition_to(ConnectionState::Open) {
            return Ok(false);
        }

        let span = tracing::info_span!(
            "open",
            scheme = %self.endpoint.scheme(),
            host = %self.endpoint.host(),
            port = self.endpoint.port()
        );

        span.in_scope(|| match self.establish() {
            Ok(session) => {
                self.lifecycle = Lifecycle::Open(Box::new(session));
                crate::metrics::counters::connection_opened();
                tracing::info!("TLS connection established");
                Ok(true)
            }
            Err(e) => {
                crate::metrics::counters::connection_failed(e.category());
                tracing::debug!(error = %e, "open failed");
                Err(e)
            }
        })
    }

    fn establish(&self) -> Result<TlsSession> {
        // Identity first: bad key material never reaches the network
        let identity = ClientIdentity::from_pem(&self.certificate, &self.config.passphrase)?;
        let client_config = self.config.tls.client_config(identity)?;
        let server_name = parse_server_name(self.endpoint.host())?;

        let tcp = transport::connect_tcp(&self.endpoint, &self.config)?;
        TlsSession::handshake(tcp, client_config, server_name)
    }

    /// Shut down the TLS session, then the socket.
    ///
    /// Returns `false` if the connection was already closed. Teardown errors
    /// (peer already gone, reset) are logged and ignored; the connection always
    /// ends up closed.
    pub fn close(&mut self) -> bool {
        let Some(mut session) = self.lifecycle.take() else {
            return false;
        };

        session.shutdown();
        drop(session);

        crate::metrics::counters::connection_closed();
        tracing::debug!(endpoint = %self.endpoint, "connection closed");
        true
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// Whether the socket and TLS session are live
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Negation of [`is_open`](Self::is_open)
    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Read decrypted bytes, blocking until at least one is available.
    ///
    /// Returns `Ok(0)` once the peer has closed the stream, and right away for an
    /// empty `buf`.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] if the connection is closed.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let session = self.lifecycle.session_mut()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let n = session.read(buf)?;
        crate::metrics::counters::bytes_read(n);
        Ok(n)
    }

    /// Append decrypted bytes to `buf`, returning how many were added.
    pub fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let n = self.lifecycle.session_mut()?.read_buf(buf)?;
        crate::metrics::counters::bytes_read(n);
        Ok(n)
    }

    /// Write all of `buf` and flush it to the socket before returning.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] if the connection is closed.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.lifecycle.session_mut()?.write_all(buf)?;
        crate::metrics::counters::bytes_written(buf.len());
        Ok(buf.len())
    }

    /// Parsed endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Endpoint scheme
    pub fn scheme(&self) -> &str {
        self.endpoint.scheme()
    }

    /// Endpoint host
    pub fn host(&self) -> &str {
        self.endpoint.host()
    }

    /// Endpoint port
    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    /// Raw certificate material
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// Private key passphrase
    pub fn passphrase(&self) -> &str {
        &self.config.passphrase
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Negotiated TLS version, while open
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.lifecycle.session()?.protocol_version()
    }

    /// Negotiated ALPN protocol, while open
    pub fn alpn_protocol(&self) -> Option<Vec<u8>> {
        self.lifecycle.session()?.alpn_protocol().map(<[u8]>::to_vec)
    }

    /// SHA-256 of the server's leaf certificate, while open
    pub fn peer_certificate_fingerprint(&self) -> Option<Vec<u8>> {
        self.lifecycle.session()?.peer_certificate_fingerprint()
    }

    /// Local socket address, while open
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.session()?.local_addr().ok()
    }

    /// Remote socket address, while open
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.session()?.peer_addr().ok()
    }
}

impl io::Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Connection::read(self, buf).map_err(Into::into)
    }
}

impl io::Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Connection::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lifecycle.session_mut()?.flush().map_err(Into::into)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("certificate", &"<PEM>")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
