//! Transport: blocking TCP socket wrapped in a rustls client session

use super::conn::ConnectionConfig;
use super::endpoint::Endpoint;
use crate::{Error, Result};
use bytes::BytesMut;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, ProtocolVersion, StreamOwned};
use sha2::Digest;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Instant;

/// Bytes reserved per `read_buf` call
const READ_CHUNK: usize = 8192;

/// Open a TCP connection to `endpoint`, applying socket options from `config`.
pub fn connect_tcp(endpoint: &Endpoint, config: &ConnectionConfig) -> Result<TcpStream> {
    let started = Instant::now();
    let unreachable = |source: io::Error| Error::EndpointUnreachable {
        endpoint: endpoint.authority(),
        source,
    };

    let stream = match config.connect_timeout {
        None => TcpStream::connect((endpoint.host(), endpoint.port())).map_err(unreachable)?,
        Some(timeout) => {
            let addrs = (endpoint.host(), endpoint.port())
                .to_socket_addrs()
                .map_err(unreachable)?;

            let mut last_err = None;
            let mut connected = None;
            for addr in addrs {
                match TcpStream::connect_timeout(&addr, timeout) {
                    Ok(stream) => {
                        connected = Some(stream);
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%addr, error = %e, "connect attempt failed");
                        last_err = Some(e);
                    }
                }
            }

            connected.ok_or_else(|| {
                unreachable(last_err.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
                }))
            })?
        }
    };

    stream
        .set_nodelay(config.nodelay)
        .map_err(|e| Error::Config(format!("set nodelay: {}", e)))?;
    stream
        .set_read_timeout(config.read_timeout)
        .map_err(|e| Error::Config(format!("set read timeout: {}", e)))?;
    stream
        .set_write_timeout(config.write_timeout)
        .map_err(|e| Error::Config(format!("set write timeout: {}", e)))?;

    crate::metrics::histograms::connect_duration(started.elapsed());
    tracing::debug!(peer = ?stream.peer_addr().ok(), "TCP connection established");

    Ok(stream)
}

/// TLS session exclusively owning its TCP socket
pub struct TlsSession {
    stream: StreamOwned<ClientConnection, TcpStream>,
}

impl std::fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSession")
            .field("peer", &self.stream.sock.peer_addr().ok())
            .field("protocol", &self.stream.conn.protocol_version())
            .finish()
    }
}

impl TlsSession {
    /// Run the client handshake to completion over `tcp`.
    ///
    /// On failure the socket is dropped before returning.
    pub fn handshake(
        mut tcp: TcpStream,
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
    ) -> Result<Self> {
        let started = Instant::now();
        let mut conn = ClientConnection::new(config, server_name)
            .map_err(|e| Error::Handshake(format!("session setup: {}", e)))?;

        while conn.is_handshaking() {
            conn.complete_io(&mut tcp)
                .map_err(|e| Error::Handshake(e.to_string()))?;
        }

        crate::metrics::histograms::handshake_duration(started.elapsed());
        tracing::debug!(
            protocol = ?conn.protocol_version(),
            cipher_suite = ?conn.negotiated_cipher_suite().map(|s| s.suite()),
            "TLS handshake complete"
        );

        Ok(Self {
            stream: StreamOwned::new(conn, tcp),
        })
    }

    /// Read decrypted bytes. `Ok(0)` means the peer closed the stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::debug!("peer closed the connection without close_notify");
                Ok(0)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Read into buffer
    pub fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        buf.resize(start + READ_CHUNK, 0);
        let result = self.read(&mut buf[start..]);
        let n = *result.as_ref().unwrap_or(&0);
        buf.truncate(start + n);
        result
    }

    /// Write all bytes and flush them to the socket
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        self.flush()
    }

    /// Flush pending TLS records
    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    /// Send `close_notify`, then shut the socket down.
    ///
    /// Errors are logged and otherwise ignored: the peer may already be gone.
    pub fn shutdown(&mut self) {
        self.stream.conn.send_close_notify();
        while self.stream.conn.wants_write() {
            if let Err(e) = self.stream.conn.write_tls(&mut self.stream.sock) {
                tracing::debug!(error = %e, "close_notify not delivered");
                break;
            }
        }

        if let Err(e) = self.stream.sock.shutdown(Shutdown::Both) {
            if e.kind() != io::ErrorKind::NotConnected {
                tracing::debug!(error = %e, "socket shutdown failed");
            }
        }
    }

    /// Negotiated TLS version
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.stream.conn.protocol_version()
    }

    /// Negotiated ALPN protocol
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.stream.conn.alpn_protocol()
    }

    /// SHA-256 hash of the server's DER-encoded leaf certificate.
    pub fn peer_certificate_fingerprint(&self) -> Option<Vec<u8>> {
        let certs = self.stream.conn.peer_certificates()?;
        let server_cert = certs.first()?;
        Some(sha2::Sha256::digest(server_cert.as_ref()).to_vec())
    }

    /// Local socket address
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.sock.local_addr()
    }

    /// Remote socket address
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.sock.peer_addr()
    }
}
