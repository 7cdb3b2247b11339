//! Error types for tls-conduit

use std::io;
use thiserror::Error;

/// Main error type for connection operations
#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint string could not be parsed into scheme, host and port
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// TCP connection to the endpoint failed (refused, unreachable, DNS failure, timeout)
    #[error("endpoint {endpoint} unreachable: {source}")]
    EndpointUnreachable {
        /// `host:port` that was dialled
        endpoint: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Private key missing, undecodable, or the passphrase does not decrypt it
    #[error("key material error: {0}")]
    KeyMaterial(String),

    /// Certificate missing or undecodable
    #[error("certificate error: {0}")]
    Certificate(String),

    /// TLS negotiation failed
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// Byte I/O attempted while the connection is closed
    #[error("connection is not open")]
    NotOpen,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error on an open connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable snake_case label for this error, used in logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidEndpoint(_) => "invalid_endpoint",
            Error::EndpointUnreachable { .. } => "endpoint_unreachable",
            Error::KeyMaterial(_) => "key_material",
            Error::Certificate(_) => "certificate",
            Error::Handshake(_) => "handshake",
            Error::NotOpen => "not_open",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }

    /// Whether retrying the same operation later could succeed.
    ///
    /// Bad key material, certificates and endpoints never fix themselves; a refused
    /// connection or an interrupted read might.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::EndpointUnreachable { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::NotOpen => io::Error::new(io::ErrorKind::NotConnected, err),
            Error::EndpointUnreachable { source, .. } => source,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
