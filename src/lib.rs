//! tls-conduit: a blocking, mutually-authenticated TLS client connection
//!
//! A [`Connection`] is built from an endpoint URI, PEM certificate material
//! (certificate chain plus private key, optionally passphrase-protected) and a
//! passphrase. Opening it connects a TCP socket, presents the client certificate
//! during the TLS handshake and exposes the session as a plain byte stream.
//!
//! ```no_run
//! # fn example(pem: &str) -> tls_conduit::Result<()> {
//! use tls_conduit::Connection;
//!
//! Connection::open_scoped(
//!     "https://push.example.com:2195",
//!     pem,
//!     "secret",
//!     Some(|conn: &mut Connection| {
//!         conn.write(b"frame")?;
//!         let mut buf = [0u8; 6];
//!         conn.read(&mut buf)?;
//!         Ok::<_, tls_conduit::Error>(())
//!     }),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! Everything is synchronous: every call blocks the calling thread, and a
//! `Connection` is meant to be driven by a single owner.

#![warn(missing_docs)]

pub mod connection;
pub mod error;
pub mod identity;
pub mod metrics;

pub use connection::{
    Connection, ConnectionConfig, ConnectionState, Endpoint, IntoEndpoint, TlsConfig,
};
pub use error::{Error, Result};
