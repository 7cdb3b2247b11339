//! Connection management
//!
//! This module handles:
//! * Endpoint parsing (scheme, host, port)
//! * Connection lifecycle (open, close, scoped use)
//! * State machine enforcement
//! * TLS configuration and the blocking TLS transport

mod conn;
mod endpoint;
mod state;
mod tls;
mod transport;

pub use conn::{Connection, ConnectionConfig, ConnectionConfigBuilder};
pub use endpoint::{Endpoint, IntoEndpoint};
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsConfig, TlsConfigBuilder};
