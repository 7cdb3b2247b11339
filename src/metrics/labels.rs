//! Metric names and label keys

/// Connections that completed the TLS handshake
pub const CONNECTIONS_OPENED: &str = "tls_conduit_connections_opened_total";
/// Failed `open()` calls, labelled by [`REASON`]
pub const CONNECTIONS_FAILED: &str = "tls_conduit_connections_failed_total";
/// Connections torn down by `close()` or drop
pub const CONNECTIONS_CLOSED: &str = "tls_conduit_connections_closed_total";
/// Plaintext bytes written
pub const BYTES_WRITTEN: &str = "tls_conduit_bytes_written_total";
/// Plaintext bytes read
pub const BYTES_READ: &str = "tls_conduit_bytes_read_total";
/// TCP connect latency
pub const CONNECT_DURATION: &str = "tls_conduit_connect_duration_seconds";
/// TLS handshake latency
pub const HANDSHAKE_DURATION: &str = "tls_conduit_handshake_duration_seconds";

/// Failure reason label key; values come from `Error::category()`
pub const REASON: &str = "reason";
