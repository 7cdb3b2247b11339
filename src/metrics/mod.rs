//! Metrics for connection lifecycle and byte I/O
//!
//! Recorded through the `metrics` facade; install any recorder (Prometheus, statsd, ...)
//! in the application to export them. Without a recorder every call is a no-op.

pub mod counters;
pub mod histograms;
pub mod labels;
