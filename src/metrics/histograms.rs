//! Histogram metrics

use super::labels;
use std::time::Duration;

/// Record TCP connect latency
pub fn connect_duration(elapsed: Duration) {
    metrics::histogram!(labels::CONNECT_DURATION).record(elapsed.as_secs_f64());
}

/// Record TLS handshake latency
pub fn handshake_duration(elapsed: Duration) {
    metrics::histogram!(labels::HANDSHAKE_DURATION).record(elapsed.as_secs_f64());
}
