//! Counter metrics

use super::labels;

/// Record a successful open
pub fn connection_opened() {
    metrics::counter!(labels::CONNECTIONS_OPENED).increment(1);
}

/// Record a failed open
pub fn connection_failed(reason: &'static str) {
    metrics::counter!(labels::CONNECTIONS_FAILED, labels::REASON => reason).increment(1);
}

/// Record a close
pub fn connection_closed() {
    metrics::counter!(labels::CONNECTIONS_CLOSED).increment(1);
}

/// Record plaintext bytes written
pub fn bytes_written(n: usize) {
    metrics::counter!(labels::BYTES_WRITTEN).increment(n as u64);
}

/// Record plaintext bytes read
pub fn bytes_read(n: usize) {
    metrics::counter!(labels::BYTES_READ).increment(n as u64);
}
