//! Metrics collection using metrics-rs.

use crate::memory::StorageKind;
use metrics::{Unit, counter, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const BUFFERS_CREATED: &str = "hetbuf_buffers_created";
const BUFFERS_RELEASED: &str = "hetbuf_buffers_released";
const PROMOTIONS: &str = "hetbuf_promotions";
const BYTES_PROMOTED: &str = "hetbuf_bytes_promoted";
const WRITE_BACKS: &str = "hetbuf_write_backs";
const WRITE_BACKS_SKIPPED: &str = "hetbuf_write_backs_skipped";
const BYTES_WRITTEN_BACK: &str = "hetbuf_bytes_written_back";
const COMPLETION_WAIT_NS: &str = "hetbuf_completion_wait_ns";

/// Initialize metrics descriptions.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUFFERS_CREATED,
        Unit::Count,
        "Buffers created, by storage kind"
    );
    metrics::describe_counter!(
        BUFFERS_RELEASED,
        Unit::Count,
        "Buffers torn down, by storage kind at teardown"
    );
    metrics::describe_counter!(
        PROMOTIONS,
        Unit::Count,
        "Copy-on-write promotions of read-only host memory"
    );
    metrics::describe_counter!(
        BYTES_PROMOTED,
        Unit::Bytes,
        "Bytes copied by copy-on-write promotions"
    );
    metrics::describe_counter!(WRITE_BACKS, Unit::Count, "Write-backs performed, by sink");
    metrics::describe_counter!(
        WRITE_BACKS_SKIPPED,
        Unit::Count,
        "Write-backs skipped because the weak target was released"
    );
    metrics::describe_counter!(
        BYTES_WRITTEN_BACK,
        Unit::Bytes,
        "Bytes copied to write-back sinks"
    );
    metrics::describe_histogram!(
        COMPLETION_WAIT_NS,
        Unit::Nanoseconds,
        "Time spent waiting for another holder to tear a buffer down"
    );
}

/// Record a buffer created over `kind` storage.
#[inline]
pub fn record_buffer_created(kind: StorageKind) {
    counter!(BUFFERS_CREATED, "storage" => kind.as_str()).increment(1);
}

/// Record a buffer torn down while holding `kind` storage.
#[inline]
pub fn record_buffer_released(kind: StorageKind) {
    counter!(BUFFERS_RELEASED, "storage" => kind.as_str()).increment(1);
}

/// Record a copy-on-write promotion of `bytes` bytes.
#[inline]
pub fn record_promotion(bytes: usize) {
    counter!(PROMOTIONS).increment(1);
    counter!(BYTES_PROMOTED).increment(bytes as u64);
}

/// Record `bytes` bytes written back to a `sink` destination.
#[inline]
pub fn record_write_back(sink: &'static str, bytes: usize) {
    counter!(WRITE_BACKS, "sink" => sink).increment(1);
    counter!(BYTES_WRITTEN_BACK, "sink" => sink).increment(bytes as u64);
}

/// Record a write-back skipped because its target was gone.
#[inline]
pub fn record_write_back_skipped(sink: &'static str) {
    counter!(WRITE_BACKS_SKIPPED, "sink" => sink).increment(1);
}

/// Record time spent waiting on a completion signal.
#[inline]
pub fn record_completion_wait(duration: Duration) {
    histogram!(COMPLETION_WAIT_NS).record(duration.as_nanos() as f64);
}
