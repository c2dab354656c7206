//! Observability features: metrics and tracing.
//!
//! - **Metrics**: counters and histograms via `metrics-rs`
//! - **Tracing**: structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `hetbuf_buffers_created` | Counter | Buffers created, labelled by `storage` |
//! | `hetbuf_buffers_released` | Counter | Buffers torn down, labelled by `storage` |
//! | `hetbuf_promotions` | Counter | Copy-on-write promotions |
//! | `hetbuf_bytes_promoted` | Counter | Bytes copied by promotions |
//! | `hetbuf_write_backs` | Counter | Write-backs, labelled by `sink` |
//! | `hetbuf_write_backs_skipped` | Counter | Write-backs to released weak targets |
//! | `hetbuf_bytes_written_back` | Counter | Bytes copied to sinks |
//! | `hetbuf_completion_wait_ns` | Histogram | Time blocked in [`SharedBuffer::release`](crate::SharedBuffer::release) |
//!
//! Nothing is exported unless the application installs a `metrics`
//! recorder.
//!
//! ## Tracing
//!
//! Buffer creation and write-back are logged at `debug`, access tracking at
//! `trace`. Teardown runs inside a `buffer_teardown` span.

mod metrics;
mod tracing_support;

pub use self::metrics::{
    init_metrics, record_buffer_created, record_buffer_released, record_completion_wait,
    record_promotion, record_write_back, record_write_back_skipped,
};
pub use self::tracing_support::{instrument_teardown, span_buffer};
