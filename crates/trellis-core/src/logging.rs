//! Logging facilities for the observation core.
//!
//! Trellis uses the `tracing` crate for instrumentation. The library never
//! installs a subscriber; applications do:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("trellis_core::record=trace")
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core target.
    pub const CORE: &str = "trellis_core";
    /// Property observers and observable objects.
    pub const OBSERVER: &str = "trellis_core::observer";
    /// Observable collections.
    pub const COLLECTION: &str = "trellis_core::collection";
    /// Notification batching.
    pub const BATCH: &str = "trellis_core::batch";
    /// Binding observer records.
    pub const RECORD: &str = "trellis_core::record";
    /// Connectable bindings.
    pub const BINDING: &str = "trellis_core::binding";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Useful for tracking the duration of an operation.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "trellis::perf", "perf", operation = name);
        Self {
            _span: span.entered(),
        }
    }
}
