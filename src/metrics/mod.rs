//! Metrics and observability infrastructure.
//!
//! Events are emitted through the [`metrics`] facade; whatever recorder the
//! host process installs (Prometheus exporter, test recorder, none) receives
//! them. The crate never installs a recorder itself.

pub mod events;

/// Macro for emitting metric events (Vector-style pattern).
///
/// Calls the `InternalEvent::emit()` method on the given event, which
/// records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use floe::metrics::events::SnapshotUpdateSkipped;
///
/// emit!(SnapshotUpdateSkipped { table: "events".to_string() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

// Re-export the macro at crate root
pub use emit;
