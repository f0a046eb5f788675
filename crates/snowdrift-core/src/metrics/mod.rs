//! Metrics and observability infrastructure.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus recorder and HTTP endpoint

pub mod events;
pub mod server;

pub use server::{MetricsController, init_global, init_test};

/// Emit an internal event as a metric.
///
/// ```ignore
/// use snowdrift_core::emit;
/// use snowdrift_core::metrics::events::FilesDiscovered;
///
/// emit!(FilesDiscovered { count: 3 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
