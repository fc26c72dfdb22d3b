//! Metrics emission for pipelines.
//!
//! Events are plain structs implementing `InternalEvent`; the `emit!` macro
//! records them through the `metrics` facade, so they reach whichever
//! recorder the host application installed (or nowhere if none is).

pub mod events;

/// Emit an internal event.
///
/// ```ignore
/// use conveyor::emit;
/// use conveyor::metrics::events::JobDispatched;
///
/// emit!(JobDispatched { pipeline: "resize".to_string() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
