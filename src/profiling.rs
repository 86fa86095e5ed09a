//! Tracing setup for the `profiling` feature
//!
//! Spawn and frame execution are instrumented with `info_span!`; this
//! module only wires a subscriber so the spans go somewhere.
//!
//! ```ignore
//! #[cfg(feature = "profiling")]
//! pulse_ecs::profiling::init_profiling();
//! ```

/// Install a JSON-formatting tracing subscriber for the whole process.
///
/// Returns false when a global subscriber was already set.
pub fn init_profiling() -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .is_ok()
}
