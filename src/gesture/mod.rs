//! Swipe detection inside the inspected page.
//!
//! `detector` is the Rust model of the in-page state machine (used by the
//! simulated page); `script` renders the JavaScript that runs in a real one.

mod detector;
pub mod script;

pub use detector::{
    Swipe, SwipeDetector, SwipeTracker, TouchPoint, TrackerState, DEFAULT_MIN_SWIPE_DISTANCE,
};
pub use script::{
    clear_expression, drain_expression, drained_expression, injection_script, location_expression,
    ScriptKind, BUFFER_GLOBAL, DRAINED_GLOBAL, GUARD_GLOBAL,
};
