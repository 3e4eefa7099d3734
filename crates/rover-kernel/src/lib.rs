//! `rover-kernel` – Safety state
//!
//! Holds the rules and the shared state that decide when the robot must stop
//! obeying commands and escape an obstacle.
//!
//! # Modules
//!
//! - [`emergency`] – [`EmergencyState`][emergency::EmergencyState]: the
//!   mutex-guarded emergency flag with atomic check-debounce-and-trigger and
//!   clear operations.
//! - [`safety_policy`] – [`SafetyPolicy`][safety_policy::SafetyPolicy]:
//!   obstacle threshold, warning level and debounce window.

pub mod emergency;
pub mod safety_policy;

pub use emergency::{EmergencySnapshot, EmergencyState};
pub use safety_policy::SafetyPolicy;
