//! `rover-hal` – Hardware Abstraction Layer
//!
//! Everything that touches a pin lives here.  The rest of the controller
//! only sees the traits and the drivers built on them.
//!
//! # Modules
//!
//! - [`gpio`] – [`DigitalOutput`], [`PwmOutput`] and [`PulseInput`] pin traits.
//! - [`display`] – [`TextDisplay`] trait and the best-effort
//!   [`StatusDisplay`] sink.
//! - [`distance`] – [`DistanceSensor`]: ultrasonic ping and echo timing.
//! - [`motor`] – [`MotorDriver`]: two H-bridge channels behind a single
//!   ownership lease shared by commands and the safety override.
//! - [`board`] – [`Board`]: the full peripheral set handed to the controller.
//! - [`sim`] – [`SimBoard`][sim::SimBoard]: recorded stub peripherals for
//!   tests and bench runs.

pub mod board;
pub mod display;
pub mod distance;
pub mod gpio;
pub mod motor;
pub mod sim;

pub use board::Board;
pub use display::{StatusDisplay, TextDisplay};
pub use distance::DistanceSensor;
pub use gpio::{DigitalOutput, PulseInput, PwmOutput};
pub use motor::{LeaseKind, ManeuverTiming, MotorDriver, MotorLease, MotorPins};
