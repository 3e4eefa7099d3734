//! `rover-runtime` – The running controller
//!
//! The concurrent activities of the rover, each on its own Tokio task, and
//! the [`Controller`] that starts them.
//!
//! # Modules
//!
//! - [`command_server`] – [`CommandServer`][command_server::CommandServer]:
//!   single-client TCP session that displays and dispatches command tokens.
//! - [`safety_monitor`] – [`SafetyMonitor`][safety_monitor::SafetyMonitor]:
//!   samples the sonar every period, drives the buzzer and triggers escapes.
//! - [`escape`] – [`EscapeRoutine`][escape::EscapeRoutine]: the reverse and
//!   pivot maneuver run under the motor override lease.
//! - [`heartbeat`] – [`HeartbeatIndicator`][heartbeat::HeartbeatIndicator]:
//!   liveness LED.
//! - [`controller`] – [`Controller`][controller::Controller]: startup order
//!   and fault policy.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.
//!
//! # Motor ownership
//!
//! Commands and escapes both drive the motors through
//! [`MotorDriver`][rover_hal::MotorDriver] leases.  The escape never cancels
//! a running command maneuver; it queues behind it.  Commands received
//! while the emergency flag is set are dropped, and so is a command that
//! was already waiting for the lease when the escape was triggered.

pub mod command_server;
pub mod controller;
pub mod escape;
pub mod heartbeat;
pub mod safety_monitor;
pub mod telemetry;

pub use command_server::{CommandDispatcher, CommandServer, DispatchOutcome, SessionTiming};
pub use controller::{Controller, RunningController};
pub use escape::{EscapePlan, EscapeRoutine};
pub use heartbeat::HeartbeatIndicator;
pub use safety_monitor::{CycleReport, SafetyMonitor};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing, init_tracing_with};
