//! Two-channel H-bridge motor driver.
//!
//! Each drive channel is a pair of direction pins (`a`, `b`):
//!
//! | Direction | a | b |
//! |---|---|---|
//! | forward  | 1 | 0 |
//! | backward | 0 | 1 |
//! | coast    | 0 | 0 |
//!
//! # Ownership
//!
//! The channel pins live behind a single fair async mutex.  Every writer
//! holds a [`MotorLease`] for as long as it drives the pins: ordinary
//! commands take one with [`MotorDriver::lease`], the escape maneuver takes
//! one with [`MotorDriver::acquire_override`].  A second acquirer waits until
//! the current lease is released, so two maneuvers never interleave their
//! pin writes.  Dropping a lease releases it and coasts any channel that was
//! left driven.

use std::sync::Arc;
use std::time::Duration;

use rover_types::{Command, ControllerConfig, MotorIntent};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::gpio::DigitalOutput;

/// The six discrete outputs wired to the H-bridge.
pub struct MotorPins {
    pub left_a: Box<dyn DigitalOutput>,
    pub left_b: Box<dyn DigitalOutput>,
    pub right_a: Box<dyn DigitalOutput>,
    pub right_b: Box<dyn DigitalOutput>,
    pub enable_left: Box<dyn DigitalOutput>,
    pub enable_right: Box<dyn DigitalOutput>,
}

/// Fixed maneuver durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManeuverTiming {
    /// Forward and backward.
    pub straight: Duration,
    /// Left and right.
    pub turn: Duration,
}

impl Default for ManeuverTiming {
    fn default() -> Self {
        Self {
            straight: Duration::from_secs(3),
            turn: Duration::from_secs(1),
        }
    }
}

impl ManeuverTiming {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            straight: config.straight_duration(),
            turn: config.turn_duration(),
        }
    }

    /// How long `command` drives the channels; `Stop` is immediate.
    pub fn duration_for(&self, command: Command) -> Duration {
        match command {
            Command::Forward | Command::Backward => self.straight,
            Command::Left | Command::Right => self.turn,
            Command::Stop => Duration::ZERO,
        }
    }
}

/// Who is holding the channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseKind {
    Command,
    Override,
}

struct MotorChannels {
    pins: MotorPins,
    current: MotorIntent,
}

impl MotorChannels {
    fn apply(&mut self, intent: MotorIntent) {
        let (la, lb) = intent.left.pin_levels();
        let (ra, rb) = intent.right.pin_levels();
        for (pin, level) in [
            (&mut self.pins.left_a, la),
            (&mut self.pins.left_b, lb),
            (&mut self.pins.right_a, ra),
            (&mut self.pins.right_b, rb),
        ] {
            if let Err(e) = pin.set_level(level) {
                warn!(pin = pin.id(), error = %e, "motor pin write failed");
            }
        }
        self.current = intent;
    }
}

/// Cloneable handle to the drive channels.
#[derive(Clone)]
pub struct MotorDriver {
    channels: Arc<Mutex<MotorChannels>>,
    timing: ManeuverTiming,
}

impl MotorDriver {
    /// Take ownership of the pins, enable both bridges and coast.
    pub fn new(mut pins: MotorPins, timing: ManeuverTiming) -> Self {
        for pin in [&mut pins.enable_left, &mut pins.enable_right] {
            if let Err(e) = pin.set_level(true) {
                warn!(pin = pin.id(), error = %e, "motor enable failed");
            }
        }
        let mut channels = MotorChannels {
            pins,
            current: MotorIntent::COAST,
        };
        channels.apply(MotorIntent::COAST);
        Self {
            channels: Arc::new(Mutex::new(channels)),
            timing,
        }
    }

    /// Wait for the channels and take them for a command-driven maneuver.
    pub async fn lease(&self) -> MotorLease {
        self.acquire(LeaseKind::Command).await
    }

    /// Wait for the channels and take them for the safety override.  Any
    /// maneuver already running finishes first.
    pub async fn acquire_override(&self) -> MotorLease {
        self.acquire(LeaseKind::Override).await
    }

    /// Take the channels only if nobody holds them.
    pub fn try_lease(&self) -> Option<MotorLease> {
        let guard = Arc::clone(&self.channels).try_lock_owned().ok()?;
        Some(MotorLease {
            guard,
            kind: LeaseKind::Command,
            timing: self.timing,
        })
    }

    /// `true` while some lease is held.
    pub fn is_busy(&self) -> bool {
        self.channels.try_lock().is_err()
    }

    pub async fn forward(&self) {
        self.lease().await.execute(Command::Forward).await;
    }

    pub async fn backward(&self) {
        self.lease().await.execute(Command::Backward).await;
    }

    pub async fn left(&self) {
        self.lease().await.execute(Command::Left).await;
    }

    pub async fn right(&self) {
        self.lease().await.execute(Command::Right).await;
    }

    pub async fn stop(&self) {
        self.lease().await.coast();
    }

    async fn acquire(&self, kind: LeaseKind) -> MotorLease {
        let guard = Arc::clone(&self.channels).lock_owned().await;
        debug!(?kind, "motor lease acquired");
        MotorLease {
            guard,
            kind,
            timing: self.timing,
        }
    }
}

/// Exclusive access to the drive channels.  Released on drop.
pub struct MotorLease {
    guard: OwnedMutexGuard<MotorChannels>,
    kind: LeaseKind,
    timing: ManeuverTiming,
}

impl MotorLease {
    pub fn kind(&self) -> LeaseKind {
        self.kind
    }

    /// Drive `intent` for `duration`, then coast.
    pub async fn drive(&mut self, intent: MotorIntent, duration: Duration) {
        self.guard.apply(intent);
        tokio::time::sleep(duration).await;
        self.guard.apply(MotorIntent::COAST);
    }

    /// Run the fixed maneuver for `command`.
    pub async fn execute(&mut self, command: Command) {
        debug!(%command, kind = ?self.kind, "maneuver");
        match command {
            Command::Stop => self.coast(),
            other => {
                let duration = self.timing.duration_for(other);
                self.drive(other.intent(), duration).await;
            }
        }
    }

    /// Release both channels immediately.
    pub fn coast(&mut self) {
        self.guard.apply(MotorIntent::COAST);
    }

    /// Give the channels back.
    pub fn release(self) {}
}

impl Drop for MotorLease {
    fn drop(&mut self) {
        if !self.guard.current.is_coast() {
            warn!(kind = ?self.kind, "lease dropped mid-maneuver; coasting");
            self.guard.apply(MotorIntent::COAST);
        }
        debug!(kind = ?self.kind, "motor lease released");
    }
}
