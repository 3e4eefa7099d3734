//! Named timing and threshold constants for the controller.
//!
//! Every field has a serde default, so a partial TOML table (or none at all)
//! yields the stock robot configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RoverError;

/// What the controller does when the command-serving loop faults on a
/// socket error.  A client closing its connection is not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Return the fault from the controller so the process exits.
    #[default]
    Terminate,
    /// Go back to listening and accept a new client.
    Restart,
}

impl std::str::FromStr for FaultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terminate" => Ok(Self::Terminate),
            "restart" => Ok(Self::Restart),
            other => Err(format!("unknown fault policy '{other}'")),
        }
    }
}

impl std::fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminate => write!(f, "terminate"),
            Self::Restart => write!(f, "restart"),
        }
    }
}

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// TCP port the command server binds on all interfaces.
    pub port: u16,
    /// Readings strictly below this distance count as an obstacle.
    pub obstacle_threshold_cm: f32,
    /// Minimum time between two escape triggers.
    pub debounce_ms: u64,
    /// Safety monitor sampling period.
    pub sample_period_ms: u64,
    /// Forward/backward maneuver duration.
    pub straight_ms: u64,
    /// Left/right maneuver duration.
    pub turn_ms: u64,
    pub escape_reverse_ms: u64,
    pub escape_pivot_ms: u64,
    /// Upper bound on the echo pulse measurement.
    pub echo_timeout_us: u64,
    /// Round-trip microseconds per centimeter divisor (speed of sound).
    pub sound_divisor: f32,
    /// Sleep between command receive attempts.
    pub receive_poll_ms: u64,
    /// Timeout of a single receive attempt.
    pub receive_timeout_ms: u64,
    pub max_read_bytes: usize,
    pub accept_timeout_ms: u64,
    pub accept_retry_ms: u64,
    /// Heartbeat LED on-time (equal to its off-time).
    pub heartbeat_half_period_ms: u64,
    pub display_power_up_ms: u64,
    pub display_retry_ms: u64,
    /// Warning PWM duty (16-bit) while an obstacle is in range.
    pub warning_duty: u16,
    pub warning_frequency_hz: u32,
    pub fault_policy: FaultPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: 9000,
            obstacle_threshold_cm: 15.0,
            debounce_ms: 3000,
            sample_period_ms: 50,
            straight_ms: 3000,
            turn_ms: 1000,
            escape_reverse_ms: 500,
            escape_pivot_ms: 2000,
            echo_timeout_us: 30_000,
            sound_divisor: 29.1,
            receive_poll_ms: 50,
            receive_timeout_ms: 100,
            max_read_bytes: 64,
            accept_timeout_ms: 1000,
            accept_retry_ms: 100,
            heartbeat_half_period_ms: 500,
            display_power_up_ms: 1500,
            display_retry_ms: 500,
            warning_duty: 30_000,
            warning_frequency_hz: 1000,
            fault_policy: FaultPolicy::Terminate,
        }
    }
}

impl ControllerConfig {
    /// Reject values the running controller cannot work with.
    ///
    /// Periods and maneuver durations must be non-zero; zero start-up
    /// delays, retry sleeps and debounce are allowed.
    pub fn validate(&self) -> Result<(), RoverError> {
        let non_zero = [
            ("sample_period_ms", self.sample_period_ms),
            ("straight_ms", self.straight_ms),
            ("turn_ms", self.turn_ms),
            ("escape_reverse_ms", self.escape_reverse_ms),
            ("escape_pivot_ms", self.escape_pivot_ms),
            ("echo_timeout_us", self.echo_timeout_us),
            ("receive_timeout_ms", self.receive_timeout_ms),
            ("accept_timeout_ms", self.accept_timeout_ms),
            ("heartbeat_half_period_ms", self.heartbeat_half_period_ms),
            ("max_read_bytes", self.max_read_bytes as u64),
            ("warning_frequency_hz", u64::from(self.warning_frequency_hz)),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(RoverError::Config(format!("{name} must be greater than zero")));
        }
        for (name, v) in [
            ("obstacle_threshold_cm", self.obstacle_threshold_cm),
            ("sound_divisor", self.sound_divisor),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(RoverError::Config(format!("{name} must be positive, got {v}")));
            }
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn straight_duration(&self) -> Duration {
        Duration::from_millis(self.straight_ms)
    }

    pub fn turn_duration(&self) -> Duration {
        Duration::from_millis(self.turn_ms)
    }

    pub fn escape_reverse(&self) -> Duration {
        Duration::from_millis(self.escape_reverse_ms)
    }

    pub fn escape_pivot(&self) -> Duration {
        Duration::from_millis(self.escape_pivot_ms)
    }

    pub fn echo_timeout(&self) -> Duration {
        Duration::from_micros(self.echo_timeout_us)
    }

    pub fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn accept_retry(&self) -> Duration {
        Duration::from_millis(self.accept_retry_ms)
    }

    pub fn heartbeat_half_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_half_period_ms)
    }

    pub fn display_power_up(&self) -> Duration {
        Duration::from_millis(self.display_power_up_ms)
    }

    pub fn display_retry(&self) -> Duration {
        Duration::from_millis(self.display_retry_ms)
    }
}
