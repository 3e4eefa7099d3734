//! [`SafetyPolicy`] – the rules that turn a distance reading into a warning
//! level and an escape eligibility decision.

use std::time::Duration;

use rover_types::{ControllerConfig, DistanceReading, WarningDuty};

/// Obstacle threshold plus the debounce window between escapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyPolicy {
    /// Readings strictly below this are obstacles.
    pub threshold_cm: f32,
    /// Minimum spacing between two escape triggers.
    pub debounce: Duration,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            threshold_cm: 15.0,
            debounce: Duration::from_millis(3000),
        }
    }
}

impl SafetyPolicy {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            threshold_cm: config.obstacle_threshold_cm,
            debounce: config.debounce(),
        }
    }

    /// `true` for a measured distance under the threshold.  A missing echo is
    /// never an obstacle.
    pub fn is_obstacle(&self, reading: DistanceReading) -> bool {
        matches!(reading, DistanceReading::Measured(cm) if cm < self.threshold_cm)
    }

    /// Warning level for `reading`; depends on nothing else.
    pub fn warning(&self, reading: DistanceReading) -> WarningDuty {
        if self.is_obstacle(reading) {
            WarningDuty::On
        } else {
            WarningDuty::Off
        }
    }
}
