//! [`EscapeRoutine`] – the fixed obstacle escape maneuver.
//!
//! Reverse, then pivot, regardless of where the obstacle was seen.  The
//! routine holds the motor override lease for the whole sequence and clears
//! the [`EmergencyState`] before giving the channels back.

use std::sync::Arc;
use std::time::Duration;

use rover_hal::{MotorDriver, StatusDisplay};
use rover_kernel::EmergencyState;
use rover_types::{ControllerConfig, MotorIntent};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Phase durations of the escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapePlan {
    pub reverse: Duration,
    pub pivot: Duration,
}

impl Default for EscapePlan {
    fn default() -> Self {
        Self {
            reverse: Duration::from_millis(500),
            pivot: Duration::from_millis(2000),
        }
    }
}

impl EscapePlan {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            reverse: config.escape_reverse(),
            pivot: config.escape_pivot(),
        }
    }
}

#[derive(Clone)]
pub struct EscapeRoutine {
    motors: MotorDriver,
    display: StatusDisplay,
    emergency: Arc<EmergencyState>,
    plan: EscapePlan,
}

impl EscapeRoutine {
    pub fn new(
        motors: MotorDriver,
        display: StatusDisplay,
        emergency: Arc<EmergencyState>,
        plan: EscapePlan,
    ) -> Self {
        Self {
            motors,
            display,
            emergency,
            plan,
        }
    }

    /// Run the escape to completion.
    ///
    /// Must only be called by whoever won
    /// [`EmergencyState::try_trigger`].  If a command maneuver is still
    /// running, the override waits for it to finish before moving.
    pub async fn execute(&self) {
        warn!("obstacle escape");
        self.display.show_escape();

        let mut lease = self.motors.acquire_override().await;
        lease.coast();
        lease.drive(MotorIntent::BACKWARD, self.plan.reverse).await;
        lease.drive(MotorIntent::PIVOT, self.plan.pivot).await;

        self.emergency.clear();
        self.display.show_idle();
        lease.release();
        info!("obstacle escape finished");
    }

    /// Run [`execute`][Self::execute] on its own task.
    pub fn spawn(&self) -> JoinHandle<()> {
        let routine = self.clone();
        tokio::spawn(async move { routine.execute().await })
    }
}
