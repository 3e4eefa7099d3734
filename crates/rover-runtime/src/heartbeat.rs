//! [`HeartbeatIndicator`] – blinks an LED so a glance tells whether the
//! controller is alive.

use std::time::Duration;

use rover_hal::DigitalOutput;
use tracing::warn;

pub struct HeartbeatIndicator {
    led: Box<dyn DigitalOutput>,
    half_period: Duration,
}

impl HeartbeatIndicator {
    pub fn new(led: Box<dyn DigitalOutput>, half_period: Duration) -> Self {
        Self { led, half_period }
    }

    /// Flip the LED and return the new level.
    pub fn toggle(&mut self) -> bool {
        let next = !self.led.level();
        if let Err(e) = self.led.set_level(next) {
            warn!(pin = self.led.id(), error = %e, "heartbeat write failed");
        }
        next
    }

    /// Toggle every half period, forever.  Owns nothing shared, so it never
    /// contends with the other tasks.
    pub async fn run(mut self) {
        loop {
            self.toggle();
            tokio::time::sleep(self.half_period).await;
        }
    }
}
