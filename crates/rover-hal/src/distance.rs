//! HC-SR04 style ultrasonic range finder.
//!
//! A measurement is a 10 µs trigger pulse followed by timing the echo pulse.
//! The echo width is the sound round trip, so
//! `distance_cm = (width_us / 2) / sound_divisor`.

use std::time::Duration;

use rover_types::DistanceReading;
use tracing::{trace, warn};

use crate::gpio::{DigitalOutput, PulseInput};

const SETTLE_LOW: Duration = Duration::from_micros(2);
const TRIGGER_HIGH: Duration = Duration::from_micros(10);

/// Ultrasonic distance sensor.  Owned by a single sampler, so trigger/echo
/// cycles can never overlap.
pub struct DistanceSensor {
    trigger: Box<dyn DigitalOutput>,
    echo: Box<dyn PulseInput>,
    timeout: Duration,
    sound_divisor: f32,
}

impl DistanceSensor {
    pub fn new(
        trigger: Box<dyn DigitalOutput>,
        echo: Box<dyn PulseInput>,
        timeout: Duration,
        sound_divisor: f32,
    ) -> Self {
        Self {
            trigger,
            echo,
            timeout,
            sound_divisor,
        }
    }

    /// Fire one ping and convert the echo width to centimeters.
    ///
    /// Blocks the calling thread for the trigger pulse plus up to `timeout`
    /// while the echo is timed.  An echo timeout or an input fault yields
    /// [`DistanceReading::NoReading`].
    pub fn sample(&mut self) -> DistanceReading {
        if let Err(e) = self.fire_trigger() {
            warn!(error = %e, "sonar trigger failed");
            return DistanceReading::NoReading;
        }
        match self.echo.pulse_width(self.timeout) {
            Ok(Some(width)) => {
                let cm = echo_to_centimeters(width, self.sound_divisor);
                trace!(width_us = width.as_micros() as u64, distance_cm = cm, "echo");
                DistanceReading::Measured(cm)
            }
            Ok(None) => DistanceReading::NoReading,
            Err(e) => {
                warn!(error = %e, "sonar echo read failed");
                DistanceReading::NoReading
            }
        }
    }

    fn fire_trigger(&mut self) -> Result<(), rover_types::RoverError> {
        self.trigger.set_level(false)?;
        std::thread::sleep(SETTLE_LOW);
        self.trigger.set_level(true)?;
        std::thread::sleep(TRIGGER_HIGH);
        self.trigger.set_level(false)
    }
}

/// Convert an echo pulse width to a one-way distance in centimeters.
pub fn echo_to_centimeters(width: Duration, sound_divisor: f32) -> f32 {
    (width.as_micros() as f32 / 2.0) / sound_divisor
}

/// Echo width a target at `cm` would produce.  Inverse of
/// [`echo_to_centimeters`].
pub fn centimeters_to_echo(cm: f32, sound_divisor: f32) -> Duration {
    Duration::from_micros((cm * sound_divisor * 2.0).round() as u64)
}
