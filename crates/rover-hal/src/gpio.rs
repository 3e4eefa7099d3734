//! Pin-level hardware traits: discrete outputs, PWM outputs and pulse-timed
//! inputs.
//!
//! Board support code implements these traits; everything above the HAL
//! talks only to the traits, so the simulated backend in [`crate::sim`] can
//! stand in for real pins in tests.

use std::time::Duration;

use rover_types::RoverError;

/// A discrete digital output (direction pin, enable pin, LED, trigger).
pub trait DigitalOutput: Send + Sync {
    /// Stable identifier for this pin, e.g. `"motor_left_a"`.
    fn id(&self) -> &str;

    /// Drive the pin high (`true`) or low (`false`).
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareFault`] if the level cannot be applied.
    fn set_level(&mut self, high: bool) -> Result<(), RoverError>;

    /// Return the most recently applied level.
    fn level(&self) -> bool;
}

/// A PWM output with a 16-bit duty cycle.
pub trait PwmOutput: Send + Sync {
    fn id(&self) -> &str;

    /// Set the carrier frequency in hertz.
    fn set_frequency(&mut self, hz: u32) -> Result<(), RoverError>;

    /// Set the duty cycle, `0` (off) to `u16::MAX` (always on).
    fn set_duty(&mut self, duty: u16) -> Result<(), RoverError>;

    fn duty(&self) -> u16;
}

/// A digital input that can time the width of a high pulse.
pub trait PulseInput: Send + Sync {
    fn id(&self) -> &str;

    /// Wait for the next high pulse and return its width.
    ///
    /// Returns `Ok(None)` when the pulse does not start and finish within
    /// `timeout`.
    fn pulse_width(&mut self, timeout: Duration) -> Result<Option<Duration>, RoverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockPin {
        id: String,
        high: bool,
    }

    impl DigitalOutput for MockPin {
        fn id(&self) -> &str {
            &self.id
        }

        fn set_level(&mut self, high: bool) -> Result<(), RoverError> {
            self.high = high;
            Ok(())
        }

        fn level(&self) -> bool {
            self.high
        }
    }

    #[test]
    fn mock_pin_toggle() {
        let mut pin = MockPin {
            id: "led".to_string(),
            high: false,
        };
        assert_eq!(pin.id(), "led");
        pin.set_level(true).unwrap();
        assert!(pin.level());
        pin.set_level(false).unwrap();
        assert!(!pin.level());
    }
}
