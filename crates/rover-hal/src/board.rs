//! [`Board`] – every peripheral the controller drives, bundled so it can be
//! handed over in one piece and split among the components that own them.

use crate::display::TextDisplay;
use crate::gpio::{DigitalOutput, PulseInput, PwmOutput};
use crate::motor::MotorPins;

/// The controller's hardware.  Built by board support code or by
/// [`SimBoard`][crate::sim::SimBoard].
pub struct Board {
    pub motor: MotorPins,
    pub heartbeat_led: Box<dyn DigitalOutput>,
    /// Buzzer driven as a PWM output.
    pub warning: Box<dyn PwmOutput>,
    pub sonar_trigger: Box<dyn DigitalOutput>,
    pub sonar_echo: Box<dyn PulseInput>,
    pub display: Box<dyn TextDisplay>,
}
