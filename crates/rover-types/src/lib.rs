//! Shared vocabulary for the rover controller: drive commands, motor
//! intents, sensor readings, display messages, configuration and the global
//! error type.

pub mod config;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::{ControllerConfig, FaultPolicy};

/// A textual drive command received from the decision client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Command {
    /// Parse a raw token.  Surrounding whitespace is trimmed and the match is
    /// case-insensitive; anything else yields `None`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "FORWARD" => Some(Self::Forward),
            "BACKWARD" => Some(Self::Backward),
            "LEFT" => Some(Self::Left),
            "RIGHT" => Some(Self::Right),
            "STOP" => Some(Self::Stop),
            _ => None,
        }
    }

    /// Canonical wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "FORWARD",
            Self::Backward => "BACKWARD",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Stop => "STOP",
        }
    }

    /// Channel pattern applied while this command's maneuver runs.
    pub fn intent(&self) -> MotorIntent {
        match self {
            Self::Forward => MotorIntent::FORWARD,
            Self::Backward => MotorIntent::BACKWARD,
            Self::Left => MotorIntent::LEFT,
            Self::Right => MotorIntent::RIGHT,
            Self::Stop => MotorIntent::COAST,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a single drive channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelDirection {
    Forward,
    Backward,
    /// Both direction pins low; the motor freewheels.
    Coast,
}

impl ChannelDirection {
    /// Levels for the `(a, b)` direction pin pair of one channel.
    pub fn pin_levels(&self) -> (bool, bool) {
        match self {
            Self::Forward => (true, false),
            Self::Backward => (false, true),
            Self::Coast => (false, false),
        }
    }
}

/// Directions for the left and right drive channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotorIntent {
    pub left: ChannelDirection,
    pub right: ChannelDirection,
}

impl MotorIntent {
    pub const FORWARD: Self = Self::new(ChannelDirection::Forward, ChannelDirection::Forward);
    pub const BACKWARD: Self = Self::new(ChannelDirection::Backward, ChannelDirection::Backward);
    pub const LEFT: Self = Self::new(ChannelDirection::Backward, ChannelDirection::Forward);
    pub const RIGHT: Self = Self::new(ChannelDirection::Forward, ChannelDirection::Backward);
    /// The pivot used by the escape maneuver; same pattern as a right turn.
    pub const PIVOT: Self = Self::RIGHT;
    pub const COAST: Self = Self::new(ChannelDirection::Coast, ChannelDirection::Coast);

    pub const fn new(left: ChannelDirection, right: ChannelDirection) -> Self {
        Self { left, right }
    }

    pub fn is_coast(&self) -> bool {
        *self == Self::COAST
    }
}

/// One ultrasonic measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceReading {
    /// Distance to the nearest echo, in centimeters.
    Measured(f32),
    /// The echo did not complete within the sensor timeout.
    NoReading,
}

impl DistanceReading {
    pub fn centimeters(&self) -> Option<f32> {
        match self {
            Self::Measured(cm) => Some(*cm),
            Self::NoReading => None,
        }
    }
}

/// State of the audible obstacle warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningDuty {
    On,
    Off,
}

/// What the two-line status display is showing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMessage {
    Banner,
    Idle,
    Connected,
    Escape,
    /// A received token, shown whether or not it is a recognized command.
    Command(String),
}

impl DisplayMessage {
    /// Text written to the display; `\n` separates the two lines.
    pub fn render(&self) -> String {
        match self {
            Self::Banner => "ROVER\nIDLE".to_string(),
            Self::Idle => "IDLE".to_string(),
            Self::Connected => "CONNECTED".to_string(),
            Self::Escape => "ESCAPE".to_string(),
            Self::Command(token) => format!("CMD:\n{token}"),
        }
    }
}

/// Global error type for hardware, network and configuration failures.
#[derive(Error, Debug)]
pub enum RoverError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Network Error: {0}")]
    Network(String),

    #[error("Client disconnected")]
    ClientDisconnected,

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl RoverError {
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        Self::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }
}

impl From<std::io::Error> for RoverError {
    fn from(e: std::io::Error) -> Self {
        Self::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parse_normalizes_case_and_whitespace() {
        assert_eq!(Command::parse("forward\n"), Some(Command::Forward));
        assert_eq!(Command::parse("  Left "), Some(Command::Left));
        assert_eq!(Command::parse("STOP"), Some(Command::Stop));
        assert_eq!(Command::parse("\tbackward\r\n"), Some(Command::Backward));
        assert_eq!(Command::parse("right"), Some(Command::Right));
    }

    #[test]
    fn command_parse_rejects_unknown_tokens() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("JUMP"), None);
        assert_eq!(Command::parse("FORWARD!"), None);
        assert_eq!(Command::parse("for ward"), None);
    }

    #[test]
    fn turn_patterns_drive_channels_in_opposition() {
        assert_eq!(
            Command::Left.intent(),
            MotorIntent::new(ChannelDirection::Backward, ChannelDirection::Forward)
        );
        assert_eq!(
            Command::Right.intent(),
            MotorIntent::new(ChannelDirection::Forward, ChannelDirection::Backward)
        );
        assert!(Command::Stop.intent().is_coast());
    }

    #[test]
    fn channel_direction_pin_levels() {
        assert_eq!(ChannelDirection::Forward.pin_levels(), (true, false));
        assert_eq!(ChannelDirection::Backward.pin_levels(), (false, true));
        assert_eq!(ChannelDirection::Coast.pin_levels(), (false, false));
    }

    #[test]
    fn display_messages_render_two_line_text() {
        assert_eq!(DisplayMessage::Command("LEFT".into()).render(), "CMD:\nLEFT");
        assert_eq!(DisplayMessage::Escape.render(), "ESCAPE");
        assert_eq!(DisplayMessage::Idle.render(), "IDLE");
        assert_eq!(DisplayMessage::Connected.render(), "CONNECTED");
        assert_eq!(DisplayMessage::Banner.render().lines().count(), 2);
    }

    #[test]
    fn no_reading_has_no_distance() {
        assert_eq!(DistanceReading::NoReading.centimeters(), None);
        assert_eq!(DistanceReading::Measured(12.5).centimeters(), Some(12.5));
    }

    #[test]
    fn command_serializes_as_wire_token() {
        let json = serde_json::to_string(&Command::Backward).unwrap();
        assert_eq!(json, "\"BACKWARD\"");
    }

    #[test]
    fn rover_error_display() {
        let err = RoverError::hardware("motor_left_a", "pin not exported");
        assert!(err.to_string().contains("motor_left_a"));
        assert_eq!(RoverError::ClientDisconnected.to_string(), "Client disconnected");
    }
}
