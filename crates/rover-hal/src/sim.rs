//! In-process simulated board for tests and bench runs without a robot.
//!
//! [`SimBoard`] builds a [`Board`] whose every pin is a stub that records
//! writes, stamped with [`tokio::time::Instant`] so paused-clock tests can
//! assert on exact timing.  The matching [`SimProbe`] reads the record back.
//!
//! # Stub behaviour
//!
//! | Peripheral | Stub behaviour |
//! |---|---|
//! | digital outputs | Record every level written. |
//! | warning PWM | Records frequency and duty writes. |
//! | sonar echo | Replays a scripted list of distances (`None` = no echo). |
//! | display | Fails `init` a configurable number of times, then records text. |
//!
//! # Example
//!
//! ```rust
//! use rover_hal::sim::SimBoard;
//!
//! let (board, probe) = SimBoard::new()
//!     .with_distances([Some(20.0), Some(10.0)])
//!     .build();
//! assert_eq!(probe.pings(), 0);
//! # drop(board);
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rover_types::{ChannelDirection, MotorIntent, RoverError};
use tokio::time::Instant;

use crate::board::Board;
use crate::display::TextDisplay;
use crate::distance::centimeters_to_echo;
use crate::gpio::{DigitalOutput, PulseInput, PwmOutput};
use crate::motor::MotorPins;

/// Pin identifiers used by the simulated board.
pub mod pins {
    pub const LEFT_A: &str = "motor_left_a";
    pub const LEFT_B: &str = "motor_left_b";
    pub const RIGHT_A: &str = "motor_right_a";
    pub const RIGHT_B: &str = "motor_right_b";
    pub const ENABLE_LEFT: &str = "motor_enable_left";
    pub const ENABLE_RIGHT: &str = "motor_enable_right";
    pub const HEARTBEAT: &str = "heartbeat_led";
    pub const WARNING: &str = "warning_buzzer";
    pub const SONAR_TRIGGER: &str = "sonar_trigger";
    pub const SONAR_ECHO: &str = "sonar_echo";
    pub const DISPLAY: &str = "status_lcd";

    pub const MOTOR: [&str; 4] = [LEFT_A, LEFT_B, RIGHT_A, RIGHT_B];
}

/// A single recorded write.
#[derive(Debug, Clone, PartialEq)]
pub enum PinWrite {
    Level(bool),
    Duty(u16),
    Frequency(u32),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct PinEvent {
    pub at: Instant,
    pub pin: String,
    pub write: PinWrite,
}

#[derive(Default)]
struct SimState {
    events: Vec<PinEvent>,
    pings: u32,
}

type Shared = Arc<Mutex<SimState>>;

fn record(log: &Shared, pin: &str, write: PinWrite) {
    log.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .events
        .push(PinEvent {
            at: Instant::now(),
            pin: pin.to_string(),
            write,
        });
}

// ─────────────────────────────────────────────────────────────────────────────
// Stub peripherals
// ─────────────────────────────────────────────────────────────────────────────

struct SimOutput {
    id: String,
    high: bool,
    log: Shared,
}

impl DigitalOutput for SimOutput {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_level(&mut self, high: bool) -> Result<(), RoverError> {
        self.high = high;
        record(&self.log, &self.id, PinWrite::Level(high));
        Ok(())
    }

    fn level(&self) -> bool {
        self.high
    }
}

struct SimPwm {
    id: String,
    duty: u16,
    log: Shared,
}

impl PwmOutput for SimPwm {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), RoverError> {
        record(&self.log, &self.id, PinWrite::Frequency(hz));
        Ok(())
    }

    fn set_duty(&mut self, duty: u16) -> Result<(), RoverError> {
        self.duty = duty;
        record(&self.log, &self.id, PinWrite::Duty(duty));
        Ok(())
    }

    fn duty(&self) -> u16 {
        self.duty
    }
}

struct SimEcho {
    id: String,
    script: Vec<Option<f32>>,
    cursor: usize,
    repeat: bool,
    sound_divisor: f32,
    log: Shared,
}

impl PulseInput for SimEcho {
    fn id(&self) -> &str {
        &self.id
    }

    fn pulse_width(&mut self, timeout: Duration) -> Result<Option<Duration>, RoverError> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).pings += 1;
        if self.script.is_empty() {
            return Ok(None);
        }
        if self.cursor >= self.script.len() {
            if !self.repeat {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let next = self.script[self.cursor];
        self.cursor += 1;
        Ok(next
            .map(|cm| centimeters_to_echo(cm, self.sound_divisor))
            .filter(|width| *width <= timeout))
    }
}

struct SimDisplay {
    id: String,
    init_failures: u32,
    ready: bool,
    log: Shared,
}

impl TextDisplay for SimDisplay {
    fn id(&self) -> &str {
        &self.id
    }

    fn init(&mut self) -> Result<(), RoverError> {
        if self.init_failures > 0 {
            self.init_failures -= 1;
            return Err(RoverError::hardware(&self.id, "panel not responding"));
        }
        self.ready = true;
        Ok(())
    }

    fn write(&mut self, text: &str) -> Result<(), RoverError> {
        if !self.ready {
            return Err(RoverError::hardware(&self.id, "display not initialized"));
        }
        record(&self.log, &self.id, PinWrite::Text(text.to_string()));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimBoard builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for a simulated [`Board`] plus its [`SimProbe`].
#[derive(Debug, Clone)]
pub struct SimBoard {
    distances: Vec<Option<f32>>,
    repeat: bool,
    display_init_failures: u32,
    sound_divisor: f32,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self {
            distances: Vec::new(),
            repeat: false,
            display_init_failures: 0,
            sound_divisor: 29.1,
        }
    }
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the sonar: one entry per ping, `None` for no echo.  Once the
    /// script runs out every ping is a timeout.
    pub fn with_distances(mut self, distances: impl IntoIterator<Item = Option<f32>>) -> Self {
        self.distances = distances.into_iter().collect();
        self
    }

    /// Replay the sonar script forever instead of timing out at its end.
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Make the display reject `n` init attempts before coming up.
    pub fn with_display_init_failures(mut self, n: u32) -> Self {
        self.display_init_failures = n;
        self
    }

    pub fn with_sound_divisor(mut self, divisor: f32) -> Self {
        self.sound_divisor = divisor;
        self
    }

    pub fn build(self) -> (Board, SimProbe) {
        let log: Shared = Arc::default();
        let output = |id: &str| -> Box<dyn DigitalOutput> {
            Box::new(SimOutput {
                id: id.to_string(),
                high: false,
                log: Arc::clone(&log),
            })
        };

        let board = Board {
            motor: MotorPins {
                left_a: output(pins::LEFT_A),
                left_b: output(pins::LEFT_B),
                right_a: output(pins::RIGHT_A),
                right_b: output(pins::RIGHT_B),
                enable_left: output(pins::ENABLE_LEFT),
                enable_right: output(pins::ENABLE_RIGHT),
            },
            heartbeat_led: output(pins::HEARTBEAT),
            warning: Box::new(SimPwm {
                id: pins::WARNING.to_string(),
                duty: 0,
                log: Arc::clone(&log),
            }),
            sonar_trigger: output(pins::SONAR_TRIGGER),
            sonar_echo: Box::new(SimEcho {
                id: pins::SONAR_ECHO.to_string(),
                script: self.distances,
                cursor: 0,
                repeat: self.repeat,
                sound_divisor: self.sound_divisor,
                log: Arc::clone(&log),
            }),
            display: Box::new(SimDisplay {
                id: pins::DISPLAY.to_string(),
                init_failures: self.display_init_failures,
                ready: false,
                log: Arc::clone(&log),
            }),
        };

        (board, SimProbe { log })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SimProbe
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only view of everything written to a simulated board.
#[derive(Clone)]
pub struct SimProbe {
    log: Shared,
}

impl SimProbe {
    /// Writes to one pin, oldest first.
    pub fn writes(&self, pin: &str) -> Vec<(Instant, PinWrite)> {
        self.state()
            .events
            .iter()
            .filter(|e| e.pin == pin)
            .map(|e| (e.at, e.write.clone()))
            .collect()
    }

    /// Last level written to `pin` (low if never written).
    pub fn level(&self, pin: &str) -> bool {
        self.writes(pin)
            .into_iter()
            .rev()
            .find_map(|(_, w)| match w {
                PinWrite::Level(l) => Some(l),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// Last duty written to `pin` (zero if never written).
    pub fn duty(&self, pin: &str) -> u16 {
        self.writes(pin)
            .into_iter()
            .rev()
            .find_map(|(_, w)| match w {
                PinWrite::Duty(d) => Some(d),
                _ => None,
            })
            .unwrap_or(0)
    }

    pub fn frequency(&self, pin: &str) -> Option<u32> {
        self.writes(pin).into_iter().rev().find_map(|(_, w)| match w {
            PinWrite::Frequency(hz) => Some(hz),
            _ => None,
        })
    }

    /// Every text written to the display, oldest first.
    pub fn display_lines(&self) -> Vec<String> {
        self.writes(pins::DISPLAY)
            .into_iter()
            .filter_map(|(_, w)| match w {
                PinWrite::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn last_display(&self) -> Option<String> {
        self.display_lines().pop()
    }

    /// Number of sonar pings taken.
    pub fn pings(&self) -> u32 {
        self.state().pings
    }

    /// Number of writes to the four motor direction pins at or after `since`.
    pub fn motor_writes_since(&self, since: Instant) -> usize {
        self.state()
            .events
            .iter()
            .filter(|e| e.at >= since && pins::MOTOR.contains(&e.pin.as_str()))
            .count()
    }

    /// Directions currently applied to the (left, right) channels.
    pub fn channel_directions(&self) -> (ChannelDirection, ChannelDirection) {
        (
            direction(self.level(pins::LEFT_A), self.level(pins::LEFT_B)),
            direction(self.level(pins::RIGHT_A), self.level(pins::RIGHT_B)),
        )
    }

    pub fn motor_intent(&self) -> MotorIntent {
        let (left, right) = self.channel_directions();
        MotorIntent::new(left, right)
    }

    /// Channel pattern changes at or after `since`, as offsets from `since`.
    ///
    /// Writes stamped with the same instant are collapsed, so a
    /// coast-then-drive sequence issued without a pause shows up as the
    /// final pattern only.
    pub fn motor_timeline_since(&self, since: Instant) -> Vec<(Duration, MotorIntent)> {
        let state = self.state();
        let mut levels = [false; 4];
        let mut previous = MotorIntent::COAST;
        let mut timeline = Vec::new();
        let motor_events: Vec<&PinEvent> = state
            .events
            .iter()
            .filter(|e| pins::MOTOR.contains(&e.pin.as_str()))
            .collect();

        let mut i = 0;
        while i < motor_events.len() {
            let at = motor_events[i].at;
            while i < motor_events.len() && motor_events[i].at == at {
                let event = motor_events[i];
                if let (Some(slot), PinWrite::Level(l)) = (
                    pins::MOTOR.iter().position(|p| *p == event.pin),
                    &event.write,
                ) {
                    levels[slot] = *l;
                }
                i += 1;
            }
            let intent = MotorIntent::new(
                direction(levels[0], levels[1]),
                direction(levels[2], levels[3]),
            );
            if intent != previous && at >= since {
                timeline.push((at - since, intent));
            }
            previous = intent;
        }
        timeline
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Both pins high (brake) never comes out of the driver; it reads as coast.
fn direction(a: bool, b: bool) -> ChannelDirection {
    match (a, b) {
        (true, false) => ChannelDirection::Forward,
        (false, true) => ChannelDirection::Backward,
        _ => ChannelDirection::Coast,
    }
}
