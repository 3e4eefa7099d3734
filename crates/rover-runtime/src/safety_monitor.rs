//! [`SafetyMonitor`] – the periodic distance check.
//!
//! Every sample period the monitor pings the sonar, sets the warning buzzer
//! from that one reading, and, when the reading is an obstacle and the
//! [`EmergencyState`] accepts the trigger, starts the [`EscapeRoutine`] on
//! its own task.  Sampling never waits for the escape, so the buzzer keeps
//! tracking the distance while the robot backs away.

use std::sync::Arc;
use std::time::Duration;

use rover_hal::{DistanceSensor, PwmOutput};
use rover_kernel::{EmergencyState, SafetyPolicy};
use rover_types::{ControllerConfig, DistanceReading, WarningDuty};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::escape::EscapeRoutine;

/// Outcome of one sampling cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub reading: DistanceReading,
    pub warning: WarningDuty,
    /// `true` when this cycle started an escape.
    pub triggered: bool,
}

pub struct SafetyMonitor {
    sensor: DistanceSensor,
    warning: Box<dyn PwmOutput>,
    warning_duty: u16,
    policy: SafetyPolicy,
    period: Duration,
    emergency: Arc<EmergencyState>,
    escape: EscapeRoutine,
    in_flight: Option<JoinHandle<()>>,
}

impl SafetyMonitor {
    /// Sets the buzzer carrier frequency and silences it.
    pub fn new(
        sensor: DistanceSensor,
        mut warning: Box<dyn PwmOutput>,
        emergency: Arc<EmergencyState>,
        escape: EscapeRoutine,
        config: &ControllerConfig,
    ) -> Self {
        if let Err(e) = warning.set_frequency(config.warning_frequency_hz) {
            warn!(pin = warning.id(), error = %e, "buzzer frequency not applied");
        }
        if let Err(e) = warning.set_duty(0) {
            warn!(pin = warning.id(), error = %e, "buzzer duty not applied");
        }
        Self {
            sensor,
            warning,
            warning_duty: config.warning_duty,
            policy: SafetyPolicy::from_config(config),
            period: config.sample_period(),
            emergency,
            escape,
            in_flight: None,
        }
    }

    /// `true` while a spawned escape has not finished.
    pub fn escape_in_flight(&self) -> bool {
        self.in_flight.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// One sample: ping, update the buzzer, maybe start an escape.
    ///
    /// The ping blocks the worker for the echo timeout at most.
    pub async fn step(&mut self) -> CycleReport {
        self.reap_escape().await;

        let reading = self.sensor.sample();
        let warning = self.policy.warning(reading);
        self.apply_warning(warning);

        let triggered = self.policy.is_obstacle(reading)
            && self.emergency.try_trigger(Instant::now(), self.policy.debounce);
        if triggered {
            info!(distance_cm = reading.centimeters(), "obstacle detected; escaping");
            self.in_flight = Some(self.escape.spawn());
        }

        CycleReport {
            reading,
            warning,
            triggered,
        }
    }

    /// Sample every period, forever.
    pub async fn run(mut self) {
        info!(
            period_ms = self.period.as_millis() as u64,
            threshold_cm = self.policy.threshold_cm,
            "safety monitor started"
        );
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.step().await;
        }
    }

    /// Wait for the current escape, if any, to finish.
    pub async fn finish_escape(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            self.supervise(handle.await);
        }
    }

    async fn reap_escape(&mut self) {
        if self.in_flight.as_ref().is_some_and(JoinHandle::is_finished) {
            self.finish_escape().await;
        }
    }

    fn supervise(&self, outcome: Result<(), tokio::task::JoinError>) {
        if let Err(e) = outcome {
            // The lease coasted the motors while unwinding; only the flag is left.
            error!(error = %e, "escape task failed; clearing emergency");
            self.emergency.clear();
        }
    }

    fn apply_warning(&mut self, warning: WarningDuty) {
        let duty = match warning {
            WarningDuty::On => self.warning_duty,
            WarningDuty::Off => 0,
        };
        if let Err(e) = self.warning.set_duty(duty) {
            warn!(pin = self.warning.id(), error = %e, "buzzer duty not applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escape::EscapePlan;
    use rover_hal::sim::{PinWrite, SimBoard, SimProbe, pins};
    use rover_hal::{ManeuverTiming, MotorDriver, StatusDisplay};

    async fn monitor(sim: SimBoard) -> (SafetyMonitor, Arc<EmergencyState>, SimProbe) {
        let config = ControllerConfig::default();
        let (board, probe) = sim.build();
        let display = StatusDisplay::new(board.display);
        display.init_with_retry(Duration::ZERO, Duration::ZERO).await;
        let motors = MotorDriver::new(board.motor, ManeuverTiming::from_config(&config));
        let emergency = Arc::new(EmergencyState::new());
        let escape = EscapeRoutine::new(
            motors,
            display,
            Arc::clone(&emergency),
            EscapePlan::from_config(&config),
        );
        let sensor = DistanceSensor::new(
            board.sonar_trigger,
            board.sonar_echo,
            config.echo_timeout(),
            config.sound_divisor,
        );
        let monitor = SafetyMonitor::new(
            sensor,
            board.warning,
            Arc::clone(&emergency),
            escape,
            &config,
        );
        (monitor, emergency, probe)
    }

    #[tokio::test(start_paused = true)]
    async fn buzzer_configured_and_silent_at_start() {
        let (_monitor, _emergency, probe) = monitor(SimBoard::new()).await;
        assert_eq!(probe.frequency(pins::WARNING), Some(1000));
        assert_eq!(probe.duty(pins::WARNING), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn warning_tracks_each_reading() {
        let sim = SimBoard::new().with_distances([Some(20.0), Some(10.0), None, Some(200.0)]);
        let (mut monitor, _emergency, probe) = monitor(sim).await;

        let mut duties = Vec::new();
        for _ in 0..4 {
            monitor.step().await;
            duties.push(probe.duty(pins::WARNING));
        }
        assert_eq!(duties, [0, 30000, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_echo_is_not_an_obstacle() {
        let (mut monitor, emergency, _probe) = monitor(SimBoard::new()).await;
        let report = monitor.step().await;
        assert_eq!(report.reading, DistanceReading::NoReading);
        assert_eq!(report.warning, WarningDuty::Off);
        assert!(!report.triggered);
        assert!(!emergency.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_obstacle_respects_active_flag_and_debounce() {
        let sim = SimBoard::new().with_distances([Some(10.0)]).repeating();
        let (mut monitor, emergency, _probe) = monitor(sim).await;
        let t0 = Instant::now();

        assert!(monitor.step().await.triggered);
        assert!(monitor.escape_in_flight());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = monitor.step().await;
        assert!(!report.triggered);
        assert_eq!(report.warning, WarningDuty::On);

        tokio::time::sleep_until(t0 + Duration::from_millis(2600)).await;
        assert!(!emergency.is_active());
        assert!(!monitor.step().await.triggered);
        assert!(!monitor.escape_in_flight());

        tokio::time::sleep_until(t0 + Duration::from_secs(3)).await;
        assert!(monitor.step().await.triggered);
        assert_eq!(emergency.last_trigger(), Some(t0 + Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn buzzer_keeps_sampling_during_escape() {
        let sim = SimBoard::new().with_distances([Some(10.0), Some(40.0), Some(8.0)]);
        let (mut monitor, emergency, probe) = monitor(sim).await;
        monitor.step().await;
        for _ in 0..2 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            monitor.step().await;
        }
        assert!(emergency.is_active());
        let duties: Vec<_> = probe
            .writes(pins::WARNING)
            .into_iter()
            .filter_map(|(_, w)| match w {
                PinWrite::Duty(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(duties, [0, 30000, 0, 30000]);
        monitor.finish_escape().await;
        assert!(!emergency.is_active());
    }
}
