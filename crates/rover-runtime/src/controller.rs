//! [`Controller`] – wires a [`Board`] into the running rover.
//!
//! Startup order: bring the status display up (retrying until it answers),
//! bind the command socket, start the heartbeat and the safety monitor on
//! their own tasks, then serve clients one at a time.  What happens after a
//! socket fault is decided by the configured [`FaultPolicy`].

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use rover_hal::{Board, DistanceSensor, ManeuverTiming, MotorDriver, StatusDisplay};
use rover_kernel::EmergencyState;
use rover_types::{ControllerConfig, FaultPolicy, RoverError};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

use crate::command_server::{CommandDispatcher, CommandServer, SessionTiming};
use crate::escape::{EscapePlan, EscapeRoutine};
use crate::heartbeat::HeartbeatIndicator;
use crate::safety_monitor::SafetyMonitor;

pub struct Controller {
    config: ControllerConfig,
    board: Board,
    bind_addr: SocketAddr,
}

impl Controller {
    /// Listens on all interfaces at `config.port`.
    pub fn new(config: ControllerConfig, board: Board) -> Self {
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        Self {
            config,
            board,
            bind_addr,
        }
    }

    /// Override the listen address, e.g. `127.0.0.1:0` in tests.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Start everything and serve until a fault ends the controller.
    pub async fn run(self) -> Result<(), RoverError> {
        self.start().await?.serve().await
    }

    /// Bring the robot up without serving yet.
    pub async fn start(self) -> Result<RunningController, RoverError> {
        let Controller {
            config,
            board,
            bind_addr,
        } = self;
        config.validate()?;

        let display = StatusDisplay::new(board.display);
        display
            .init_with_retry(config.display_power_up(), config.display_retry())
            .await;

        let motors = MotorDriver::new(board.motor, ManeuverTiming::from_config(&config));
        let emergency = Arc::new(EmergencyState::new());

        let dispatcher =
            CommandDispatcher::new(motors.clone(), display.clone(), Arc::clone(&emergency));
        let server =
            CommandServer::bind(bind_addr, dispatcher, SessionTiming::from_config(&config)).await?;

        let heartbeat = tokio::spawn(
            HeartbeatIndicator::new(board.heartbeat_led, config.heartbeat_half_period()).run(),
        );

        let escape = EscapeRoutine::new(
            motors,
            display.clone(),
            Arc::clone(&emergency),
            EscapePlan::from_config(&config),
        );
        let sensor = DistanceSensor::new(
            board.sonar_trigger,
            board.sonar_echo,
            config.echo_timeout(),
            config.sound_divisor,
        );
        let monitor = tokio::spawn(
            SafetyMonitor::new(
                sensor,
                board.warning,
                Arc::clone(&emergency),
                escape,
                &config,
            )
            .run(),
        );

        info!(fault_policy = %config.fault_policy, "controller started");
        Ok(RunningController {
            server,
            display,
            emergency,
            fault_policy: config.fault_policy,
            heartbeat,
            monitor,
        })
    }
}

/// A started controller.  Dropping it stops the background tasks.
pub struct RunningController {
    server: CommandServer,
    display: StatusDisplay,
    emergency: Arc<EmergencyState>,
    fault_policy: FaultPolicy,
    heartbeat: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

impl RunningController {
    pub fn local_addr(&self) -> Result<SocketAddr, RoverError> {
        self.server.local_addr()
    }

    pub fn emergency(&self) -> Arc<EmergencyState> {
        Arc::clone(&self.emergency)
    }

    /// Accept and serve clients.
    ///
    /// A client closing its socket is not a fault: the display returns to
    /// `IDLE` and the server listens again while sensing carries on.  Under
    /// [`FaultPolicy::Terminate`] the first socket fault is returned; under
    /// [`FaultPolicy::Restart`] the server goes back to listening.  If the
    /// safety monitor ever stops, that is returned as a hardware fault
    /// regardless of policy.
    pub async fn serve(mut self) -> Result<(), RoverError> {
        loop {
            let (peer, fault) = {
                let server = &self.server;
                let session = async {
                    let (stream, peer) = server.accept_client().await;
                    (peer, server.serve(stream).await)
                };
                tokio::select! {
                    ended = session => ended,
                    outcome = &mut self.monitor => return Err(monitor_stopped(outcome)),
                }
            };
            self.settle(peer, fault)?;
        }
    }

    /// Decide what a finished session means for the controller.
    fn settle(&self, peer: SocketAddr, fault: RoverError) -> Result<(), RoverError> {
        if matches!(fault, RoverError::ClientDisconnected) {
            info!(%peer, "client left; listening again");
            self.display.show_idle();
            return Ok(());
        }
        match self.fault_policy {
            FaultPolicy::Terminate => {
                error!(%peer, error = %fault, "session fault; shutting down");
                Err(fault)
            }
            FaultPolicy::Restart => {
                error!(%peer, error = %fault, "session fault; listening again");
                self.display.show_idle();
                Ok(())
            }
        }
    }
}

impl Drop for RunningController {
    fn drop(&mut self) {
        self.heartbeat.abort();
        self.monitor.abort();
    }
}

fn monitor_stopped(outcome: Result<(), JoinError>) -> RoverError {
    let details = match outcome {
        Ok(()) => "stopped".to_string(),
        Err(e) => e.to_string(),
    };
    error!(%details, "safety monitor exited");
    RoverError::hardware("safety_monitor", details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::sim::{SimBoard, SimProbe, pins};
    use rover_types::MotorIntent;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::time::Instant;

    /// Stock behaviour with shortened delays for wall-clock tests.
    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            display_power_up_ms: 0,
            display_retry_ms: 10,
            straight_ms: 300,
            turn_ms: 150,
            escape_reverse_ms: 100,
            escape_pivot_ms: 900,
            accept_timeout_ms: 50,
            accept_retry_ms: 5,
            receive_timeout_ms: 20,
            receive_poll_ms: 5,
            ..ControllerConfig::default()
        }
    }

    async fn start(config: ControllerConfig, sim: SimBoard) -> (RunningController, SimProbe) {
        let (board, probe) = sim.build();
        let running = Controller::new(config, board)
            .with_bind_addr("127.0.0.1:0".parse().unwrap())
            .start()
            .await
            .unwrap();
        (running, probe)
    }

    async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn intents(timeline: &[(Duration, MotorIntent)]) -> Vec<MotorIntent> {
        timeline.iter().map(|(_, i)| *i).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn obstacle_on_third_sample_triggers_escape() {
        let config = ControllerConfig {
            display_power_up_ms: 0,
            ..ControllerConfig::default()
        };
        let sim = SimBoard::new().with_distances([
            Some(20.0),
            Some(20.0),
            Some(10.0),
            Some(10.0),
            Some(10.0),
        ]);
        let (running, probe) = start(config, sim).await;
        let t0 = Instant::now();
        let emergency = running.emergency();

        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(emergency.last_trigger(), Some(t0 + Duration::from_millis(100)));
        assert_eq!(
            probe.motor_timeline_since(t0),
            vec![
                (Duration::from_millis(100), MotorIntent::BACKWARD),
                (Duration::from_millis(600), MotorIntent::PIVOT),
                (Duration::from_millis(2600), MotorIntent::COAST),
            ]
        );
        assert!(!emergency.is_active());
        assert_eq!(probe.last_display().as_deref(), Some("IDLE"));
    }

    #[tokio::test(start_paused = true)]
    async fn startup_waits_for_display_power_up() {
        let sim = SimBoard::new().with_display_init_failures(2);
        let t0 = Instant::now();
        let (_running, probe) = start(ControllerConfig::default(), sim).await;
        // 1.5 s power-up plus two 0.5 s retries.
        assert_eq!(t0.elapsed(), Duration::from_millis(2500));
        assert_eq!(probe.display_lines(), ["ROVER\nIDLE"]);
    }

    #[tokio::test]
    async fn forward_command_drives_then_coasts() {
        let (running, probe) = start(fast_config(), SimBoard::new()).await;
        let addr = running.local_addr().unwrap();
        let start = Instant::now();
        let serve = tokio::spawn(running.serve());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"FORWARD").await.unwrap();
        wait_for("forward", || probe.motor_intent() == MotorIntent::FORWARD).await;
        wait_for("coast", || probe.motor_intent() == MotorIntent::COAST).await;

        let timeline = probe.motor_timeline_since(start);
        assert_eq!(
            intents(&timeline),
            [MotorIntent::FORWARD, MotorIntent::COAST]
        );
        assert!(timeline[1].0 - timeline[0].0 >= Duration::from_millis(300));
        assert_eq!(probe.last_display().as_deref(), Some("CMD:\nFORWARD"));
        serve.abort();
    }

    #[tokio::test]
    async fn left_then_stop_updates_display_twice() {
        let (running, probe) = start(fast_config(), SimBoard::new()).await;
        let addr = running.local_addr().unwrap();
        let start = Instant::now();
        let serve = tokio::spawn(running.serve());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"left\n").await.unwrap();
        client.write_all(b"stop\n").await.unwrap();
        wait_for("idle", || probe.last_display().as_deref() == Some("IDLE")).await;

        assert_eq!(
            probe.display_lines(),
            ["ROVER\nIDLE", "CONNECTED", "CMD:\nLEFT", "CMD:\nSTOP", "IDLE"]
        );
        assert_eq!(
            intents(&probe.motor_timeline_since(start)),
            [MotorIntent::LEFT, MotorIntent::COAST]
        );
        serve.abort();
    }

    #[tokio::test]
    async fn commands_ignored_until_escape_finishes() {
        let sim = SimBoard::new().with_distances([Some(10.0)]);
        let (running, probe) = start(fast_config(), sim).await;
        let addr = running.local_addr().unwrap();
        let emergency = running.emergency();
        let start = Instant::now();
        let serve = tokio::spawn(running.serve());

        wait_for("escape", || emergency.is_active()).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"LEFT").await.unwrap();
        client.write_all(b" STOP\n").await.unwrap();
        wait_for("tokens shown", || {
            probe.display_lines().contains(&"CMD:\nSTOP".to_string())
        })
        .await;
        assert!(emergency.is_active());
        let lines = probe.display_lines();
        let left = lines.iter().position(|l| l == "CMD:\nLEFT").unwrap();
        let stop = lines.iter().position(|l| l == "CMD:\nSTOP").unwrap();
        assert!(left < stop);

        wait_for("escape end", || !emergency.is_active()).await;
        wait_for("coast", || probe.motor_intent() == MotorIntent::COAST).await;
        assert_eq!(
            intents(&probe.motor_timeline_since(start)),
            [MotorIntent::BACKWARD, MotorIntent::PIVOT, MotorIntent::COAST]
        );

        client.write_all(b"FORWARD\n").await.unwrap();
        wait_for("forward", || probe.motor_intent() == MotorIntent::FORWARD).await;
        serve.abort();
    }

    #[tokio::test]
    async fn invalid_config_is_refused_at_start() {
        let config = ControllerConfig {
            sample_period_ms: 0,
            ..fast_config()
        };
        let (board, _probe) = SimBoard::new().build();
        let result = Controller::new(config, board)
            .with_bind_addr("127.0.0.1:0".parse().unwrap())
            .start()
            .await;
        assert!(matches!(result, Err(RoverError::Config(_))));
    }

    #[tokio::test]
    async fn client_hangup_keeps_sensing_and_listening() {
        let (running, probe) = start(fast_config(), SimBoard::new()).await;
        let addr = running.local_addr().unwrap();
        let serve = tokio::spawn(running.serve());

        drop(TcpStream::connect(addr).await.unwrap());
        wait_for("idle after hangup", || {
            probe.last_display().as_deref() == Some("IDLE")
        })
        .await;

        let pings = probe.pings();
        let blinks = probe.writes(pins::HEARTBEAT).len();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(probe.pings() > pings, "sonar stopped after hangup");
        assert!(probe.writes(pins::HEARTBEAT).len() > blinks);
        assert!(!serve.is_finished());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"LEFT").await.unwrap();
        wait_for("left", || probe.motor_intent() == MotorIntent::LEFT).await;
        serve.abort();
    }

    #[tokio::test]
    async fn terminate_policy_returns_socket_fault() {
        let (running, _probe) = start(fast_config(), SimBoard::new()).await;
        let peer = "127.0.0.1:4242".parse().unwrap();

        assert!(running.settle(peer, RoverError::ClientDisconnected).is_ok());
        let fault = running
            .settle(peer, RoverError::Network("connection reset".into()))
            .unwrap_err();
        assert!(matches!(fault, RoverError::Network(_)));
    }

    #[tokio::test]
    async fn restart_policy_survives_socket_fault() {
        let config = ControllerConfig {
            fault_policy: FaultPolicy::Restart,
            ..fast_config()
        };
        let (running, probe) = start(config, SimBoard::new()).await;
        let peer = "127.0.0.1:4242".parse().unwrap();

        assert!(
            running
                .settle(peer, RoverError::Network("connection reset".into()))
                .is_ok()
        );
        assert_eq!(probe.last_display().as_deref(), Some("IDLE"));
    }
}
