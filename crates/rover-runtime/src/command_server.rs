//! [`CommandServer`] – remote control over a single TCP session.
//!
//! One client at a time.  Bytes are read in chunks of at most
//! `max_read_bytes`; each chunk is split on whitespace and every token is
//! shown on the status display, then dispatched if it names a [`Command`].
//! Nothing is ever written back to the client.
//!
//! Dispatch is refused while the [`EmergencyState`] is active.  The flag is
//! checked again after the motor lease is granted, because an escape may
//! have started while the command was queued behind another maneuver.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rover_hal::{MotorDriver, StatusDisplay};
use rover_kernel::EmergencyState;
use rover_types::{Command, ControllerConfig, RoverError};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// What happened to one received token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The maneuver ran to completion.
    Executed(Command),
    /// Dropped because an escape was in progress.
    Suppressed(Command),
    /// Not a command word; display only.
    Unrecognized(String),
}

/// Turns tokens into display updates and maneuvers.
#[derive(Clone)]
pub struct CommandDispatcher {
    motors: MotorDriver,
    display: StatusDisplay,
    emergency: Arc<EmergencyState>,
}

impl CommandDispatcher {
    pub fn new(motors: MotorDriver, display: StatusDisplay, emergency: Arc<EmergencyState>) -> Self {
        Self {
            motors,
            display,
            emergency,
        }
    }

    /// Handle one received chunk, token by token, in order.  A chunk of
    /// only whitespace still shows an empty command line.
    pub async fn handle_payload(&self, payload: &[u8]) -> Vec<DispatchOutcome> {
        let text = String::from_utf8_lossy(payload);
        let mut outcomes = Vec::new();
        for raw in text.split_whitespace() {
            outcomes.push(self.handle_token(raw).await);
        }
        if outcomes.is_empty() {
            outcomes.push(self.handle_token("").await);
        }
        outcomes
    }

    /// Normalize, display and dispatch a single token.
    pub async fn handle_token(&self, raw: &str) -> DispatchOutcome {
        let token = raw.trim().to_uppercase();
        self.display.show_command(&token);
        match Command::parse(&token) {
            Some(command) => self.dispatch(command).await,
            None => {
                debug!(%token, "ignoring unknown token");
                DispatchOutcome::Unrecognized(token)
            }
        }
    }

    /// Run `command` unless an escape is in progress.  Returns once the
    /// maneuver is over.
    pub async fn dispatch(&self, command: Command) -> DispatchOutcome {
        if self.emergency.is_active() {
            info!(%command, "command suppressed during escape");
            return DispatchOutcome::Suppressed(command);
        }
        let mut lease = self.motors.lease().await;
        if self.emergency.is_active() {
            info!(%command, "command suppressed during escape");
            return DispatchOutcome::Suppressed(command);
        }
        info!(%command, "executing command");
        lease.execute(command).await;
        drop(lease);
        if command == Command::Stop {
            self.display.show_idle();
        }
        DispatchOutcome::Executed(command)
    }
}

/// Socket timing for a [`CommandServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub accept_timeout: Duration,
    pub accept_retry: Duration,
    pub receive_timeout: Duration,
    pub receive_poll: Duration,
    pub max_read_bytes: usize,
}

impl SessionTiming {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            accept_timeout: config.accept_timeout(),
            accept_retry: config.accept_retry(),
            receive_timeout: config.receive_timeout(),
            receive_poll: config.receive_poll(),
            max_read_bytes: config.max_read_bytes.max(1),
        }
    }
}

pub struct CommandServer {
    listener: TcpListener,
    dispatcher: CommandDispatcher,
    timing: SessionTiming,
}

impl CommandServer {
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: CommandDispatcher,
        timing: SessionTiming,
    ) -> Result<Self, RoverError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RoverError::Network(format!("bind {addr}: {e}")))?;
        let server = Self {
            listener,
            dispatcher,
            timing,
        };
        info!(addr = %server.local_addr()?, "command server listening");
        Ok(server)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RoverError> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the next client.  Polls with a short timeout and retries
    /// forever; transient accept errors are logged and retried too.
    pub async fn accept_client(&self) -> (TcpStream, SocketAddr) {
        loop {
            match timeout(self.timing.accept_timeout, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    info!(%peer, "client connected");
                    self.dispatcher.display.show_connected();
                    return (stream, peer);
                }
                Ok(Err(e)) => warn!(error = %e, "accept failed"),
                Err(_) => {}
            }
            tokio::time::sleep(self.timing.accept_retry).await;
        }
    }

    /// Read and dispatch until the session ends, then say why.
    ///
    /// A receive timeout just means no data yet.  Peer close is reported as
    /// [`RoverError::ClientDisconnected`], which the controller treats as a
    /// normal end of session; socket errors as [`RoverError::Network`].
    pub async fn serve(&self, mut stream: TcpStream) -> RoverError {
        let mut buf = vec![0u8; self.timing.max_read_bytes];
        loop {
            match timeout(self.timing.receive_timeout, stream.read(&mut buf)).await {
                Err(_) => {}
                Ok(Ok(0)) => {
                    info!("client closed the connection");
                    return RoverError::ClientDisconnected;
                }
                Ok(Ok(n)) => {
                    debug!(bytes = n, "received");
                    self.dispatcher.handle_payload(&buf[..n]).await;
                }
                Ok(Err(e)) if is_transient(&e) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "receive failed");
                    return e.into();
                }
            }
            tokio::time::sleep(self.timing.receive_poll).await;
        }
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(e.kind(), WouldBlock | Interrupted | TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::ManeuverTiming;
    use rover_hal::sim::{SimBoard, SimProbe};
    use rover_types::MotorIntent;
    use tokio::io::AsyncWriteExt;
    use tokio::time::Instant;

    async fn dispatcher() -> (CommandDispatcher, Arc<EmergencyState>, SimProbe) {
        let (board, probe) = SimBoard::new().build();
        let display = StatusDisplay::new(board.display);
        display.init_with_retry(Duration::ZERO, Duration::ZERO).await;
        let motors = MotorDriver::new(board.motor, ManeuverTiming::default());
        let emergency = Arc::new(EmergencyState::new());
        (
            CommandDispatcher::new(motors, display, Arc::clone(&emergency)),
            emergency,
            probe,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_are_uppercased_and_displayed() {
        let (dispatcher, _emergency, probe) = dispatcher().await;
        let outcomes = dispatcher.handle_payload(b"hello").await;
        assert_eq!(outcomes, [DispatchOutcome::Unrecognized("HELLO".into())]);
        assert_eq!(probe.last_display().as_deref(), Some("CMD:\nHELLO"));
        assert_eq!(probe.motor_intent(), MotorIntent::COAST);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_chunk_shows_empty_command() {
        let (dispatcher, _emergency, probe) = dispatcher().await;
        let outcomes = dispatcher.handle_payload(b"  \r\n").await;
        assert_eq!(outcomes, [DispatchOutcome::Unrecognized(String::new())]);
        assert_eq!(probe.display_lines(), ["ROVER\nIDLE", "CMD:\n"]);
        assert_eq!(probe.motor_intent(), MotorIntent::COAST);
    }

    #[tokio::test(start_paused = true)]
    async fn forward_runs_three_seconds() {
        let (dispatcher, _emergency, probe) = dispatcher().await;
        let start = Instant::now();
        let outcomes = dispatcher.handle_payload(b"forward\n").await;
        assert_eq!(outcomes, [DispatchOutcome::Executed(Command::Forward)]);
        assert_eq!(
            probe.motor_timeline_since(start),
            vec![
                (Duration::ZERO, MotorIntent::FORWARD),
                (Duration::from_secs(3), MotorIntent::COAST),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn left_then_stop_in_one_chunk() {
        let (dispatcher, _emergency, probe) = dispatcher().await;
        let start = Instant::now();
        let outcomes = dispatcher.handle_payload(b"LEFT STOP").await;
        assert_eq!(
            outcomes,
            [
                DispatchOutcome::Executed(Command::Left),
                DispatchOutcome::Executed(Command::Stop),
            ]
        );
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(
            probe.display_lines(),
            ["ROVER\nIDLE", "CMD:\nLEFT", "CMD:\nSTOP", "IDLE"]
        );
        assert_eq!(
            probe.motor_timeline_since(start),
            vec![
                (Duration::ZERO, MotorIntent::LEFT),
                (Duration::from_secs(1), MotorIntent::COAST),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn commands_suppressed_while_escaping() {
        let (dispatcher, emergency, probe) = dispatcher().await;
        emergency.try_trigger(Instant::now(), Duration::from_secs(3));
        let start = Instant::now();
        let outcome = dispatcher.handle_token("forward").await;
        assert_eq!(outcome, DispatchOutcome::Suppressed(Command::Forward));
        assert_eq!(probe.motor_writes_since(start), 0);
        assert_eq!(probe.last_display().as_deref(), Some("CMD:\nFORWARD"));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_command_rechecks_flag_after_lease() {
        let (dispatcher, emergency, probe) = dispatcher().await;
        let busy = dispatcher.motors.lease().await;
        let queued = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(Command::Forward).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        emergency.try_trigger(Instant::now(), Duration::from_secs(3));
        let start = Instant::now();
        drop(busy);

        assert_eq!(
            queued.await.unwrap(),
            DispatchOutcome::Suppressed(Command::Forward)
        );
        assert_eq!(probe.motor_writes_since(start), 0);
    }

    #[tokio::test]
    async fn serve_reports_peer_close() {
        let (dispatcher, _emergency, probe) = dispatcher().await;
        let timing = SessionTiming {
            accept_timeout: Duration::from_millis(50),
            accept_retry: Duration::from_millis(5),
            receive_timeout: Duration::from_millis(20),
            receive_poll: Duration::from_millis(5),
            max_read_bytes: 64,
        };
        let server = CommandServer::bind("127.0.0.1:0".parse().unwrap(), dispatcher, timing)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"STOP").await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let (stream, _peer) = server.accept_client().await;
        let fault = server.serve(stream).await;
        client.await.unwrap();

        assert!(matches!(fault, RoverError::ClientDisconnected));
        assert!(probe.display_lines().contains(&"CONNECTED".to_string()));
        assert_eq!(probe.last_display().as_deref(), Some("IDLE"));
    }
}
