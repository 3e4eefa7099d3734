//! Two-line character display and the best-effort [`StatusDisplay`] sink
//! built on top of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rover_types::{DisplayMessage, RoverError};
use tracing::{debug, info, warn};

/// A small text display (16x2 LCD or similar).
pub trait TextDisplay: Send + Sync {
    fn id(&self) -> &str;

    /// Bring the device up.  May fail while the panel is still powering on.
    fn init(&mut self) -> Result<(), RoverError>;

    /// Clear the panel and write `text`; `\n` moves to the second line.
    fn write(&mut self, text: &str) -> Result<(), RoverError>;
}

/// Shared, cloneable handle to the status display.
///
/// Every write is best effort: errors are logged and swallowed so that a
/// flaky panel never takes the controller down.
#[derive(Clone)]
pub struct StatusDisplay {
    device: Arc<Mutex<Box<dyn TextDisplay>>>,
    ready: Arc<AtomicBool>,
}

impl StatusDisplay {
    pub fn new(device: Box<dyn TextDisplay>) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wait `power_up`, then call `init` every `retry` until it succeeds and
    /// show the banner.  Returns the number of attempts it took.
    pub async fn init_with_retry(&self, power_up: Duration, retry: Duration) -> u32 {
        tokio::time::sleep(power_up).await;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self.lock().init();
            match result {
                Ok(()) => break,
                Err(e) => {
                    warn!(attempt = attempts, error = %e, "waiting for status display");
                    tokio::time::sleep(retry).await;
                }
            }
        }
        self.ready.store(true, Ordering::Release);
        info!(attempts, "status display ready");
        self.show(DisplayMessage::Banner);
        attempts
    }

    /// `true` once [`init_with_retry`][Self::init_with_retry] has succeeded.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Render `message` on the panel.
    pub fn show(&self, message: DisplayMessage) {
        let text = message.render();
        let result = self.lock().write(&text);
        match result {
            Ok(()) => debug!(text = %text.replace('\n', " | "), "display updated"),
            Err(e) => warn!(error = %e, "status display write failed"),
        }
    }

    pub fn show_idle(&self) {
        self.show(DisplayMessage::Idle);
    }

    pub fn show_connected(&self) {
        self.show(DisplayMessage::Connected);
    }

    pub fn show_escape(&self) {
        self.show(DisplayMessage::Escape);
    }

    pub fn show_command(&self, token: &str) {
        self.show(DisplayMessage::Command(token.to_string()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Box<dyn TextDisplay>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
