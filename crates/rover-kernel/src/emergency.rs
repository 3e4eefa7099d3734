//! [`EmergencyState`] – the shared "escape in progress" flag.
//!
//! The flag and the time of the last trigger are guarded together, and the
//! only mutations are [`EmergencyState::try_trigger`] (check debounce and set,
//! as one critical section) and [`EmergencyState::clear`].  There is no way
//! to read the flag and then set it in two steps, so two samplers can never
//! both win the same trigger.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Inner {
    active: bool,
    last_trigger: Option<Instant>,
}

/// Point-in-time copy of the emergency state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencySnapshot {
    pub active: bool,
    pub last_trigger: Option<Instant>,
}

/// Shared emergency flag plus last-trigger timestamp.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tokio::time::Instant;
/// use rover_kernel::EmergencyState;
///
/// let state = EmergencyState::new();
/// let now = Instant::now();
/// assert!(state.try_trigger(now, Duration::from_secs(3)));
/// // Already active: a second trigger is refused.
/// assert!(!state.try_trigger(now, Duration::from_secs(3)));
/// state.clear();
/// assert!(!state.is_active());
/// ```
#[derive(Debug, Default)]
pub struct EmergencyState {
    inner: Mutex<Inner>,
}

impl EmergencyState {
    /// Inactive, never triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate the emergency if it is inactive and at least `debounce` has
    /// passed since the previous trigger (or there never was one).
    ///
    /// Returns `true` when this call activated it; the caller then owns
    /// running the escape and eventually calling [`clear`][Self::clear].
    pub fn try_trigger(&self, now: Instant, debounce: Duration) -> bool {
        let mut inner = self.lock();
        if inner.active {
            return false;
        }
        if let Some(last) = inner.last_trigger
            && now.saturating_duration_since(last) < debounce
        {
            debug!(
                since_last_ms = now.saturating_duration_since(last).as_millis() as u64,
                "trigger suppressed by debounce"
            );
            return false;
        }
        inner.active = true;
        inner.last_trigger = Some(now);
        info!("emergency raised");
        true
    }

    /// Deactivate.  The last-trigger time is kept for debouncing.
    pub fn clear(&self) {
        let mut inner = self.lock();
        if inner.active {
            info!("emergency cleared");
        }
        inner.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.lock().last_trigger
    }

    pub fn snapshot(&self) -> EmergencySnapshot {
        let inner = self.lock();
        EmergencySnapshot {
            active: inner.active,
            last_trigger: inner.last_trigger,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
