//! Single-flight guard for privileged batch actions.
//!
//! At most one action holds the guard. A concurrent attempt is rejected
//! immediately, and a cooldown must pass between successful runs. The
//! guard is owned by the application state and handed to whoever needs it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{fmt, sync::Arc, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardRejection {
    /// Another run is in flight.
    Busy,
    /// The last successful run finished too recently.
    CoolingDown { retry_after: Duration },
}

impl fmt::Display for GuardRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardRejection::Busy => write!(f, "action already in progress"),
            GuardRejection::CoolingDown { retry_after } => {
                write!(f, "action on cooldown, retry in {}s", retry_after.as_secs().max(1))
            }
        }
    }
}

impl std::error::Error for GuardRejection {}

#[derive(Debug, Default)]
struct GuardState {
    running: bool,
    last_success: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ActionGuard {
    cooldown: Duration,
    state: Arc<Mutex<GuardState>>,
}

impl ActionGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: Arc::new(Mutex::new(GuardState::default())),
        }
    }

    pub fn try_acquire(&self) -> Result<ActionPermit, GuardRejection> {
        self.try_acquire_at(Utc::now())
    }

    pub fn try_acquire_at(&self, now: DateTime<Utc>) -> Result<ActionPermit, GuardRejection> {
        let mut state = self.state.lock();
        if state.running {
            return Err(GuardRejection::Busy);
        }
        if let Some(last) = state.last_success {
            let elapsed = now.signed_duration_since(last).to_std().unwrap_or(Duration::ZERO);
            if elapsed < self.cooldown {
                return Err(GuardRejection::CoolingDown {
                    retry_after: self.cooldown - elapsed,
                });
            }
        }
        state.running = true;
        Ok(ActionPermit {
            state: self.state.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_success
    }
}

/// Held while an action runs. Dropping it without [`ActionPermit::succeed`]
/// releases the guard and leaves the cooldown untouched.
pub struct ActionPermit {
    state: Arc<Mutex<GuardState>>,
}

impl ActionPermit {
    pub fn succeed(self) {
        self.succeed_at(Utc::now())
    }

    pub fn succeed_at(self, at: DateTime<Utc>) {
        self.state.lock().last_success = Some(at);
    }
}

impl Drop for ActionPermit {
    fn drop(&mut self) {
        self.state.lock().running = false;
    }
}
